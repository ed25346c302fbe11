//! Fix plans - ranked remediation candidates derived from runbooks.
//!
//! Plans are derived fresh per incident snapshot and are not persisted
//! beyond it. They reference evidence by (kind, id) into the pack they
//! were planned against; they never copy evidence.

use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceSource;
use crate::runbook::{FixKind, RiskLevel};

/// Weak reference to an evidence item inside an EvidencePack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRef {
    pub kind: EvidenceSource,
    pub ref_id: String,
}

/// One candidate fix, derived from a runbook and the evidence pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixPlan {
    /// Canonical id, `fix-{incidentId}-{runbookId}`. This exact string is
    /// the only identifier used across preview and apply; there is no
    /// substring or fallback matching anywhere.
    pub id: String,
    pub runbook_id: String,
    pub title: String,
    pub description: String,
    pub kind: FixKind,
    pub risk: RiskLevel,
    pub confidence: f64,
    pub evidence_refs: Vec<EvidenceRef>,
    pub why_this_fix: String,
}

/// Pattern-specific read-only investigation steps, always offered even
/// when no runbook matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedAction {
    pub title: String,
    pub description: String,
    pub steps: Vec<String>,
}

/// The planner's full answer for one incident snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationPlan {
    pub incident_id: String,
    pub recommended_action: RecommendedAction,
    /// Ranked best-first; the first entry is the recommended fix.
    pub fix_plans: Vec<FixPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_fix_id: Option<String>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// Build the canonical fix id for a runbook applied to an incident.
pub fn fix_id(incident_id: &str, runbook_id: &str) -> String {
    format!("fix-{}-{}", incident_id, runbook_id)
}
