//! Fix previews - inspectable mutations that have not touched the cluster.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::EvidenceRef;
use crate::runbook::{FixKind, RiskLevel};

/// Rollback guidance attached to a preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPlan {
    pub description: String,
    pub commands: Vec<String>,
}

/// A concrete, inspectable rendering of a FixPlan: diff, equivalent CLI
/// commands, and the server-side dry-run verdict. Exactly one of
/// `dry_run_output` / `dry_run_error` is non-empty. A preview is valid
/// only for the fix id it was generated for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixPreview {
    pub fix_id: String,
    pub title: String,
    pub kind: FixKind,
    pub risk: RiskLevel,
    pub confidence: f64,
    pub why_this_fix: String,
    pub diff: String,
    pub commands: Vec<String>,
    pub dry_run_output: String,
    pub dry_run_error: String,
    pub rollback: RollbackPlan,
    pub evidence_refs: Vec<EvidenceRef>,
    pub generated_at: DateTime<Utc>,
}

impl FixPreview {
    /// Whether the dry-run accepted the mutation. A rejected preview can
    /// never be confirmed for apply.
    pub fn dry_run_ok(&self) -> bool {
        self.dry_run_error.is_empty()
    }
}
