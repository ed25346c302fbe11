//! Runbook model - automated remediation procedures.
//!
//! Runbooks live in the daemon's registry. Their statistics
//! (`success_rate`, `execution_count`) are written only by the feedback
//! recorder; the planner reads them.

use serde::{Deserialize, Serialize};

use crate::incident::{FailurePattern, ResourceRef};

/// Risk of executing a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// How autonomously a runbook may act. Serialized as its numeric level
/// (0..3) on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum AutonomyLevel {
    /// Only observe and collect data.
    Observe = 0,
    /// Recommend actions to the operator.
    Recommend = 1,
    /// Propose fixes with preview.
    Propose = 2,
    /// Execute low-risk fixes without confirmation.
    AutoExecute = 3,
}

impl From<AutonomyLevel> for u8 {
    fn from(level: AutonomyLevel) -> u8 {
        level as u8
    }
}

impl TryFrom<u8> for AutonomyLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AutonomyLevel::Observe),
            1 => Ok(AutonomyLevel::Recommend),
            2 => Ok(AutonomyLevel::Propose),
            3 => Ok(AutonomyLevel::AutoExecute),
            other => Err(format!("autonomy level out of range: {}", other)),
        }
    }
}

/// The mutation class a runbook performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixKind {
    Patch,
    Scale,
    Restart,
    Rollback,
    Delete,
}

impl std::fmt::Display for FixKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FixKind::Patch => "patch",
            FixKind::Scale => "scale",
            FixKind::Restart => "restart",
            FixKind::Rollback => "rollback",
            FixKind::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// kubectl command templates for a runbook action. Placeholders `{name}`
/// and `{namespace}` are substituted from the target resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandTemplate {
    pub dry_run: String,
    pub apply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<String>,
}

impl CommandTemplate {
    pub fn render(template: &str, target: &ResourceRef) -> String {
        template
            .replace("{name}", &target.name)
            .replace("{namespace}", &target.namespace)
    }
}

/// An automated remediation procedure targeting one failure pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runbook {
    pub id: String,
    pub name: String,
    pub description: String,
    pub pattern: FailurePattern,
    pub kind: FixKind,
    pub risk: RiskLevel,
    pub autonomy_level: AutonomyLevel,
    pub commands: CommandTemplate,
    /// Rolling success statistic in [0,1], updated only via feedback.
    pub success_rate: f64,
    pub execution_count: u64,
    pub enabled: bool,
    /// Evidence sources this runbook's rule cites; the planner blends
    /// the relevance of these items into fix confidence.
    #[serde(default)]
    pub cited_evidence: Vec<crate::evidence::EvidenceSource>,
}
