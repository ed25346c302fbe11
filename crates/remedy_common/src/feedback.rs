//! Operator feedback - judgments fed back into runbook statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed feedback vocabulary. Anything else is rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Resolved,
    RootCauseConfirmed,
    FixWorked,
    FixFailed,
    Dismiss,
    Escalate,
    Note,
    Worked,
    NotWorked,
    Unknown,
}

impl FeedbackType {
    /// How this judgment counts toward the referenced runbook's success
    /// rate: `Some(true)` success, `Some(false)` failure, `None` neutral.
    pub fn outcome(&self) -> Option<bool> {
        match self {
            FeedbackType::Resolved | FeedbackType::FixWorked | FeedbackType::Worked => Some(true),
            FeedbackType::FixFailed | FeedbackType::NotWorked => Some(false),
            _ => None,
        }
    }
}

/// A feedback submission from the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_id: Option<String>,
}

/// One stored, append-only feedback entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEntry {
    pub id: String,
    pub incident_id: String,
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Response after recording feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<FeedbackSummary>,
}

/// Updated runbook statistics returned when feedback referenced a fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSummary {
    pub runbook_id: String,
    pub success_rate: f64,
    pub execution_count: u64,
}
