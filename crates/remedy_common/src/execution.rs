//! Execution records - the immutable result of one apply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::incident::ResourceRef;
use crate::runbook::FixKind;

/// Wire request for `POST /incidents/{id}/fix-apply`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub fix_id: String,
    /// Explicit operator acknowledgment; never defaulted to true.
    #[serde(default)]
    pub confirmed: bool,
    /// Second, independent affirmation required for high-risk fixes.
    #[serde(default)]
    pub ack_elevated_risk: bool,
    /// Fallback locator for when the incident's primary resource
    /// reference is stale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_info: Option<ResourceRef>,
}

/// Terminal status of an apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Applied,
    Failed,
}

/// Counts of resources touched by an apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSummary {
    pub created: u32,
    pub configured: u32,
    pub deleted: u32,
}

impl ChangeSummary {
    pub fn total(&self) -> u32 {
        self.created + self.configured + self.deleted
    }
}

/// Which stream an execution log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// One timestamped log line, ordered for streaming to an operator console.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub stream: LogStream,
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

impl LogLine {
    pub fn stdout(line: impl Into<String>) -> Self {
        Self {
            stream: LogStream::Stdout,
            timestamp: Utc::now(),
            line: line.into(),
        }
    }

    pub fn stderr(line: impl Into<String>) -> Self {
        Self {
            stream: LogStream::Stderr,
            timestamp: Utc::now(),
            line: line.into(),
        }
    }
}

/// Immutable record of one performed (or attempted) mutation. Created
/// once by the apply executor; referenced later by the post-check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub execution_id: String,
    pub incident_id: String,
    pub fix_id: String,
    /// Mutation class; the post-check settle delay is keyed by this.
    pub kind: FixKind,
    pub status: ExecutionStatus,
    pub message: String,
    pub changes: ChangeSummary,
    pub log: Vec<LogLine>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Execution {
    /// Mint a fresh execution id. Every apply gets a new one, including
    /// retries.
    pub fn new_id() -> String {
        format!("exec-{}", Uuid::new_v4())
    }
}
