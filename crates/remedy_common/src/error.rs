//! Error taxonomy for the remediation workflow.
//!
//! Every failure is scoped to one incident or one operation; nothing here
//! is fatal to the process. Source-level evidence failures are absorbed
//! into pack confidence and never surface through this enum.

use thiserror::Error;

use crate::incident::ResourceRef;

#[derive(Error, Debug)]
pub enum RemedyError {
    #[error("Incident not found: {0}")]
    IncidentNotFound(String),

    #[error("Fix not found for this incident: {0}")]
    FixNotFound(String),

    /// Resolution failed before a preview could be produced, e.g. the
    /// target resource no longer exists.
    #[error("Fix no longer applicable: {reason}")]
    FixNotApplicable { reason: String },

    /// The cluster rejected the server-side dry-run; the message is
    /// surfaced verbatim and the fix is blocked from apply.
    #[error("Dry-run rejected by cluster: {reason}")]
    DryRunRejected { reason: String },

    #[error("Preview timed out after {seconds}s")]
    PreviewTimeout { seconds: u64 },

    /// The requested fix id does not match the most recently previewed
    /// fix for the incident.
    #[error("Stale preview: apply requested for {requested} but last preview was {latest}")]
    StalePreview { requested: String, latest: String },

    #[error("An apply is already in flight for incident {0}")]
    ApplyInProgress(String),

    #[error("Fix must be confirmed before applying")]
    ConfirmationRequired,

    /// High-risk fixes need a second, independent affirmation.
    #[error("High-risk fix requires explicit elevated-risk acknowledgment")]
    ElevatedRiskAckRequired,

    /// The preview on file was rejected by the dry-run, so the apply is
    /// blocked by policy without contacting the mutating API.
    #[error("Apply blocked: preview was rejected by dry-run: {reason}")]
    ApplyBlocked { reason: String },

    #[error("Apply failed: {reason}")]
    ApplyFailed { reason: String },

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// The post-check could not reach the cluster; distinct from
    /// "not improved".
    #[error("Post-check inconclusive: {reason}")]
    PostCheckInconclusive { reason: String },

    #[error("Resource not found: {0}")]
    ResourceNotFound(ResourceRef),

    #[error("Cluster unreachable: {0}")]
    ClusterUnreachable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RemedyError {
    /// HTTP status this error maps to at the API boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            RemedyError::IncidentNotFound(_)
            | RemedyError::FixNotFound(_)
            | RemedyError::ExecutionNotFound(_)
            | RemedyError::ResourceNotFound(_) => 404,
            RemedyError::FixNotApplicable { .. } => 410,
            RemedyError::StalePreview { .. } => 409,
            RemedyError::ApplyInProgress(_) => 409,
            RemedyError::ConfirmationRequired
            | RemedyError::ElevatedRiskAckRequired
            | RemedyError::InvalidRequest(_) => 400,
            RemedyError::DryRunRejected { .. } | RemedyError::ApplyBlocked { .. } => 422,
            RemedyError::PreviewTimeout { .. } => 504,
            RemedyError::ApplyFailed { .. } => 502,
            RemedyError::PostCheckInconclusive { .. } => 200,
            RemedyError::ClusterUnreachable(_) => 503,
            RemedyError::Io(_) | RemedyError::Json(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, RemedyError>;
