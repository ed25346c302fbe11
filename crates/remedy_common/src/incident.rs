//! Incident model - detected failures and their diagnosis.
//!
//! Incidents are created by an external detector and registered with the
//! daemon; the workflow engine only ever moves their status forward and
//! archives them. They are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Severity of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Numeric weight for comparisons (higher = more severe).
    pub fn weight(&self) -> u8 {
        match self {
            Severity::Critical => 5,
            Severity::High => 4,
            Severity::Medium => 3,
            Severity::Low => 2,
            Severity::Info => 1,
        }
    }
}

/// Categorized failure pattern. Matching against runbooks is exact;
/// an ambiguous pattern is a registry authoring error, not a runtime
/// decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailurePattern {
    RestartStorm,
    Crashloop,
    OomPressure,
    LivenessFailure,
    PendingPod,
    ImagePullFailure,
    NoReadyEndpoints,
    Unknown,
}

impl FailurePattern {
    pub fn category(&self) -> PatternCategory {
        match self {
            FailurePattern::RestartStorm
            | FailurePattern::Crashloop
            | FailurePattern::OomPressure => PatternCategory::Application,
            FailurePattern::LivenessFailure => PatternCategory::HealthCheck,
            FailurePattern::PendingPod => PatternCategory::Scheduling,
            FailurePattern::ImagePullFailure | FailurePattern::NoReadyEndpoints => {
                PatternCategory::Infrastructure
            }
            FailurePattern::Unknown => PatternCategory::Unknown,
        }
    }
}

impl std::fmt::Display for FailurePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailurePattern::RestartStorm => "RESTART_STORM",
            FailurePattern::Crashloop => "CRASHLOOP",
            FailurePattern::OomPressure => "OOM_PRESSURE",
            FailurePattern::LivenessFailure => "LIVENESS_FAILURE",
            FailurePattern::PendingPod => "PENDING_POD",
            FailurePattern::ImagePullFailure => "IMAGE_PULL_FAILURE",
            FailurePattern::NoReadyEndpoints => "NO_READY_ENDPOINTS",
            FailurePattern::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// High-level grouping of failure patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Application,
    Infrastructure,
    Scheduling,
    HealthCheck,
    Unknown,
}

/// Reference to a Kubernetes resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(namespace: &str, kind: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

/// Lifecycle status of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Remediating,
    Resolved,
}

/// One probable cause with its likelihood, ranked inside a diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbableCause {
    pub cause: String,
    /// Likelihood in [0,1]; causes are listed most likely first.
    pub likelihood: f64,
}

/// Root-cause analysis attached to an incident by the detector and
/// refreshed after a fix is applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub summary: String,
    pub probable_causes: Vec<ProbableCause>,
    /// Restart count observed at diagnosis time; the post-check compares
    /// against this to judge improvement.
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub ready: bool,
    pub generated_at: DateTime<Utc>,
}

/// A detected problem on one target resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub pattern: FailurePattern,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub resource: ResourceRef,
    pub title: String,
    pub confidence: f64,
    pub diagnosis: Option<Diagnosis>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

impl Incident {
    pub fn is_active(&self) -> bool {
        !matches!(self.status, IncidentStatus::Resolved)
    }

    /// Deduplication fingerprint over pattern and target resource.
    pub fn fingerprint(&self) -> String {
        let data = format!(
            "{}|{}|{}|{}",
            self.pattern, self.resource.kind, self.resource.name, self.resource.namespace
        );
        let hash = Sha256::digest(data.as_bytes());
        hex::encode(&hash[..8])
    }

    pub fn resolve(&mut self, resolution: &str) {
        self.status = IncidentStatus::Resolved;
        self.resolved_at = Some(Utc::now());
        self.resolution = Some(resolution.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_incident(pattern: FailurePattern) -> Incident {
        Incident {
            id: "inc-1".to_string(),
            pattern,
            severity: Severity::High,
            status: IncidentStatus::Open,
            resource: ResourceRef::new("prod", "Pod", "api-7f9c"),
            title: "test".to_string(),
            confidence: 0.8,
            diagnosis: None,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            resolved_at: None,
            resolution: None,
        }
    }

    #[test]
    fn test_fingerprint_stable_for_same_target() {
        let a = make_incident(FailurePattern::Crashloop);
        let mut b = a.clone();
        b.id = "inc-2".to_string();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_differs_by_pattern() {
        let a = make_incident(FailurePattern::Crashloop);
        let b = make_incident(FailurePattern::OomPressure);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_resolve_sets_status_and_timestamp() {
        let mut inc = make_incident(FailurePattern::RestartStorm);
        assert!(inc.is_active());
        inc.resolve("fixed by rollback");
        assert_eq!(inc.status, IncidentStatus::Resolved);
        assert!(inc.resolved_at.is_some());
        assert!(!inc.is_active());
    }

    #[test]
    fn test_pattern_wire_format() {
        let json = serde_json::to_string(&FailurePattern::RestartStorm).unwrap();
        assert_eq!(json, "\"RESTART_STORM\"");
        let back: FailurePattern = serde_json::from_str("\"OOM_PRESSURE\"").unwrap();
        assert_eq!(back, FailurePattern::OomPressure);
    }
}
