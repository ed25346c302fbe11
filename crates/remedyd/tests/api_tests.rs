//! HTTP API tests.
//!
//! Exercises the axum router end-to-end against the in-memory cluster:
//! registration boundary, remediation plan, preview/apply gating, the
//! post-check endpoint, and feedback validation.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use remedy_common::{
    Diagnosis, FailurePattern, Incident, IncidentStatus, RemedyConfig, ResourceRef, Severity,
};
use remedyd::cluster::memory::{FakeResource, MemoryCluster};
use remedyd::server::{router, AppState};
use tower::ServiceExt;

// ============================================================================
// Harness
// ============================================================================

struct TestApp {
    state: Arc<AppState>,
    cluster: Arc<MemoryCluster>,
}

impl TestApp {
    async fn new() -> Self {
        let cluster = Arc::new(MemoryCluster::new());
        let state = Arc::new(AppState::with_gateway(
            RemedyConfig::default(),
            cluster.clone(),
        ));
        Self { state, cluster }
    }

    async fn request(&self, method: &str, path: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(path);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("request builds");

        let response = router(self.state.clone())
            .oneshot(request)
            .await
            .expect("router handles request");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::String(
                String::from_utf8_lossy(&bytes).to_string(),
            ))
        };
        (status, value)
    }

    async fn seed_crashloop(&self, incident_id: &str) {
        self.cluster
            .insert(
                ResourceRef::new("prod", "Deployment", "api"),
                FakeResource {
                    spec: serde_json::json!({"replicas": 2}),
                    replicas: Some(2),
                    restart_count: 9,
                    ready: false,
                    phase: "CrashLoopBackOff".to_string(),
                    events: vec![remedy_common::ClusterEvent {
                        reason: "BackOff".to_string(),
                        message: "Back-off restarting failed container".to_string(),
                        severity: Severity::High,
                        timestamp: "2026-03-01T10:00:00Z".to_string(),
                        count: 12,
                    }],
                    logs: vec!["panic: exit status 2".to_string()],
                    metrics: vec![],
                    changes: vec![remedy_common::ChangeRecord {
                        change_type: "ScalingReplicaSet".to_string(),
                        timestamp: "not-a-timestamp".to_string(),
                        resource: ResourceRef::new("prod", "Deployment", "api"),
                        severity: Severity::Info,
                        reason: "ScalingReplicaSet".to_string(),
                        message: "Scaled up replica set".to_string(),
                    }],
                    probes: vec![],
                },
            )
            .await;

        let incident = Incident {
            id: incident_id.to_string(),
            pattern: FailurePattern::Crashloop,
            severity: Severity::High,
            status: IncidentStatus::Open,
            resource: ResourceRef::new("prod", "Deployment", "api"),
            title: "api crashlooping".to_string(),
            confidence: 0.8,
            diagnosis: Some(Diagnosis {
                summary: "container exits after start".to_string(),
                probable_causes: vec![],
                restart_count: 9,
                ready: false,
                generated_at: Utc::now(),
            }),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            resolved_at: None,
            resolution: None,
        };
        let (status, _) = self
            .request(
                "PUT",
                &format!("/v1/incidents/{}", incident_id),
                Some(serde_json::to_value(&incident).unwrap()),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}

// ============================================================================
// Registration & evidence
// ============================================================================

#[tokio::test]
async fn test_register_and_fetch_incident() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;

    let (status, body) = app.request("GET", "/v1/incidents/inc-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pattern"], "CRASHLOOP");

    let (status, _) = app.request("GET", "/v1/incidents/inc-missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_rejects_mismatched_id() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;
    let (_, incident) = app.request("GET", "/v1/incidents/inc-1", None).await;

    let (status, _) = app
        .request("PUT", "/v1/incidents/other-id", Some(incident))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_evidence_endpoint_succeeds_with_failing_source() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;
    app.cluster
        .fail_source(remedy_common::EvidenceSource::Log)
        .await;

    let (status, body) = app
        .request("GET", "/v1/incidents/inc-1/evidence", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["logs"].as_array().map(|a| a.is_empty()).unwrap_or(true));
    assert!(body["confidence"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_changes_normalizes_bad_timestamps() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;

    let (status, body) = app
        .request("GET", "/v1/incidents/inc-1/changes?lookback=30", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let changes = body.as_array().unwrap();
    assert_eq!(changes.len(), 1);
    // The seeded record had a malformed timestamp; the wire value must
    // be valid RFC 3339.
    let ts = changes[0]["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
}

// ============================================================================
// Plan, preview, apply
// ============================================================================

#[tokio::test]
async fn test_fixes_returns_ranked_plan() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;

    let (status, body) = app.request("GET", "/v1/incidents/inc-1/fixes", None).await;
    assert_eq!(status, StatusCode::OK);
    let fixes = body["fixPlans"].as_array().unwrap();
    assert!(!fixes.is_empty());
    assert_eq!(body["recommendedFixId"], fixes[0]["id"]);
    assert!(!body["recommendedAction"]["steps"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_no_runbooks_is_valid_empty_plan() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;

    // Repoint the incident at a pattern with no registered runbooks.
    let (_, mut incident) = app.request("GET", "/v1/incidents/inc-1", None).await;
    incident["pattern"] = serde_json::json!("UNKNOWN");
    let (status, _) = app
        .request("PUT", "/v1/incidents/inc-1", Some(incident))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.request("GET", "/v1/incidents/inc-1/fixes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["fixPlans"].as_array().unwrap().is_empty());
    assert!(body["recommendedFixId"].is_null());
}

#[tokio::test]
async fn test_preview_apply_postcheck_happy_path() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;

    let (status, preview) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/fix-preview",
            Some(serde_json::json!({"runbookId": "crashloop-rollback"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let fix_id = preview["fixId"].as_str().unwrap().to_string();
    assert_eq!(fix_id, "fix-inc-1-crashloop-rollback");
    assert_eq!(preview["dryRunError"], "");
    assert!(preview["diff"].as_str().unwrap().contains("prod/Deployment/api"));

    let (status, applied) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/fix-apply",
            Some(serde_json::json!({"fixId": fix_id, "confirmed": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(applied["status"], "applied");
    let execution_id = applied["executionId"].as_str().unwrap().to_string();
    assert!(execution_id.starts_with("exec-"));

    // Manual post-check immediately, before the scheduled delay fires.
    let (status, report) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/post-check",
            Some(serde_json::json!({"executionId": execution_id})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["verdict"], "improved");
    assert_eq!(report["improved"], true);
}

#[tokio::test]
async fn test_apply_requires_confirmation_and_matching_preview() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;

    // No preview at all.
    let (status, _) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/fix-apply",
            Some(serde_json::json!({"fixId": "fix-inc-1-crashloop-rollback", "confirmed": true})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, preview) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/fix-preview",
            Some(serde_json::json!({"runbookId": "crashloop-rollback"})),
        )
        .await;
    let fix_id = preview["fixId"].as_str().unwrap();

    // Unconfirmed.
    let (status, _) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/fix-apply",
            Some(serde_json::json!({"fixId": fix_id, "confirmed": false})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Wrong fix id: stale preview, conflict.
    let (status, body) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/fix-apply",
            Some(serde_json::json!({"fixId": "fix-inc-1-other", "confirmed": true})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.as_str().unwrap_or("").contains("Stale preview"));
}

#[tokio::test]
async fn test_rejected_dry_run_blocks_apply_over_http() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;
    app.cluster.reject_dry_run("admission webhook denied").await;

    let (status, preview) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/fix-preview",
            Some(serde_json::json!({"runbookId": "crashloop-rollback"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["dryRunError"], "admission webhook denied");
    assert_eq!(preview["dryRunOutput"], "");

    let (status, _) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/fix-apply",
            Some(serde_json::json!({
                "fixId": preview["fixId"], "confirmed": true
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.cluster.applied().await.is_empty());
}

// ============================================================================
// Feedback
// ============================================================================

#[tokio::test]
async fn test_feedback_vocabulary_enforced() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;

    let (status, _) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/feedback",
            Some(serde_json::json!({"type": "sounds_good"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/feedback",
            Some(serde_json::json!({"type": "note", "content": "watching"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Note added to incident");
}

#[tokio::test]
async fn test_fix_worked_updates_runbook_stats() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;

    let (status, body) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/feedback",
            Some(serde_json::json!({
                "type": "fix_worked",
                "fixId": "fix-inc-1-crashloop-rollback"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let summary = &body["summary"];
    assert_eq!(summary["runbookId"], "crashloop-rollback");
    assert_eq!(summary["executionCount"], 1);
    assert!(summary["successRate"].as_f64().unwrap() > 0.9);
}

#[tokio::test]
async fn test_resolved_feedback_archives_and_feeds_similar() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;

    let (status, _) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/feedback",
            Some(serde_json::json!({
                "type": "resolved",
                "content": "rolled back",
                "fixId": "fix-inc-1-crashloop-rollback"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // A second incident on the same target now sees the resolved one as
    // similar, including which fix worked.
    app.seed_crashloop("inc-2").await;
    let (status, similar) = app
        .request("GET", "/v1/incidents/inc-2/similar", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let entries = similar.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["incidentId"], "inc-1");
    assert_eq!(entries[0]["wasResolved"], true);
    assert_eq!(entries[0]["successfulFix"], "fix-inc-1-crashloop-rollback");
}

// ============================================================================
// Health & metrics
// ============================================================================

#[tokio::test]
async fn test_health_and_metrics() {
    let app = TestApp::new().await;
    app.seed_crashloop("inc-1").await;

    let (status, health) = app.request("GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["incidents"], 1);
    assert!(health["runbooks"].as_u64().unwrap() > 0);

    let (status, _) = app
        .request(
            "POST",
            "/v1/incidents/inc-1/fix-preview",
            Some(serde_json::json!({"runbookId": "crashloop-rollback"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, metrics) = app.request("GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(metrics
        .as_str()
        .unwrap()
        .contains("remedy_previews_total 1"));
}
