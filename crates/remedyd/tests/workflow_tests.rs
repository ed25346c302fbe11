//! Workflow correctness tests.
//!
//! Drives the remediation components end-to-end against the in-memory
//! cluster: evidence degradation, planning, preview gating, apply
//! guards, post-check, and the feedback loop back into runbook stats.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use remedy_common::{
    ApplyRequest, AutonomyLevel, CommandTemplate, ConfidenceConfig, Diagnosis, EvidenceConfig,
    EvidenceSource, ExecutionStatus, FailurePattern, FeedbackConfig, FeedbackRequest,
    FeedbackType, FixKind, Incident, IncidentStatus, PostCheckConfig, PreviewConfig, RemedyError,
    ResourceRef, RiskLevel, Runbook, Severity,
};
use remedyd::apply::{ApplyExecutor, PreviewRecord};
use remedyd::cluster::memory::{FakeResource, MemoryCluster};
use remedyd::evidence::EvidenceAggregator;
use remedyd::feedback::FeedbackRecorder;
use remedyd::matcher::RunbookRegistry;
use remedyd::planner::FixPlanner;
use remedyd::postcheck::{PostCheckVerdict, PostCheckVerifier};
use remedyd::preview::PreviewEngine;
use remedyd::store::IncidentStore;
use remedyd::telemetry::Telemetry;

// ============================================================================
// Fixtures
// ============================================================================

fn crashloop_incident(id: &str) -> Incident {
    Incident {
        id: id.to_string(),
        pattern: FailurePattern::Crashloop,
        severity: Severity::High,
        status: IncidentStatus::Open,
        resource: ResourceRef::new("prod", "Pod", "api-7f9c"),
        title: "api pod crashlooping".to_string(),
        confidence: 0.8,
        diagnosis: Some(Diagnosis {
            summary: "container exits shortly after start".to_string(),
            probable_causes: vec![],
            restart_count: 9,
            ready: false,
            generated_at: Utc::now(),
        }),
        first_seen: Utc::now(),
        last_seen: Utc::now(),
        resolved_at: None,
        resolution: None,
    }
}

fn crashloop_runbook(id: &str, risk: RiskLevel, rate: f64) -> Runbook {
    Runbook {
        id: id.to_string(),
        name: format!("Runbook {}", id),
        description: "restart the crashing pod".to_string(),
        pattern: FailurePattern::Crashloop,
        kind: FixKind::Restart,
        risk,
        autonomy_level: AutonomyLevel::Propose,
        commands: CommandTemplate {
            dry_run: "kubectl delete pod {name} -n {namespace} --dry-run=server".to_string(),
            apply: "kubectl delete pod {name} -n {namespace}".to_string(),
            rollback: None,
        },
        success_rate: rate,
        execution_count: 0,
        enabled: true,
        cited_evidence: vec![EvidenceSource::Event, EvidenceSource::Status],
    }
}

async fn seeded_cluster() -> Arc<MemoryCluster> {
    let cluster = Arc::new(MemoryCluster::new());
    cluster
        .insert(
            ResourceRef::new("prod", "Pod", "api-7f9c"),
            FakeResource {
                spec: serde_json::json!({"containers": [{"name": "api"}]}),
                replicas: None,
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
                logs: vec!["panic: connection refused".to_string()],
                metrics: vec![remedy_common::MetricSample {
                    name: "memory_usage".to_string(),
                    value: 480.0,
                    unit: "Mi".to_string(),
                }],
                changes: vec![],
                probes: vec![],
            },
        )
        .await;
    cluster
}

fn aggregator(cluster: Arc<MemoryCluster>, timeout_secs: u64) -> EvidenceAggregator {
    EvidenceAggregator::new(
        cluster,
        EvidenceConfig {
            source_timeout_secs: timeout_secs,
            ..Default::default()
        },
        ConfidenceConfig::default(),
    )
}

// ============================================================================
// Scenario: single matching runbook becomes the recommended fix
// ============================================================================

#[tokio::test]
async fn test_crashloop_single_runbook_plan() {
    let cluster = seeded_cluster().await;
    let registry = RunbookRegistry::new();
    registry
        .register(crashloop_runbook("rb-1", RiskLevel::Medium, 0.8))
        .await;

    let incident = crashloop_incident("inc-1");
    let runbooks = registry.match_for(incident.pattern).await;
    assert_eq!(runbooks.len(), 1);

    let pack = aggregator(cluster, 5).gather(&incident, None).await;
    let planner = FixPlanner::new(ConfidenceConfig::default(), vec![]);
    let plan = planner.plan(&incident, &runbooks, &pack, &[]);

    assert_eq!(plan.fix_plans.len(), 1);
    assert_eq!(plan.fix_plans[0].id, "fix-inc-1-rb-1");
    assert_eq!(plan.recommended_fix_id.as_deref(), Some("fix-inc-1-rb-1"));
}

// ============================================================================
// Scenario: slow evidence source degrades confidence, not the call
// ============================================================================

#[tokio::test]
async fn test_slow_log_source_degrades_confidence() {
    let incident = crashloop_incident("inc-1");

    let healthy = seeded_cluster().await;
    let full_pack = aggregator(healthy, 5).gather(&incident, None).await;

    let degraded = seeded_cluster().await;
    degraded
        .delay_source(EvidenceSource::Log, Duration::from_secs(3))
        .await;
    let degraded_pack = aggregator(degraded, 1).gather(&incident, None).await;

    // The gather still succeeds; only the category is missing and the
    // confidence is lower.
    assert!(degraded_pack.logs.is_empty());
    assert!(!degraded_pack.events.is_empty());
    assert!(degraded_pack.confidence < full_pack.confidence);
    assert!(degraded_pack.confidence > 0.0);
}

#[tokio::test]
async fn test_all_sources_failing_yields_zero_confidence() {
    let incident = crashloop_incident("inc-1");
    let cluster = Arc::new(MemoryCluster::new());
    // No resources seeded at all: every source errors with NotFound.
    let pack = aggregator(cluster, 1).gather(&incident, None).await;
    assert_eq!(pack.item_count(), 0);
    assert_eq!(pack.confidence, 0.0);
}

// ============================================================================
// Scenario: cached pack is reused within the TTL
// ============================================================================

#[tokio::test]
async fn test_evidence_pack_cached_per_window() {
    let cluster = seeded_cluster().await;
    let incident = crashloop_incident("inc-1");
    let aggregator = aggregator(cluster.clone(), 5);

    let first = aggregator.gather(&incident, Some(60)).await;
    // Change the cluster; a cached read must not see it.
    cluster.fail_source(EvidenceSource::Event).await;
    let second = aggregator.gather(&incident, Some(60)).await;
    assert_eq!(first.events.len(), second.events.len());
    assert_eq!(first.generated_at, second.generated_at);

    // A different window is a different cache entry and never mixes.
    let other_window = aggregator.gather(&incident, Some(15)).await;
    assert_eq!(other_window.lookback_minutes, 15);
    assert!(other_window.events.is_empty());
}

// ============================================================================
// Scenario: rejected dry-run blocks apply without touching the cluster
// ============================================================================

#[tokio::test]
async fn test_rejected_preview_blocks_apply() {
    let cluster = seeded_cluster().await;
    cluster.reject_dry_run("admission webhook denied").await;

    let incident = crashloop_incident("inc-1");
    let runbook = crashloop_runbook("rb-1", RiskLevel::Medium, 0.8);
    let pack = aggregator(cluster.clone(), 5).gather(&incident, None).await;
    let planner = FixPlanner::new(ConfidenceConfig::default(), vec![]);
    let plan = planner.plan(&incident, std::slice::from_ref(&runbook), &pack, &[]);

    let engine = PreviewEngine::new(cluster.clone(), PreviewConfig::default());
    let preview = engine
        .preview(&incident, &plan.fix_plans[0], &runbook)
        .await
        .unwrap();
    assert!(!preview.dry_run_ok());
    assert_eq!(preview.dry_run_error, "admission webhook denied");
    assert!(preview.dry_run_output.is_empty());

    let executor = ApplyExecutor::new(cluster.clone());
    executor
        .record_preview(&incident.id, PreviewRecord::from_preview(&preview, &runbook))
        .await;

    let err = executor
        .apply(
            &incident,
            &ApplyRequest {
                fix_id: preview.fix_id.clone(),
                confirmed: true,
                ack_elevated_risk: false,
                resource_info: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RemedyError::ApplyBlocked { .. }));
    assert!(cluster.applied().await.is_empty());
}

// ============================================================================
// Scenario: preview determinism for unchanged cluster state
// ============================================================================

#[tokio::test]
async fn test_preview_verdict_stable_for_unchanged_state() {
    let cluster = seeded_cluster().await;
    let incident = crashloop_incident("inc-1");
    let runbook = crashloop_runbook("rb-1", RiskLevel::Medium, 0.8);
    let pack = aggregator(cluster.clone(), 5).gather(&incident, None).await;
    let planner = FixPlanner::new(ConfidenceConfig::default(), vec![]);
    let plan = planner.plan(&incident, std::slice::from_ref(&runbook), &pack, &[]);

    let engine = PreviewEngine::new(cluster.clone(), PreviewConfig::default());
    let first = engine
        .preview(&incident, &plan.fix_plans[0], &runbook)
        .await
        .unwrap();
    let second = engine
        .preview(&incident, &plan.fix_plans[0], &runbook)
        .await
        .unwrap();

    assert_eq!(first.dry_run_ok(), second.dry_run_ok());
    assert_eq!(first.fix_id, second.fix_id);
    assert_eq!(first.commands, second.commands);
}

// ============================================================================
// Scenario: preview of a deleted resource is FixNotApplicable
// ============================================================================

#[tokio::test]
async fn test_preview_missing_resource_not_applicable() {
    let cluster = Arc::new(MemoryCluster::new());
    let incident = crashloop_incident("inc-1");
    let runbook = crashloop_runbook("rb-1", RiskLevel::Medium, 0.8);
    let pack = aggregator(cluster.clone(), 1).gather(&incident, None).await;
    let planner = FixPlanner::new(ConfidenceConfig::default(), vec![]);
    let plan = planner.plan(&incident, std::slice::from_ref(&runbook), &pack, &[]);

    let engine = PreviewEngine::new(cluster, PreviewConfig::default());
    let err = engine
        .preview(&incident, &plan.fix_plans[0], &runbook)
        .await
        .unwrap_err();
    assert!(matches!(err, RemedyError::FixNotApplicable { .. }));
}

// ============================================================================
// Scenario: apply then immediate manual post-check
// ============================================================================

#[tokio::test]
async fn test_apply_then_manual_post_check() {
    let cluster = seeded_cluster().await;
    let incident = crashloop_incident("inc-1");
    let runbook = crashloop_runbook("rb-1", RiskLevel::Medium, 0.8);
    let pack = aggregator(cluster.clone(), 5).gather(&incident, None).await;
    let planner = FixPlanner::new(ConfidenceConfig::default(), vec![]);
    let plan = planner.plan(&incident, std::slice::from_ref(&runbook), &pack, &[]);

    let engine = PreviewEngine::new(cluster.clone(), PreviewConfig::default());
    let preview = engine
        .preview(&incident, &plan.fix_plans[0], &runbook)
        .await
        .unwrap();
    assert!(preview.dry_run_ok());

    let executor = ApplyExecutor::new(cluster.clone());
    executor
        .record_preview(&incident.id, PreviewRecord::from_preview(&preview, &runbook))
        .await;
    let execution = executor
        .apply(
            &incident,
            &ApplyRequest {
                fix_id: preview.fix_id.clone(),
                confirmed: true,
                ack_elevated_risk: false,
                resource_info: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Applied);
    assert!(execution.changes.total() > 0);
    assert!(!execution.log.is_empty());

    // Manual post-check right away, before any scheduled delay, is a
    // valid call and reports against the diagnosis baseline.
    let store = Arc::new(IncidentStore::new());
    store.upsert(incident.clone()).await;
    let verifier = PostCheckVerifier::new(
        cluster.clone(),
        store,
        PostCheckConfig::default(),
        Arc::new(Telemetry::new()),
    );
    let report = verifier.check(&incident, &execution).await;
    assert_eq!(report.verdict, PostCheckVerdict::Improved);
    assert_eq!(report.improved, Some(true));
}

// ============================================================================
// Scenario: feedback loop moves runbook statistics
// ============================================================================

#[tokio::test]
async fn test_feedback_closes_the_loop_into_planner() {
    let registry = Arc::new(RunbookRegistry::new());
    registry
        .register(crashloop_runbook("rb-1", RiskLevel::Medium, 0.5))
        .await;
    let store = Arc::new(IncidentStore::new());
    store.upsert(crashloop_incident("inc-1")).await;

    let recorder = FeedbackRecorder::new(
        registry.clone(),
        store,
        FeedbackConfig::default(),
        Arc::new(Telemetry::new()),
    );

    let before = registry.get("rb-1").await.unwrap().success_rate;
    recorder
        .record(
            "inc-1",
            FeedbackRequest {
                feedback_type: FeedbackType::FixWorked,
                content: None,
                fix_id: Some("fix-inc-1-rb-1".to_string()),
            },
        )
        .await
        .unwrap();

    let after = registry.get("rb-1").await.unwrap();
    assert!(after.success_rate > before);
    assert_eq!(after.execution_count, 1);

    // The planner reads the updated rate: confidence rises.
    let incident = crashloop_incident("inc-1");
    let cluster = seeded_cluster().await;
    let pack = aggregator(cluster, 5).gather(&incident, None).await;
    let planner = FixPlanner::new(ConfidenceConfig::default(), vec![]);

    let stale = crashloop_runbook("rb-1", RiskLevel::Medium, before);
    let fresh = registry.get("rb-1").await.unwrap();
    let plan_before = planner.plan(&incident, std::slice::from_ref(&stale), &pack, &[]);
    let plan_after = planner.plan(&incident, std::slice::from_ref(&fresh), &pack, &[]);
    assert!(plan_after.fix_plans[0].confidence > plan_before.fix_plans[0].confidence);
}
