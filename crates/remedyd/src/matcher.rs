//! Runbook registry and matcher.
//!
//! Matching is exact on failure pattern - an ambiguous pattern is a
//! registry authoring error, not something resolved at runtime. Ties are
//! broken by success rate (descending), then risk (safer first), then id
//! so the order is total and stable across calls.

use remedy_common::{
    AutonomyLevel, CommandTemplate, EvidenceSource, FailurePattern, FixKind, Runbook, RiskLevel,
};
use tokio::sync::RwLock;
use tracing::info;

pub struct RunbookRegistry {
    runbooks: RwLock<Vec<Runbook>>,
}

impl RunbookRegistry {
    pub fn new() -> Self {
        Self {
            runbooks: RwLock::new(Vec::new()),
        }
    }

    /// Registry seeded with the built-in remediation catalogue.
    pub fn with_builtin_runbooks() -> Self {
        Self {
            runbooks: RwLock::new(builtin_runbooks()),
        }
    }

    pub async fn register(&self, runbook: Runbook) {
        let mut runbooks = self.runbooks.write().await;
        info!("[RUNBOOK] Registered {} ({})", runbook.id, runbook.pattern);
        runbooks.retain(|rb| rb.id != runbook.id);
        runbooks.push(runbook);
    }

    pub async fn get(&self, id: &str) -> Option<Runbook> {
        self.runbooks.read().await.iter().find(|rb| rb.id == id).cloned()
    }

    pub async fn all(&self) -> Vec<Runbook> {
        self.runbooks.read().await.clone()
    }

    /// Enabled runbooks matching the incident's pattern, best first.
    /// An empty result is a valid answer, not an error.
    pub async fn match_for(&self, pattern: FailurePattern) -> Vec<Runbook> {
        let mut matched: Vec<Runbook> = self
            .runbooks
            .read()
            .await
            .iter()
            .filter(|rb| rb.enabled && rb.pattern == pattern)
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            b.success_rate
                .total_cmp(&a.success_rate)
                .then(a.risk.cmp(&b.risk))
                .then(a.id.cmp(&b.id))
        });
        matched
    }

    /// Fold one observed outcome into a runbook's rolling statistics.
    /// This is the feedback recorder's write path; nothing else mutates
    /// runbook stats.
    pub async fn record_outcome(
        &self,
        runbook_id: &str,
        success: bool,
        alpha: f64,
    ) -> Option<(f64, u64)> {
        let mut runbooks = self.runbooks.write().await;
        let runbook = runbooks.iter_mut().find(|rb| rb.id == runbook_id)?;

        let outcome = if success { 1.0 } else { 0.0 };
        runbook.success_rate =
            ((1.0 - alpha) * runbook.success_rate + alpha * outcome).clamp(0.0, 1.0);
        runbook.execution_count += 1;

        info!(
            "[RUNBOOK] {} outcome={} rate={:.3} executions={}",
            runbook_id, success, runbook.success_rate, runbook.execution_count
        );
        Some((runbook.success_rate, runbook.execution_count))
    }
}

impl Default for RunbookRegistry {
    fn default() -> Self {
        Self::with_builtin_runbooks()
    }
}

/// The built-in remediation catalogue. Seed success rates reflect field
/// history and keep moving via feedback.
fn builtin_runbooks() -> Vec<Runbook> {
    vec![
        Runbook {
            id: "restart-pod".to_string(),
            name: "Restart Pod".to_string(),
            description: "Delete the pod so its controller recreates it".to_string(),
            pattern: FailurePattern::RestartStorm,
            kind: FixKind::Restart,
            risk: RiskLevel::Low,
            autonomy_level: AutonomyLevel::AutoExecute,
            commands: CommandTemplate {
                dry_run: "kubectl delete pod {name} -n {namespace} --dry-run=server".to_string(),
                apply: "kubectl delete pod {name} -n {namespace}".to_string(),
                rollback: None,
            },
            success_rate: 0.95,
            execution_count: 0,
            enabled: true,
            cited_evidence: vec![EvidenceSource::Event, EvidenceSource::Status],
        },
        Runbook {
            id: "rolling-restart".to_string(),
            name: "Rolling Restart Deployment".to_string(),
            description: "Trigger a rolling restart of all pods in the deployment".to_string(),
            pattern: FailurePattern::RestartStorm,
            kind: FixKind::Restart,
            risk: RiskLevel::Low,
            autonomy_level: AutonomyLevel::AutoExecute,
            commands: CommandTemplate {
                dry_run: "kubectl rollout restart deployment {name} -n {namespace} --dry-run=server"
                    .to_string(),
                apply: "kubectl rollout restart deployment {name} -n {namespace}".to_string(),
                rollback: None,
            },
            success_rate: 0.95,
            execution_count: 0,
            enabled: true,
            cited_evidence: vec![EvidenceSource::Event, EvidenceSource::Status],
        },
        Runbook {
            id: "restart-storm-rollback".to_string(),
            name: "Rollback Deployment".to_string(),
            description: "Roll back to the previous revision when a recent change likely caused the storm"
                .to_string(),
            pattern: FailurePattern::RestartStorm,
            kind: FixKind::Rollback,
            risk: RiskLevel::Medium,
            autonomy_level: AutonomyLevel::Recommend,
            commands: CommandTemplate {
                dry_run: "kubectl rollout undo deployment {name} -n {namespace} --dry-run=server"
                    .to_string(),
                apply: "kubectl rollout undo deployment {name} -n {namespace}".to_string(),
                rollback: Some("kubectl rollout undo deployment {name} -n {namespace}".to_string()),
            },
            success_rate: 0.80,
            execution_count: 0,
            enabled: true,
            cited_evidence: vec![EvidenceSource::Change],
        },
        Runbook {
            id: "restart-storm-increase-memory".to_string(),
            name: "Increase Memory Limit (+25%)".to_string(),
            description: "Raise the container memory limit when OOM evidence accompanies the restarts"
                .to_string(),
            pattern: FailurePattern::RestartStorm,
            kind: FixKind::Patch,
            risk: RiskLevel::Medium,
            autonomy_level: AutonomyLevel::Recommend,
            commands: CommandTemplate {
                dry_run: "kubectl patch deployment {name} -n {namespace} --type=json -p='[{\"op\":\"replace\",\"path\":\"/spec/template/spec/containers/0/resources/limits/memory\",\"value\":\"+25%\"}]' --dry-run=server"
                    .to_string(),
                apply: "kubectl patch deployment {name} -n {namespace} --type=json -p='[{\"op\":\"replace\",\"path\":\"/spec/template/spec/containers/0/resources/limits/memory\",\"value\":\"+25%\"}]'"
                    .to_string(),
                rollback: Some(
                    "kubectl rollout undo deployment {name} -n {namespace}".to_string(),
                ),
            },
            success_rate: 0.85,
            execution_count: 0,
            enabled: true,
            cited_evidence: vec![EvidenceSource::Event, EvidenceSource::Metric],
        },
        Runbook {
            id: "crashloop-rollback".to_string(),
            name: "Rollback Deployment".to_string(),
            description: "Roll back to the previous revision of the crashing deployment".to_string(),
            pattern: FailurePattern::Crashloop,
            kind: FixKind::Rollback,
            risk: RiskLevel::Medium,
            autonomy_level: AutonomyLevel::Recommend,
            commands: CommandTemplate {
                dry_run: "kubectl rollout undo deployment {name} -n {namespace} --dry-run=server"
                    .to_string(),
                apply: "kubectl rollout undo deployment {name} -n {namespace}".to_string(),
                rollback: Some("kubectl rollout undo deployment {name} -n {namespace}".to_string()),
            },
            success_rate: 0.90,
            execution_count: 0,
            enabled: true,
            cited_evidence: vec![EvidenceSource::Change, EvidenceSource::Log],
        },
        Runbook {
            id: "oom-increase-memory-limit".to_string(),
            name: "Increase Memory Limit".to_string(),
            description: "Raise the memory limit by 50% and set the request to 80% of it".to_string(),
            pattern: FailurePattern::OomPressure,
            kind: FixKind::Patch,
            risk: RiskLevel::Medium,
            autonomy_level: AutonomyLevel::Recommend,
            commands: CommandTemplate {
                dry_run: "kubectl patch deployment {name} -n {namespace} --type=json -p='[{\"op\":\"replace\",\"path\":\"/spec/template/spec/containers/0/resources/limits/memory\",\"value\":\"+50%\"}]' --dry-run=server"
                    .to_string(),
                apply: "kubectl patch deployment {name} -n {namespace} --type=json -p='[{\"op\":\"replace\",\"path\":\"/spec/template/spec/containers/0/resources/limits/memory\",\"value\":\"+50%\"}]'"
                    .to_string(),
                rollback: Some(
                    "kubectl rollout undo deployment {name} -n {namespace}".to_string(),
                ),
            },
            success_rate: 0.85,
            execution_count: 0,
            enabled: true,
            cited_evidence: vec![EvidenceSource::Event, EvidenceSource::Metric],
        },
        Runbook {
            id: "relax-liveness-probe".to_string(),
            name: "Relax Liveness Probe Thresholds".to_string(),
            description: "Increase probe timeout and period when probe failures drive the restarts"
                .to_string(),
            pattern: FailurePattern::LivenessFailure,
            kind: FixKind::Patch,
            risk: RiskLevel::Medium,
            autonomy_level: AutonomyLevel::Recommend,
            commands: CommandTemplate {
                dry_run: "kubectl patch deployment {name} -n {namespace} --type=json -p='[{\"op\":\"replace\",\"path\":\"/spec/template/spec/containers/0/livenessProbe/timeoutSeconds\",\"value\":5}]' --dry-run=server"
                    .to_string(),
                apply: "kubectl patch deployment {name} -n {namespace} --type=json -p='[{\"op\":\"replace\",\"path\":\"/spec/template/spec/containers/0/livenessProbe/timeoutSeconds\",\"value\":5}]'"
                    .to_string(),
                rollback: Some(
                    "kubectl rollout undo deployment {name} -n {namespace}".to_string(),
                ),
            },
            success_rate: 0.75,
            execution_count: 0,
            enabled: true,
            cited_evidence: vec![EvidenceSource::Log, EvidenceSource::Probe],
        },
        Runbook {
            id: "pending-scheduling-fix".to_string(),
            name: "Fix Pod Scheduling".to_string(),
            description: "Adjust tolerations or node selectors based on scheduling events".to_string(),
            pattern: FailurePattern::PendingPod,
            kind: FixKind::Patch,
            risk: RiskLevel::Low,
            autonomy_level: AutonomyLevel::Recommend,
            commands: CommandTemplate {
                dry_run: "kubectl patch pod {name} -n {namespace} --type=strategic -p='{\"spec\":{\"tolerations\":[]}}' --dry-run=server"
                    .to_string(),
                apply: "kubectl patch pod {name} -n {namespace} --type=strategic -p='{\"spec\":{\"tolerations\":[]}}'"
                    .to_string(),
                rollback: None,
            },
            success_rate: 0.75,
            execution_count: 0,
            enabled: true,
            cited_evidence: vec![EvidenceSource::Event],
        },
        Runbook {
            id: "image-pull-validate".to_string(),
            name: "Validate Image Configuration".to_string(),
            description: "Re-point the image reference after validating registry and pull secrets"
                .to_string(),
            pattern: FailurePattern::ImagePullFailure,
            kind: FixKind::Patch,
            risk: RiskLevel::Low,
            autonomy_level: AutonomyLevel::Recommend,
            commands: CommandTemplate {
                dry_run: "kubectl patch deployment {name} -n {namespace} --type=strategic -p='{\"spec\":{\"template\":{\"spec\":{\"containers\":[]}}}}' --dry-run=server"
                    .to_string(),
                apply: "kubectl patch deployment {name} -n {namespace} --type=strategic -p='{\"spec\":{\"template\":{\"spec\":{\"containers\":[]}}}}'"
                    .to_string(),
                rollback: None,
            },
            success_rate: 0.70,
            execution_count: 0,
            enabled: true,
            cited_evidence: vec![EvidenceSource::Event],
        },
        Runbook {
            id: "scale-up-deployment".to_string(),
            name: "Scale Up Deployment".to_string(),
            description: "Add a replica to restore service availability".to_string(),
            pattern: FailurePattern::NoReadyEndpoints,
            kind: FixKind::Scale,
            risk: RiskLevel::Low,
            autonomy_level: AutonomyLevel::AutoExecute,
            commands: CommandTemplate {
                dry_run: "kubectl scale deployment {name} -n {namespace} --replicas=+1 --dry-run=server"
                    .to_string(),
                apply: "kubectl scale deployment {name} -n {namespace} --replicas=+1".to_string(),
                rollback: Some(
                    "kubectl scale deployment {name} -n {namespace} --replicas=-1".to_string(),
                ),
            },
            success_rate: 0.90,
            execution_count: 0,
            enabled: true,
            cited_evidence: vec![EvidenceSource::Status],
        },
    ]
}
