//! In-memory cluster gateway.
//!
//! Deterministic stand-in for a real cluster: resources are seeded
//! explicitly and failure modes are injected per evidence source. Used
//! by the test suites and by `cluster.mode = "memory"` for clusterless
//! development.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use remedy_common::{
    ChangeRecord, ChangeSummary, ClusterEvent, ClusterGateway, EvidenceSource, GatewayError,
    MetricSample, MutationReport, MutationRequest, ProbeStatus, ResourceRef, ResourceSnapshot,
};
use tokio::sync::RwLock;

/// Everything the gateway knows about one seeded resource.
#[derive(Debug, Clone, Default)]
pub struct FakeResource {
    pub spec: serde_json::Value,
    pub replicas: Option<u32>,
    pub restart_count: u32,
    pub ready: bool,
    pub phase: String,
    pub events: Vec<ClusterEvent>,
    pub logs: Vec<String>,
    pub metrics: Vec<MetricSample>,
    pub changes: Vec<ChangeRecord>,
    pub probes: Vec<ProbeStatus>,
}

/// Injected failure behavior, settable mid-test.
#[derive(Debug, Default)]
struct Behavior {
    fail_sources: HashSet<EvidenceSource>,
    source_delays: HashMap<EvidenceSource, Duration>,
    dry_run_error: Option<String>,
    apply_error: Option<String>,
    apply_delay: Option<Duration>,
    unreachable: bool,
}

pub struct MemoryCluster {
    resources: RwLock<HashMap<ResourceRef, FakeResource>>,
    behavior: RwLock<Behavior>,
    applied: RwLock<Vec<MutationRequest>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
            behavior: RwLock::new(Behavior::default()),
            applied: RwLock::new(Vec::new()),
        }
    }

    pub async fn insert(&self, target: ResourceRef, resource: FakeResource) {
        self.resources.write().await.insert(target, resource);
    }

    /// Make one evidence source fail outright.
    pub async fn fail_source(&self, source: EvidenceSource) {
        self.behavior.write().await.fail_sources.insert(source);
    }

    /// Make one evidence source hang for the given duration.
    pub async fn delay_source(&self, source: EvidenceSource, delay: Duration) {
        self.behavior.write().await.source_delays.insert(source, delay);
    }

    /// Make the next dry-runs fail with this server message.
    pub async fn reject_dry_run(&self, message: &str) {
        self.behavior.write().await.dry_run_error = Some(message.to_string());
    }

    pub async fn fail_apply(&self, message: &str) {
        self.behavior.write().await.apply_error = Some(message.to_string());
    }

    pub async fn clear_apply_failure(&self) {
        self.behavior.write().await.apply_error = None;
    }

    /// Stretch applies out so concurrent-apply behavior can be observed.
    pub async fn slow_apply(&self, delay: Duration) {
        self.behavior.write().await.apply_delay = Some(delay);
    }

    /// Simulate losing the cluster entirely.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.behavior.write().await.unreachable = unreachable;
    }

    /// Mutations that reached `apply`, in order.
    pub async fn applied(&self) -> Vec<MutationRequest> {
        self.applied.read().await.clone()
    }

    async fn gate(&self, source: EvidenceSource) -> Result<(), GatewayError> {
        let (unreachable, failed, delay) = {
            let behavior = self.behavior.read().await;
            (
                behavior.unreachable,
                behavior.fail_sources.contains(&source),
                behavior.source_delays.get(&source).copied(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if unreachable {
            return Err(GatewayError::Unreachable("memory cluster unreachable".into()));
        }
        if failed {
            return Err(GatewayError::Unreachable(format!(
                "injected failure for {:?} source",
                source
            )));
        }
        Ok(())
    }

    async fn resource(&self, target: &ResourceRef) -> Result<FakeResource, GatewayError> {
        self.resources
            .read()
            .await
            .get(target)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(target.clone()))
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterGateway for MemoryCluster {
    async fn fetch_resource(&self, target: &ResourceRef) -> Result<ResourceSnapshot, GatewayError> {
        self.gate(EvidenceSource::Status).await?;
        let resource = self.resource(target).await?;
        Ok(ResourceSnapshot {
            resource: target.clone(),
            spec: resource.spec,
            replicas: resource.replicas,
            restart_count: resource.restart_count,
            ready: resource.ready,
            phase: resource.phase,
        })
    }

    async fn list_events(
        &self,
        target: &ResourceRef,
        _lookback_minutes: u32,
    ) -> Result<Vec<ClusterEvent>, GatewayError> {
        self.gate(EvidenceSource::Event).await?;
        Ok(self.resource(target).await?.events)
    }

    async fn tail_logs(
        &self,
        target: &ResourceRef,
        lines: usize,
    ) -> Result<Vec<String>, GatewayError> {
        self.gate(EvidenceSource::Log).await?;
        let mut logs = self.resource(target).await?.logs;
        if logs.len() > lines {
            logs = logs.split_off(logs.len() - lines);
        }
        Ok(logs)
    }

    async fn read_metrics(&self, target: &ResourceRef) -> Result<Vec<MetricSample>, GatewayError> {
        self.gate(EvidenceSource::Metric).await?;
        Ok(self.resource(target).await?.metrics)
    }

    async fn change_history(
        &self,
        target: &ResourceRef,
        _lookback_minutes: u32,
    ) -> Result<Vec<ChangeRecord>, GatewayError> {
        self.gate(EvidenceSource::Change).await?;
        Ok(self.resource(target).await?.changes)
    }

    async fn probe_status(&self, target: &ResourceRef) -> Result<Vec<ProbeStatus>, GatewayError> {
        self.gate(EvidenceSource::Probe).await?;
        Ok(self.resource(target).await?.probes)
    }

    async fn dry_run(&self, request: &MutationRequest) -> Result<MutationReport, GatewayError> {
        {
            let behavior = self.behavior.read().await;
            if behavior.unreachable {
                return Err(GatewayError::Unreachable("memory cluster unreachable".into()));
            }
            if let Some(message) = &behavior.dry_run_error {
                return Err(GatewayError::Rejected(message.clone()));
            }
        }
        // Target must still exist for the dry-run to validate.
        self.resource(&request.target).await?;
        Ok(MutationReport {
            message: format!("{} (server dry run)", request.command),
            changes: ChangeSummary {
                configured: 1,
                ..Default::default()
            },
            stdout: vec![format!("{} (server dry run)", request.command)],
            stderr: vec![],
        })
    }

    async fn apply(&self, request: &MutationRequest) -> Result<MutationReport, GatewayError> {
        let (delay, error, unreachable) = {
            let behavior = self.behavior.read().await;
            (
                behavior.apply_delay,
                behavior.apply_error.clone(),
                behavior.unreachable,
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if unreachable {
            return Err(GatewayError::Unreachable("memory cluster unreachable".into()));
        }
        if let Some(message) = error {
            return Err(GatewayError::Rejected(message));
        }

        // The mutation lands: mark the target healthy again, the way a
        // successful restart or rollback would eventually settle.
        {
            let mut resources = self.resources.write().await;
            let Some(resource) = resources.get_mut(&request.target) else {
                return Err(GatewayError::NotFound(request.target.clone()));
            };
            resource.restart_count = 0;
            resource.ready = true;
            resource.phase = "Running".to_string();
        }

        self.applied.write().await.push(request.clone());

        Ok(MutationReport {
            message: format!("{}: applied", request.target),
            changes: ChangeSummary {
                configured: 1,
                ..Default::default()
            },
            stdout: vec![format!("{} applied", request.command)],
            stderr: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_common::FixKind;

    fn target() -> ResourceRef {
        ResourceRef::new("prod", "Pod", "api-1")
    }

    fn request() -> MutationRequest {
        MutationRequest {
            fix_id: "fix-inc-1-rb".to_string(),
            kind: FixKind::Restart,
            target: target(),
            command: "kubectl delete pod api-1 -n prod".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_unknown_resource() {
        let cluster = MemoryCluster::new();
        let err = cluster.fetch_resource(&target()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_source_failure() {
        let cluster = MemoryCluster::new();
        cluster.insert(target(), FakeResource::default()).await;
        cluster.fail_source(EvidenceSource::Log).await;
        assert!(cluster.tail_logs(&target(), 10).await.is_err());
        assert!(cluster.list_events(&target(), 60).await.is_ok());
    }

    #[tokio::test]
    async fn test_dry_run_rejection_does_not_mutate() {
        let cluster = MemoryCluster::new();
        cluster
            .insert(
                target(),
                FakeResource {
                    restart_count: 5,
                    ..Default::default()
                },
            )
            .await;
        cluster.reject_dry_run("admission webhook denied").await;

        let err = cluster.dry_run(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
        assert_eq!(
            cluster.fetch_resource(&target()).await.unwrap().restart_count,
            5
        );
        assert!(cluster.applied().await.is_empty());
    }

    #[tokio::test]
    async fn test_apply_settles_resource() {
        let cluster = MemoryCluster::new();
        cluster
            .insert(
                target(),
                FakeResource {
                    restart_count: 12,
                    ready: false,
                    phase: "CrashLoopBackOff".to_string(),
                    ..Default::default()
                },
            )
            .await;

        cluster.apply(&request()).await.unwrap();

        let snapshot = cluster.fetch_resource(&target()).await.unwrap();
        assert_eq!(snapshot.restart_count, 0);
        assert!(snapshot.ready);
        assert_eq!(cluster.applied().await.len(), 1);
    }
}
