//! Cluster gateway contract.
//!
//! The workflow engine never talks to Kubernetes directly; it goes
//! through this trait. No particular client library is prescribed - the
//! daemon ships a kubectl-backed implementation and an in-memory one for
//! tests, and any client satisfying this contract plugs in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::execution::ChangeSummary;
use crate::incident::{ResourceRef, Severity};
use crate::runbook::FixKind;

/// Point-in-time view of one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub resource: ResourceRef,
    /// Current spec as reported by the API server, used for diff
    /// rendering.
    pub spec: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    pub restart_count: u32,
    pub ready: bool,
    pub phase: String,
}

/// A raw cluster event. Timestamps arrive as raw strings and are
/// normalized by the evidence aggregator, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEvent {
    pub reason: String,
    pub message: String,
    pub severity: Severity,
    pub timestamp: String,
    pub count: u32,
}

/// One metric observation for the target resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

/// Latest liveness/readiness probe outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeStatus {
    pub probe: String,
    pub healthy: bool,
    pub detail: String,
}

/// One recorded change to a watched resource, pre-normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub change_type: String,
    pub timestamp: String,
    pub resource: ResourceRef,
    pub severity: Severity,
    pub reason: String,
    pub message: String,
}

/// A fully-resolved mutation ready for dry-run or execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRequest {
    pub fix_id: String,
    pub kind: FixKind,
    pub target: ResourceRef,
    /// The rendered command, equivalent to what an operator would run.
    pub command: String,
}

/// Result of a dry-run or apply that the API server accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationReport {
    pub message: String,
    pub changes: ChangeSummary,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Failures at the cluster boundary.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("resource not found: {0}")]
    NotFound(ResourceRef),

    /// The API server rejected the request (validation, admission,
    /// conflict). Carries the server's message verbatim.
    #[error("{0}")]
    Rejected(String),

    #[error("cluster unreachable: {0}")]
    Unreachable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

/// Read and mutate operations the workflow engine needs from a cluster.
///
/// All reads are side-effect free. `dry_run` must not mutate cluster
/// state; `apply` is the single mutating entry point.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn fetch_resource(&self, target: &ResourceRef) -> Result<ResourceSnapshot, GatewayError>;

    async fn list_events(
        &self,
        target: &ResourceRef,
        lookback_minutes: u32,
    ) -> Result<Vec<ClusterEvent>, GatewayError>;

    async fn tail_logs(
        &self,
        target: &ResourceRef,
        lines: usize,
    ) -> Result<Vec<String>, GatewayError>;

    async fn read_metrics(&self, target: &ResourceRef) -> Result<Vec<MetricSample>, GatewayError>;

    async fn change_history(
        &self,
        target: &ResourceRef,
        lookback_minutes: u32,
    ) -> Result<Vec<ChangeRecord>, GatewayError>;

    async fn probe_status(&self, target: &ResourceRef) -> Result<Vec<ProbeStatus>, GatewayError>;

    /// Server-side dry-run of the mutation. Must leave the cluster
    /// untouched.
    async fn dry_run(&self, request: &MutationRequest) -> Result<MutationReport, GatewayError>;

    /// Perform the real mutation.
    async fn apply(&self, request: &MutationRequest) -> Result<MutationReport, GatewayError>;
}
