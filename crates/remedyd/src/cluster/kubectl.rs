//! kubectl-backed cluster gateway.
//!
//! Every operation shells out to kubectl and parses its output. The
//! dry-run path appends `--dry-run=server` so validation and admission
//! run on the API server without mutating anything.

use std::process::Stdio;

use async_trait::async_trait;
use remedy_common::{
    ChangeRecord, ChangeSummary, ClusterEvent, ClusterGateway, GatewayError, MetricSample,
    MutationReport, MutationRequest, ProbeStatus, ResourceRef, ResourceSnapshot, Severity,
};
use tokio::process::Command;
use tracing::{info, warn};

/// Event reasons that count as changes to the resource, not just noise.
const CHANGE_REASONS: &[&str] = &[
    "Scheduled",
    "Pulled",
    "Created",
    "Started",
    "Killing",
    "ScalingReplicaSet",
    "SuccessfulCreate",
    "SuccessfulDelete",
];

pub struct KubectlGateway {
    bin: String,
}

impl KubectlGateway {
    pub fn new(bin: &str) -> Self {
        Self {
            bin: bin.to_string(),
        }
    }

    /// Run a kubectl invocation, mapping failures onto gateway errors.
    async fn run(&self, args: &[&str]) -> Result<String, GatewayError> {
        info!("[KUBECTL] {} {}", self.bin, args.join(" "));

        let output = Command::new(&self.bin)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| GatewayError::Unreachable(format!("failed to run {}: {}", self.bin, e)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(classify_failure(&stderr))
        }
    }

    /// Split a rendered command string into kubectl arguments, dropping
    /// the leading binary name if present.
    fn command_args(command: &str) -> Vec<String> {
        let mut parts: Vec<String> = command.split_whitespace().map(String::from).collect();
        if parts.first().map(|p| p == "kubectl").unwrap_or(false) {
            parts.remove(0);
        }
        parts
    }

    async fn run_command(&self, command: &str, dry_run: bool) -> Result<MutationReport, GatewayError> {
        let mut args = Self::command_args(command);
        if dry_run && !args.iter().any(|a| a.starts_with("--dry-run")) {
            args.push("--dry-run=server".to_string());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self.run(&arg_refs).await?;

        let lines: Vec<String> = stdout.lines().map(String::from).collect();
        Ok(MutationReport {
            message: lines.first().cloned().unwrap_or_else(|| "ok".to_string()),
            changes: summarize_changes(&lines),
            stdout: lines,
            stderr: vec![],
        })
    }
}

/// Map kubectl stderr onto the gateway error taxonomy.
fn classify_failure(stderr: &str) -> GatewayError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("notfound") || lowered.contains("not found") {
        GatewayError::Rejected(stderr.to_string())
    } else if lowered.contains("forbidden") || lowered.contains("unauthorized") {
        GatewayError::PermissionDenied(stderr.to_string())
    } else if lowered.contains("connection refused")
        || lowered.contains("unable to connect")
        || lowered.contains("i/o timeout")
    {
        GatewayError::Unreachable(stderr.to_string())
    } else {
        GatewayError::Rejected(stderr.to_string())
    }
}

/// Count created/configured/deleted markers in kubectl output lines.
fn summarize_changes(lines: &[String]) -> ChangeSummary {
    let mut summary = ChangeSummary::default();
    for line in lines {
        if line.ends_with("created") {
            summary.created += 1;
        } else if line.ends_with("configured")
            || line.ends_with("patched")
            || line.ends_with("scaled")
            || line.ends_with("restarted")
            || line.ends_with("rolled back")
        {
            summary.configured += 1;
        } else if line.ends_with("deleted") {
            summary.deleted += 1;
        }
    }
    summary
}

/// Pull the fields the workflow needs out of a `kubectl get -o json`
/// document.
fn parse_resource(target: &ResourceRef, doc: &serde_json::Value) -> ResourceSnapshot {
    let status = &doc["status"];
    let spec = doc["spec"].clone();

    let replicas = spec["replicas"].as_u64().map(|r| r as u32);

    let restart_count = status["containerStatuses"]
        .as_array()
        .map(|cs| {
            cs.iter()
                .filter_map(|c| c["restartCount"].as_u64())
                .sum::<u64>() as u32
        })
        .unwrap_or(0);

    let ready = status["conditions"]
        .as_array()
        .map(|conds| {
            conds.iter().any(|c| {
                c["type"].as_str() == Some("Ready") && c["status"].as_str() == Some("True")
            })
        })
        .unwrap_or(false);

    let phase = status["phase"].as_str().unwrap_or("Unknown").to_string();

    ResourceSnapshot {
        resource: target.clone(),
        spec,
        replicas,
        restart_count,
        ready,
        phase,
    }
}

fn parse_events(doc: &serde_json::Value) -> Vec<ClusterEvent> {
    let Some(items) = doc["items"].as_array() else {
        return vec![];
    };
    items
        .iter()
        .map(|item| ClusterEvent {
            reason: item["reason"].as_str().unwrap_or("").to_string(),
            message: item["message"].as_str().unwrap_or("").to_string(),
            severity: match item["type"].as_str() {
                Some("Warning") => Severity::High,
                _ => Severity::Info,
            },
            timestamp: item["lastTimestamp"]
                .as_str()
                .or_else(|| item["eventTime"].as_str())
                .unwrap_or("")
                .to_string(),
            count: item["count"].as_u64().unwrap_or(1) as u32,
        })
        .collect()
}

/// `kubectl top` line: `NAME CPU(cores) MEMORY(bytes)`.
fn parse_top_line(line: &str) -> Vec<MetricSample> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 3 {
        return vec![];
    }
    let mut samples = vec![];
    if let Some(cpu) = cols[1].strip_suffix('m').and_then(|v| v.parse::<f64>().ok()) {
        samples.push(MetricSample {
            name: "cpu_usage".to_string(),
            value: cpu,
            unit: "millicores".to_string(),
        });
    }
    if let Some(mem) = cols[2].strip_suffix("Mi").and_then(|v| v.parse::<f64>().ok()) {
        samples.push(MetricSample {
            name: "memory_usage".to_string(),
            value: mem,
            unit: "Mi".to_string(),
        });
    }
    samples
}

fn parse_probes(doc: &serde_json::Value) -> Vec<ProbeStatus> {
    let mut probes = vec![];
    if let Some(conds) = doc["status"]["conditions"].as_array() {
        for cond in conds {
            let cond_type = cond["type"].as_str().unwrap_or("");
            if cond_type == "Ready" || cond_type == "ContainersReady" {
                probes.push(ProbeStatus {
                    probe: if cond_type == "Ready" {
                        "readiness".to_string()
                    } else {
                        "liveness".to_string()
                    },
                    healthy: cond["status"].as_str() == Some("True"),
                    detail: cond["message"].as_str().unwrap_or("").to_string(),
                });
            }
        }
    }
    probes
}

#[async_trait]
impl ClusterGateway for KubectlGateway {
    async fn fetch_resource(&self, target: &ResourceRef) -> Result<ResourceSnapshot, GatewayError> {
        let stdout = self
            .run(&[
                "get",
                &target.kind.to_lowercase(),
                &target.name,
                "-n",
                &target.namespace,
                "-o",
                "json",
            ])
            .await
            .map_err(|e| match e {
                GatewayError::Rejected(msg)
                    if msg.to_lowercase().contains("notfound")
                        || msg.to_lowercase().contains("not found") =>
                {
                    GatewayError::NotFound(target.clone())
                }
                other => other,
            })?;

        let doc: serde_json::Value = serde_json::from_str(&stdout)
            .map_err(|e| GatewayError::Rejected(format!("unparseable resource JSON: {}", e)))?;
        Ok(parse_resource(target, &doc))
    }

    async fn list_events(
        &self,
        target: &ResourceRef,
        _lookback_minutes: u32,
    ) -> Result<Vec<ClusterEvent>, GatewayError> {
        let selector = format!("involvedObject.name={}", target.name);
        let stdout = self
            .run(&[
                "get",
                "events",
                "-n",
                &target.namespace,
                "--field-selector",
                &selector,
                "-o",
                "json",
            ])
            .await?;
        let doc: serde_json::Value = serde_json::from_str(&stdout)
            .map_err(|e| GatewayError::Rejected(format!("unparseable events JSON: {}", e)))?;
        Ok(parse_events(&doc))
    }

    async fn tail_logs(
        &self,
        target: &ResourceRef,
        lines: usize,
    ) -> Result<Vec<String>, GatewayError> {
        let tail = format!("--tail={}", lines);
        let stdout = self
            .run(&["logs", &target.name, "-n", &target.namespace, &tail])
            .await?;
        Ok(stdout.lines().map(String::from).collect())
    }

    async fn read_metrics(&self, target: &ResourceRef) -> Result<Vec<MetricSample>, GatewayError> {
        let stdout = self
            .run(&[
                "top",
                "pod",
                &target.name,
                "-n",
                &target.namespace,
                "--no-headers",
            ])
            .await?;
        Ok(stdout.lines().flat_map(parse_top_line).collect())
    }

    async fn change_history(
        &self,
        target: &ResourceRef,
        lookback_minutes: u32,
    ) -> Result<Vec<ChangeRecord>, GatewayError> {
        let events = self.list_events(target, lookback_minutes).await?;
        Ok(events
            .into_iter()
            .filter(|e| CHANGE_REASONS.contains(&e.reason.as_str()))
            .map(|e| ChangeRecord {
                change_type: e.reason.clone(),
                timestamp: e.timestamp,
                resource: target.clone(),
                severity: e.severity,
                reason: e.reason,
                message: e.message,
            })
            .collect())
    }

    async fn probe_status(&self, target: &ResourceRef) -> Result<Vec<ProbeStatus>, GatewayError> {
        let stdout = self
            .run(&[
                "get",
                &target.kind.to_lowercase(),
                &target.name,
                "-n",
                &target.namespace,
                "-o",
                "json",
            ])
            .await?;
        let doc: serde_json::Value = serde_json::from_str(&stdout)
            .map_err(|e| GatewayError::Rejected(format!("unparseable resource JSON: {}", e)))?;
        Ok(parse_probes(&doc))
    }

    async fn dry_run(&self, request: &MutationRequest) -> Result<MutationReport, GatewayError> {
        self.run_command(&request.command, true).await
    }

    async fn apply(&self, request: &MutationRequest) -> Result<MutationReport, GatewayError> {
        warn!(
            "[KUBECTL] Applying {} fix to {}",
            request.kind, request.target
        );
        self.run_command(&request.command, false).await
    }
}
