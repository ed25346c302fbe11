//! Fix preview engine.
//!
//! Materializes a FixPlan into an inspectable mutation: a diff of the
//! resource spec, the equivalent kubectl commands, and a server-side
//! dry-run verdict. Never mutates the cluster, and never caches - the
//! cluster may have changed between calls, so every preview is fresh.
//! Freshness at apply time is the executor's job, not this engine's.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use remedy_common::{
    ClusterGateway, CommandTemplate, FixKind, FixPlan, FixPreview, GatewayError, Incident,
    MutationRequest, PreviewConfig, RemedyError, ResourceSnapshot, RollbackPlan, Runbook,
};
use tracing::info;

pub struct PreviewEngine {
    gateway: Arc<dyn ClusterGateway>,
    config: PreviewConfig,
}

impl PreviewEngine {
    pub fn new(gateway: Arc<dyn ClusterGateway>, config: PreviewConfig) -> Self {
        Self { gateway, config }
    }

    /// Generate a preview for one planned fix.
    ///
    /// Outcomes:
    /// - dry-run accepted: `dry_run_output` set, apply permitted
    /// - dry-run rejected: `dry_run_error` set verbatim, apply blocked
    /// - resolution failed: `FixNotApplicable`, no preview at all
    pub async fn preview(
        &self,
        incident: &Incident,
        plan: &FixPlan,
        runbook: &Runbook,
    ) -> Result<FixPreview, RemedyError> {
        let target = &incident.resource;

        // Resolution: the fix must still make sense against live state.
        let snapshot = match self.gateway.fetch_resource(target).await {
            Ok(snapshot) => snapshot,
            Err(GatewayError::NotFound(resource)) => {
                return Err(RemedyError::FixNotApplicable {
                    reason: format!("target resource {} no longer exists", resource),
                })
            }
            Err(GatewayError::Unreachable(msg)) => {
                return Err(RemedyError::ClusterUnreachable(msg))
            }
            Err(e) => {
                return Err(RemedyError::FixNotApplicable {
                    reason: e.to_string(),
                })
            }
        };

        let commands = vec![CommandTemplate::render(&runbook.commands.apply, target)];
        let diff = render_diff(&snapshot, plan.kind);
        let rollback = rollback_plan(runbook, incident);

        // Server-side dry-run of the actual mutation, under a timeout so
        // a wedged API server surfaces as PreviewTimeout rather than a
        // hung request.
        let request = MutationRequest {
            fix_id: plan.id.clone(),
            kind: plan.kind,
            target: target.clone(),
            command: CommandTemplate::render(&runbook.commands.dry_run, target),
        };
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let (dry_run_output, dry_run_error) =
            match tokio::time::timeout(timeout, self.gateway.dry_run(&request)).await {
                Ok(Ok(report)) => {
                    let mut out = report.message.clone();
                    if report.changes.total() > 0 {
                        out.push_str(&format!(
                            "\n{} created, {} configured, {} deleted",
                            report.changes.created,
                            report.changes.configured,
                            report.changes.deleted
                        ));
                    }
                    (out, String::new())
                }
                Ok(Err(GatewayError::Rejected(msg)))
                | Ok(Err(GatewayError::PermissionDenied(msg))) => (String::new(), msg),
                Ok(Err(GatewayError::NotFound(resource))) => {
                    return Err(RemedyError::FixNotApplicable {
                        reason: format!("target resource {} no longer exists", resource),
                    })
                }
                Ok(Err(GatewayError::Unreachable(msg))) => {
                    return Err(RemedyError::ClusterUnreachable(msg))
                }
                Err(_) => {
                    return Err(RemedyError::PreviewTimeout {
                        seconds: self.config.timeout_secs,
                    })
                }
            };

        info!(
            "[PREVIEW] {} for {}: {}",
            plan.id,
            incident.id,
            if dry_run_error.is_empty() { "accepted" } else { "rejected" }
        );

        Ok(FixPreview {
            fix_id: plan.id.clone(),
            title: plan.title.clone(),
            kind: plan.kind,
            risk: plan.risk,
            confidence: plan.confidence,
            why_this_fix: plan.why_this_fix.clone(),
            diff,
            commands,
            dry_run_output,
            dry_run_error,
            rollback,
            evidence_refs: plan.evidence_refs.clone(),
            generated_at: Utc::now(),
        })
    }
}

fn rollback_plan(runbook: &Runbook, incident: &Incident) -> RollbackPlan {
    match &runbook.commands.rollback {
        Some(template) => RollbackPlan {
            description: "Restore the previous state".to_string(),
            commands: vec![CommandTemplate::render(template, &incident.resource)],
        },
        None => RollbackPlan {
            description: "No rollback needed; the controller reconciles the resource".to_string(),
            commands: vec![],
        },
    }
}

/// Project what the spec looks like after the fix lands.
fn project_spec(spec: &serde_json::Value, kind: FixKind) -> Option<serde_json::Value> {
    if kind == FixKind::Delete {
        return None;
    }
    let mut after = spec.clone();
    // Indexed assignment below needs an object (or null, which
    // serde_json promotes to one).
    if !(after.is_object() || after.is_null()) {
        return Some(after);
    }
    match kind {
        FixKind::Scale => {
            let replicas = after["replicas"].as_u64().unwrap_or(1);
            after["replicas"] = serde_json::json!(replicas + 1);
        }
        FixKind::Restart => {
            after["annotations"]["remedy.io/restarted-at"] = serde_json::json!("(set on apply)");
        }
        FixKind::Rollback => {
            after["annotations"]["remedy.io/rolled-back-to"] =
                serde_json::json!("previous revision");
        }
        FixKind::Patch => {
            after["annotations"]["remedy.io/patched"] = serde_json::json!("(see commands)");
        }
        FixKind::Delete => {}
    }
    Some(after)
}

/// Human-readable before/after diff of the resource spec in YAML.
fn render_diff(snapshot: &ResourceSnapshot, kind: FixKind) -> String {
    let before = serde_yaml::to_string(&snapshot.spec).unwrap_or_default();
    let after = project_spec(&snapshot.spec, kind)
        .map(|spec| serde_yaml::to_string(&spec).unwrap_or_default())
        .unwrap_or_default();

    let mut out = format!(
        "--- {} (current)\n+++ {} (proposed)\n",
        snapshot.resource, snapshot.resource
    );
    for change in diff_lines(&before, &after) {
        out.push_str(&change);
        out.push('\n');
    }
    out
}

/// Positional line diff, good enough for single-resource specs.
fn diff_lines(before: &str, after: &str) -> Vec<String> {
    let before: Vec<&str> = before.lines().collect();
    let after: Vec<&str> = after.lines().collect();
    let mut out = vec![];
    let max = before.len().max(after.len());
    for i in 0..max {
        match (before.get(i), after.get(i)) {
            (Some(b), Some(a)) if b == a => out.push(format!("  {}", b)),
            (Some(b), Some(a)) => {
                out.push(format!("- {}", b));
                out.push(format!("+ {}", a));
            }
            (Some(b), None) => out.push(format!("- {}", b)),
            (None, Some(a)) => out.push(format!("+ {}", a)),
            (None, None) => {}
        }
    }
    out
}
