//! Post-check verifier.
//!
//! After a successful apply the incident is re-examined once the fix has
//! had time to settle. The settle delay is per fix kind (configuration,
//! not a constant). Scheduling is fire-and-forget relative to the apply
//! response; an incident resolved in the meantime makes the scheduled
//! check a no-op. "Couldn't verify" is reported as inconclusive, never
//! as "not improved".

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use remedy_common::{
    ClusterGateway, Execution, GatewayError, Incident, PostCheckConfig,
};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::store::IncidentStore;
use crate::telemetry::Telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostCheckVerdict {
    Improved,
    NotImproved,
    Inconclusive,
}

impl PostCheckVerdict {
    fn label(&self) -> &'static str {
        match self {
            PostCheckVerdict::Improved => "improved",
            PostCheckVerdict::NotImproved => "not_improved",
            PostCheckVerdict::Inconclusive => "inconclusive",
        }
    }
}

/// One named check inside a post-check report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub name: String,
    pub ok: bool,
    pub message: String,
}

/// Result of re-evaluating an incident after a fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCheckReport {
    pub incident_id: String,
    pub execution_id: String,
    pub verdict: PostCheckVerdict,
    /// Omitted when the verdict is inconclusive; callers must not read
    /// an absent value as "made it worse".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improved: Option<bool>,
    pub checks: Vec<CheckOutcome>,
    pub checked_at: DateTime<Utc>,
}

pub struct PostCheckVerifier {
    gateway: Arc<dyn ClusterGateway>,
    store: Arc<IncidentStore>,
    config: PostCheckConfig,
    telemetry: Arc<Telemetry>,
}

impl PostCheckVerifier {
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        store: Arc<IncidentStore>,
        config: PostCheckConfig,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            gateway,
            store,
            config,
            telemetry,
        }
    }

    /// Schedule the automatic check after the fix's settle delay. Called
    /// after the apply response is already on its way to the caller.
    pub fn schedule(self: &Arc<Self>, incident: Incident, execution: Execution) {
        let verifier = Arc::clone(self);
        let delay = Duration::from_secs(verifier.config.settle_delay_secs(execution.kind));
        tokio::spawn(async move {
            sleep(delay).await;

            if !verifier.store.is_active(&execution.incident_id).await {
                info!(
                    "[POSTCHECK] {} resolved before scheduled check; skipping",
                    execution.incident_id
                );
                return;
            }

            let report = verifier.check(&incident, &execution).await;
            info!(
                "[POSTCHECK] {} after {}: {}",
                execution.incident_id,
                execution.execution_id,
                report.verdict.label()
            );
        });
    }

    /// Re-run the status/probe slice of the evidence and judge whether
    /// the incident improved. Valid before the scheduled delay fires.
    pub async fn check(&self, incident: &Incident, execution: &Execution) -> PostCheckReport {
        let checked_at = Utc::now();

        let snapshot = match self.gateway.fetch_resource(&incident.resource).await {
            Ok(snapshot) => snapshot,
            Err(GatewayError::Unreachable(msg)) | Err(GatewayError::PermissionDenied(msg)) => {
                warn!("[POSTCHECK] {} inconclusive: {}", incident.id, msg);
                return self.report(
                    incident,
                    execution,
                    PostCheckVerdict::Inconclusive,
                    vec![CheckOutcome {
                        name: "Cluster reachability".to_string(),
                        ok: false,
                        message: msg,
                    }],
                    checked_at,
                );
            }
            Err(e) => {
                return self.report(
                    incident,
                    execution,
                    PostCheckVerdict::Inconclusive,
                    vec![CheckOutcome {
                        name: "Resource lookup".to_string(),
                        ok: false,
                        message: e.to_string(),
                    }],
                    checked_at,
                );
            }
        };

        let baseline_restarts = incident
            .diagnosis
            .as_ref()
            .map(|d| d.restart_count)
            .unwrap_or(0);

        let mut checks = vec![];

        let restarts_ok = snapshot.restart_count <= baseline_restarts;
        checks.push(CheckOutcome {
            name: "Restart rate".to_string(),
            ok: restarts_ok,
            message: format!(
                "{} restarts now vs {} at diagnosis",
                snapshot.restart_count, baseline_restarts
            ),
        });

        checks.push(CheckOutcome {
            name: "Readiness".to_string(),
            ok: snapshot.ready,
            message: if snapshot.ready {
                "resource is ready".to_string()
            } else {
                format!("resource not ready (phase {})", snapshot.phase)
            },
        });

        let verdict = if checks.iter().all(|c| c.ok) {
            PostCheckVerdict::Improved
        } else {
            PostCheckVerdict::NotImproved
        };

        self.report(incident, execution, verdict, checks, checked_at)
    }

    fn report(
        &self,
        incident: &Incident,
        execution: &Execution,
        verdict: PostCheckVerdict,
        checks: Vec<CheckOutcome>,
        checked_at: DateTime<Utc>,
    ) -> PostCheckReport {
        self.telemetry
            .postchecks_total
            .with_label_values(&[verdict.label()])
            .inc();
        PostCheckReport {
            incident_id: incident.id.clone(),
            execution_id: execution.execution_id.clone(),
            verdict,
            improved: match verdict {
                PostCheckVerdict::Improved => Some(true),
                PostCheckVerdict::NotImproved => Some(false),
                PostCheckVerdict::Inconclusive => None,
            },
            checks,
            checked_at,
        }
    }
}
