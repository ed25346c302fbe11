//! Fix apply executor.
//!
//! The one component with real side effects. Per incident it tracks
//! `NoPreview -> Previewed -> Confirmed -> Applying -> {Applied, Failed}`
//! and enforces: explicit confirmation (double for high risk), preview
//! freshness by exact fix id, a clean dry-run on file, and a single
//! apply in flight per incident. Every apply gets a fresh execution id;
//! retries are new apply calls with a fresh preview, never automatic.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use remedy_common::{
    ApplyRequest, ChangeSummary, ClusterGateway, CommandTemplate, Execution, ExecutionStatus,
    FixKind, FixPreview, Incident, LogLine, MutationRequest, RemedyError, ResourceRef, Result,
    RiskLevel, Runbook,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// What the executor remembers of the most recent preview per incident.
#[derive(Debug, Clone)]
pub struct PreviewRecord {
    pub fix_id: String,
    pub runbook_id: String,
    pub kind: FixKind,
    pub risk: RiskLevel,
    /// Rendered apply command template, re-rendered against the final
    /// target at apply time.
    pub apply_template: String,
    pub dry_run_error: String,
}

impl PreviewRecord {
    pub fn from_preview(preview: &FixPreview, runbook: &Runbook) -> Self {
        Self {
            fix_id: preview.fix_id.clone(),
            runbook_id: runbook.id.clone(),
            kind: preview.kind,
            risk: preview.risk,
            apply_template: runbook.commands.apply.clone(),
            dry_run_error: preview.dry_run_error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Previewed,
    Applying,
    Applied,
    Failed,
}

struct Flight {
    stage: Stage,
    preview: PreviewRecord,
}

pub struct ApplyExecutor {
    gateway: Arc<dyn ClusterGateway>,
    flights: Mutex<HashMap<String, Flight>>,
    executions: RwLock<HashMap<String, Execution>>,
}

impl ApplyExecutor {
    pub fn new(gateway: Arc<dyn ClusterGateway>) -> Self {
        Self {
            gateway,
            flights: Mutex::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
        }
    }

    /// Register the most recent preview for an incident. Any earlier
    /// preview becomes stale by construction: only the latest is kept.
    pub async fn record_preview(&self, incident_id: &str, record: PreviewRecord) {
        let mut flights = self.flights.lock().await;
        match flights.get_mut(incident_id) {
            // An apply already in flight keeps its stage; the new
            // preview only becomes relevant for the next apply.
            Some(flight) if flight.stage == Stage::Applying => {
                flight.preview = record;
            }
            _ => {
                flights.insert(
                    incident_id.to_string(),
                    Flight {
                        stage: Stage::Previewed,
                        preview: record,
                    },
                );
            }
        }
    }

    /// The fix id of the most recent preview, if any.
    pub async fn latest_preview_fix_id(&self, incident_id: &str) -> Option<String> {
        self.flights
            .lock()
            .await
            .get(incident_id)
            .map(|flight| flight.preview.fix_id.clone())
    }

    /// Perform the confirmed mutation exactly once.
    pub async fn apply(&self, incident: &Incident, request: &ApplyRequest) -> Result<Execution> {
        // Guard phase under the flight lock: all Previewed -> Confirmed ->
        // Applying checks happen atomically per incident.
        let preview = {
            let mut flights = self.flights.lock().await;
            let flight = flights
                .get_mut(&incident.id)
                .ok_or_else(|| RemedyError::InvalidRequest(
                    "no preview has been generated for this incident".to_string(),
                ))?;

            if flight.stage == Stage::Applying {
                return Err(RemedyError::ApplyInProgress(incident.id.clone()));
            }

            if !request.confirmed {
                return Err(RemedyError::ConfirmationRequired);
            }
            // High-risk mutations need two independent affirmations; a
            // single confirmed flag is not enough.
            if flight.preview.risk >= RiskLevel::High && !request.ack_elevated_risk {
                return Err(RemedyError::ElevatedRiskAckRequired);
            }

            if flight.preview.fix_id != request.fix_id {
                return Err(RemedyError::StalePreview {
                    requested: request.fix_id.clone(),
                    latest: flight.preview.fix_id.clone(),
                });
            }

            if !flight.preview.dry_run_error.is_empty() {
                return Err(RemedyError::ApplyBlocked {
                    reason: flight.preview.dry_run_error.clone(),
                });
            }

            flight.stage = Stage::Applying;
            flight.preview.clone()
        };

        let target = request
            .resource_info
            .clone()
            .unwrap_or_else(|| incident.resource.clone());

        let execution = self.run_mutation(incident, &preview, &target).await;

        {
            let mut flights = self.flights.lock().await;
            if let Some(flight) = flights.get_mut(&incident.id) {
                flight.stage = match execution.status {
                    ExecutionStatus::Applied => Stage::Applied,
                    ExecutionStatus::Failed => Stage::Failed,
                };
            }
        }

        self.executions
            .write()
            .await
            .insert(execution.execution_id.clone(), execution.clone());

        Ok(execution)
    }

    async fn run_mutation(
        &self,
        incident: &Incident,
        preview: &PreviewRecord,
        target: &ResourceRef,
    ) -> Execution {
        let started_at = Utc::now();
        let command = CommandTemplate::render(&preview.apply_template, target);
        let mutation = MutationRequest {
            fix_id: preview.fix_id.clone(),
            kind: preview.kind,
            target: target.clone(),
            command: command.clone(),
        };

        let mut log = vec![LogLine::stdout(format!(
            "applying {} ({}) to {}",
            preview.fix_id, preview.kind, target
        ))];

        info!("[APPLY] {} -> {}", preview.fix_id, target);

        match self.gateway.apply(&mutation).await {
            Ok(report) => {
                log.extend(report.stdout.iter().cloned().map(LogLine::stdout));
                log.extend(report.stderr.iter().cloned().map(LogLine::stderr));
                log.push(LogLine::stdout("apply completed"));
                info!("[APPLY] {} applied ({} changes)", preview.fix_id, report.changes.total());
                Execution {
                    execution_id: Execution::new_id(),
                    incident_id: incident.id.clone(),
                    fix_id: preview.fix_id.clone(),
                    kind: preview.kind,
                    status: ExecutionStatus::Applied,
                    message: report.message,
                    changes: report.changes,
                    log,
                    started_at,
                    finished_at: Utc::now(),
                }
            }
            Err(e) => {
                // The incident itself is left untouched so the operator
                // can retry with a fresh preview.
                error!("[APPLY] {} failed: {}", preview.fix_id, e);
                log.push(LogLine::stderr(e.to_string()));
                Execution {
                    execution_id: Execution::new_id(),
                    incident_id: incident.id.clone(),
                    fix_id: preview.fix_id.clone(),
                    kind: preview.kind,
                    status: ExecutionStatus::Failed,
                    message: e.to_string(),
                    changes: ChangeSummary::default(),
                    log,
                    started_at,
                    finished_at: Utc::now(),
                }
            }
        }
    }

    pub async fn get_execution(&self, execution_id: &str) -> Option<Execution> {
        self.executions.read().await.get(execution_id).cloned()
    }

    pub async fn executions_for_incident(&self, incident_id: &str) -> Vec<Execution> {
        let mut list: Vec<Execution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.incident_id == incident_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        list
    }

    /// Drop flight state for a resolved incident so later previews start
    /// from a clean slate.
    pub async fn clear_incident(&self, incident_id: &str) {
        let mut flights = self.flights.lock().await;
        if flights.remove(incident_id).is_some() {
            warn!("[APPLY] cleared flight state for {}", incident_id);
        }
    }
}
