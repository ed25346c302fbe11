//! Feedback recorder.
//!
//! Append-only: entries are stored in memory and mirrored to a JSONL
//! journal when one is configured. When feedback references a fix, the
//! runbook's rolling success rate is updated here and nowhere else - the
//! planner only ever reads those statistics.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use remedy_common::{
    fix_id, FeedbackConfig, FeedbackEntry, FeedbackRequest, FeedbackResponse, FeedbackSummary,
    FeedbackType, RemedyError, Result,
};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::matcher::RunbookRegistry;
use crate::store::IncidentStore;
use crate::telemetry::Telemetry;

pub struct FeedbackRecorder {
    registry: Arc<RunbookRegistry>,
    store: Arc<IncidentStore>,
    config: FeedbackConfig,
    telemetry: Arc<Telemetry>,
    entries: RwLock<Vec<FeedbackEntry>>,
}

impl FeedbackRecorder {
    pub fn new(
        registry: Arc<RunbookRegistry>,
        store: Arc<IncidentStore>,
        config: FeedbackConfig,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            registry,
            store,
            config,
            telemetry,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Record one feedback entry. The type has already been validated by
    /// deserialization; anything outside the vocabulary never gets here.
    pub async fn record(
        &self,
        incident_id: &str,
        request: FeedbackRequest,
    ) -> Result<FeedbackResponse> {
        let incident = self
            .store
            .get(incident_id)
            .await
            .ok_or_else(|| RemedyError::IncidentNotFound(incident_id.to_string()))?;

        let entry = FeedbackEntry {
            id: Uuid::new_v4().to_string(),
            incident_id: incident_id.to_string(),
            feedback_type: request.feedback_type,
            content: request.content.clone(),
            fix_id: request.fix_id.clone(),
            created_at: Utc::now(),
        };

        self.append(entry).await;
        self.telemetry.feedback_total.inc();

        // Status side effects.
        match request.feedback_type {
            FeedbackType::Resolved => {
                let resolution = request
                    .content
                    .clone()
                    .unwrap_or_else(|| "marked resolved by operator".to_string());
                self.store
                    .resolve(incident_id, &resolution, request.fix_id.clone())
                    .await;
            }
            FeedbackType::Dismiss => {
                self.store
                    .resolve(incident_id, "dismissed by operator", None)
                    .await;
            }
            _ => {}
        }

        // Statistics side effects: only outcome-bearing feedback with a
        // fix reference moves a runbook's rate.
        let summary = match (request.feedback_type.outcome(), &request.fix_id) {
            (Some(success), Some(fix)) => self.update_runbook(&incident.id, fix, success).await,
            _ => None,
        };

        info!(
            "[FEEDBACK] {} on {}: {:?}",
            entry_type_name(request.feedback_type),
            incident_id,
            request.fix_id
        );

        Ok(FeedbackResponse {
            message: response_message(request.feedback_type),
            summary,
        })
    }

    pub async fn history(&self, incident_id: &str) -> Vec<FeedbackEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|entry| entry.incident_id == incident_id)
            .cloned()
            .collect()
    }

    async fn append(&self, entry: FeedbackEntry) {
        if let Some(path) = &self.config.journal_path {
            if let Err(e) = append_journal_line(path, &entry) {
                warn!("[FEEDBACK] journal write failed: {}", e);
            }
        }
        self.entries.write().await.push(entry);
    }

    /// Resolve the canonical fix id back to its runbook and fold the
    /// outcome into the runbook's statistics.
    async fn update_runbook(
        &self,
        incident_id: &str,
        fix: &str,
        success: bool,
    ) -> Option<FeedbackSummary> {
        let prefix = fix_id(incident_id, "");
        let runbook_id = fix.strip_prefix(&prefix)?;

        let (success_rate, execution_count) = self
            .registry
            .record_outcome(runbook_id, success, self.config.ewma_alpha)
            .await?;

        Some(FeedbackSummary {
            runbook_id: runbook_id.to_string(),
            success_rate,
            execution_count,
        })
    }
}

fn append_journal_line(path: &std::path::Path, entry: &FeedbackEntry) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(entry)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(file, "{}", line)
}

fn entry_type_name(feedback_type: FeedbackType) -> &'static str {
    match feedback_type {
        FeedbackType::Resolved => "resolved",
        FeedbackType::RootCauseConfirmed => "root_cause_confirmed",
        FeedbackType::FixWorked => "fix_worked",
        FeedbackType::FixFailed => "fix_failed",
        FeedbackType::Dismiss => "dismiss",
        FeedbackType::Escalate => "escalate",
        FeedbackType::Note => "note",
        FeedbackType::Worked => "worked",
        FeedbackType::NotWorked => "not_worked",
        FeedbackType::Unknown => "unknown",
    }
}

fn response_message(feedback_type: FeedbackType) -> String {
    match feedback_type {
        FeedbackType::Resolved => "Incident marked as resolved",
        FeedbackType::RootCauseConfirmed => "Root cause analysis confirmed",
        FeedbackType::FixWorked | FeedbackType::Worked => "Fix success recorded",
        FeedbackType::FixFailed | FeedbackType::NotWorked => "Fix failure recorded",
        FeedbackType::Dismiss => "Incident dismissed",
        FeedbackType::Escalate => "Incident escalated",
        FeedbackType::Note | FeedbackType::Unknown => "Note added to incident",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_common::{
        AutonomyLevel, CommandTemplate, FailurePattern, FixKind, Incident, IncidentStatus,
        ResourceRef, RiskLevel, Runbook, Severity,
    };

    fn incident() -> Incident {
        Incident {
            id: "inc-1".to_string(),
            pattern: FailurePattern::Crashloop,
            severity: Severity::High,
            status: IncidentStatus::Open,
            resource: ResourceRef::new("prod", "Pod", "api-1"),
            title: "crashloop".to_string(),
            confidence: 0.8,
            diagnosis: None,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            resolved_at: None,
            resolution: None,
        }
    }

    fn runbook(id: &str, rate: f64) -> Runbook {
        Runbook {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            pattern: FailurePattern::Crashloop,
            kind: FixKind::Restart,
            risk: RiskLevel::Low,
            autonomy_level: AutonomyLevel::Propose,
            commands: CommandTemplate {
                dry_run: "kubectl get pod {name} -n {namespace}".to_string(),
                apply: "kubectl delete pod {name} -n {namespace}".to_string(),
                rollback: None,
            },
            success_rate: rate,
            execution_count: 0,
            enabled: true,
            cited_evidence: vec![],
        }
    }

    async fn recorder(journal: Option<std::path::PathBuf>) -> (FeedbackRecorder, Arc<RunbookRegistry>) {
        let registry = Arc::new(RunbookRegistry::new());
        registry.register(runbook("rb-1", 0.5)).await;
        let store = Arc::new(IncidentStore::new());
        store.upsert(incident()).await;
        let recorder = FeedbackRecorder::new(
            registry.clone(),
            store,
            FeedbackConfig {
                journal_path: journal,
                ewma_alpha: 0.2,
            },
            Arc::new(Telemetry::new()),
        );
        (recorder, registry)
    }

    fn request(feedback_type: FeedbackType, fix: Option<&str>) -> FeedbackRequest {
        FeedbackRequest {
            feedback_type,
            content: None,
            fix_id: fix.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_unknown_incident_rejected() {
        let (recorder, _) = recorder(None).await;
        let err = recorder
            .record("inc-missing", request(FeedbackType::Note, None))
            .await
            .unwrap_err();
        assert!(matches!(err, RemedyError::IncidentNotFound(_)));
    }

    #[tokio::test]
    async fn test_fix_worked_beats_fix_failed() {
        // Two identical recorders; one stream of successes, one of
        // failures. The success stream must end strictly higher.
        let (worked, worked_registry) = recorder(None).await;
        let (failed, failed_registry) = recorder(None).await;

        for _ in 0..5 {
            worked
                .record("inc-1", request(FeedbackType::FixWorked, Some("fix-inc-1-rb-1")))
                .await
                .unwrap();
            failed
                .record("inc-1", request(FeedbackType::FixFailed, Some("fix-inc-1-rb-1")))
                .await
                .unwrap();
        }

        let up = worked_registry.get("rb-1").await.unwrap();
        let down = failed_registry.get("rb-1").await.unwrap();
        assert!(up.success_rate > down.success_rate);
        assert!(up.success_rate > 0.5);
        assert!(down.success_rate < 0.5);
        assert_eq!(up.execution_count, 5);
    }

    #[tokio::test]
    async fn test_neutral_feedback_leaves_stats_alone() {
        let (recorder, registry) = recorder(None).await;
        let response = recorder
            .record("inc-1", request(FeedbackType::Note, Some("fix-inc-1-rb-1")))
            .await
            .unwrap();
        assert!(response.summary.is_none());
        let rb = registry.get("rb-1").await.unwrap();
        assert_eq!(rb.execution_count, 0);
    }

    #[tokio::test]
    async fn test_resolved_closes_incident() {
        let (recorder, _) = recorder(None).await;
        recorder
            .record("inc-1", request(FeedbackType::Resolved, Some("fix-inc-1-rb-1")))
            .await
            .unwrap();
        assert_eq!(recorder.history("inc-1").await.len(), 1);
        assert!(!recorder.store.is_active("inc-1").await);
    }

    #[tokio::test]
    async fn test_journal_is_append_only_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.jsonl");
        let (recorder, _) = recorder(Some(path.clone())).await;

        recorder
            .record("inc-1", request(FeedbackType::Note, None))
            .await
            .unwrap();
        recorder
            .record("inc-1", request(FeedbackType::Escalate, None))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let entry: FeedbackEntry = serde_json::from_str(line).unwrap();
            assert_eq!(entry.incident_id, "inc-1");
        }
    }
}
