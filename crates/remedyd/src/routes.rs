//! API routes for remedyd.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use remedy_common::{
    fix_id, ApplyRequest, ChangeEvent, Execution, ExecutionStatus, EvidencePack, FeedbackEntry,
    FeedbackRequest, FeedbackResponse, FixPreview, Incident, RemedyError, RemediationPlan,
    Runbook, VERSION,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::apply::PreviewRecord;
use crate::postcheck::PostCheckReport;
use crate::server::AppState;
use crate::similar::{find_similar, SimilarIncident};

type AppStateArc = Arc<AppState>;

/// Ranked similar incidents returned per request.
const SIMILAR_LIMIT: usize = 5;

fn reject(e: RemedyError) -> (StatusCode, String) {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, e.to_string())
}

async fn load_incident(state: &AppState, id: &str) -> Result<Incident, (StatusCode, String)> {
    state
        .store
        .get(id)
        .await
        .ok_or_else(|| reject(RemedyError::IncidentNotFound(id.to_string())))
}

// ============================================================================
// Health & Metrics
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub incidents: usize,
    pub runbooks: usize,
}

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: VERSION.to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        incidents: state.store.list().await.len(),
        runbooks: state.registry.all().await.len(),
    })
}

pub fn metrics_routes() -> Router<AppStateArc> {
    Router::new().route("/metrics", get(metrics))
}

async fn metrics(State(state): State<AppStateArc>) -> String {
    state.telemetry.render()
}

// ============================================================================
// Incident Routes
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LookbackQuery {
    pub lookback: Option<u32>,
}

pub fn incident_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/incidents", get(list_incidents))
        .route("/v1/incidents/:id", put(register_incident).get(get_incident))
        .route("/v1/incidents/:id/evidence", get(get_evidence))
        .route("/v1/incidents/:id/changes", get(get_changes))
        .route("/v1/incidents/:id/runbooks", get(get_runbooks))
        .route("/v1/incidents/:id/fixes", get(get_fixes))
        .route("/v1/incidents/:id/similar", get(get_similar))
}

async fn list_incidents(State(state): State<AppStateArc>) -> Json<Vec<Incident>> {
    Json(state.store.list().await)
}

/// Boundary endpoint for the external detector: register or refresh an
/// incident. The detector owns creation; this daemon owns everything
/// after.
async fn register_incident(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    Json(incident): Json<Incident>,
) -> Result<StatusCode, (StatusCode, String)> {
    if incident.id != id {
        return Err(reject(RemedyError::InvalidRequest(format!(
            "body id '{}' does not match path id '{}'",
            incident.id, id
        ))));
    }
    state.store.upsert(incident).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_incident(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Json<Incident>, (StatusCode, String)> {
    Ok(Json(load_incident(&state, &id).await?))
}

async fn get_evidence(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    Query(query): Query<LookbackQuery>,
) -> Result<Json<EvidencePack>, (StatusCode, String)> {
    let incident = load_incident(&state, &id).await?;
    let pack = state.aggregator.gather(&incident, query.lookback).await;
    Ok(Json(pack))
}

async fn get_changes(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    Query(query): Query<LookbackQuery>,
) -> Result<Json<Vec<ChangeEvent>>, (StatusCode, String)> {
    let incident = load_incident(&state, &id).await?;
    let changes = state.aggregator.change_events(&incident, query.lookback).await;
    Ok(Json(changes))
}

async fn get_runbooks(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Runbook>>, (StatusCode, String)> {
    let incident = load_incident(&state, &id).await?;
    Ok(Json(state.registry.match_for(incident.pattern).await))
}

/// The full remediation plan: ranked fixes plus the read-only
/// investigation action. An empty fix list is a valid answer.
async fn get_fixes(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Json<RemediationPlan>, (StatusCode, String)> {
    let incident = load_incident(&state, &id).await?;
    let runbooks = state.registry.match_for(incident.pattern).await;
    let pack = state.aggregator.gather(&incident, None).await;
    let archived = state.store.archived().await;
    let similar = find_similar(&incident, &archived, SIMILAR_LIMIT);

    let plan = state.planner.plan(&incident, &runbooks, &pack, &similar);
    info!(
        "[PLAN] {}: {} fixes, recommended {:?}",
        id,
        plan.fix_plans.len(),
        plan.recommended_fix_id
    );
    Ok(Json(plan))
}

async fn get_similar(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SimilarIncident>>, (StatusCode, String)> {
    let incident = load_incident(&state, &id).await?;
    let archived = state.store.archived().await;
    Ok(Json(find_similar(&incident, &archived, SIMILAR_LIMIT)))
}

// ============================================================================
// Remediation Routes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(default)]
    pub fix_id: Option<String>,
    #[serde(default)]
    pub runbook_id: Option<String>,
}

/// Wire shape of a finished apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub message: String,
    pub changes: remedy_common::ChangeSummary,
    pub log: Vec<remedy_common::LogLine>,
}

impl From<&Execution> for ApplyResponse {
    fn from(execution: &Execution) -> Self {
        Self {
            execution_id: execution.execution_id.clone(),
            status: execution.status,
            message: execution.message.clone(),
            changes: execution.changes,
            log: execution.log.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCheckRequest {
    pub execution_id: String,
}

pub fn remediation_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/incidents/:id/fix-preview", post(fix_preview))
        .route("/v1/incidents/:id/fix-apply", post(fix_apply))
        .route("/v1/incidents/:id/post-check", post(post_check))
}

/// Resolve the runbook a preview/apply request refers to. Fix ids use
/// one canonical format end-to-end; nothing here does substring or
/// fallback matching.
async fn resolve_runbook(
    state: &AppState,
    incident: &Incident,
    request: &PreviewRequest,
) -> Result<Runbook, (StatusCode, String)> {
    let runbook_id = match (&request.fix_id, &request.runbook_id) {
        (Some(fix), _) => {
            let prefix = fix_id(&incident.id, "");
            fix.strip_prefix(&prefix)
                .ok_or_else(|| reject(RemedyError::FixNotFound(fix.clone())))?
                .to_string()
        }
        (None, Some(runbook_id)) => runbook_id.clone(),
        (None, None) => {
            return Err(reject(RemedyError::InvalidRequest(
                "either fixId or runbookId is required".to_string(),
            )))
        }
    };

    let runbook = state
        .registry
        .get(&runbook_id)
        .await
        .ok_or_else(|| reject(RemedyError::FixNotFound(runbook_id.clone())))?;

    // A fix must come from the incident's own plan; a runbook for a
    // different pattern is not a valid target.
    if runbook.pattern != incident.pattern {
        return Err(reject(RemedyError::FixNotFound(runbook_id)));
    }
    Ok(runbook)
}

/// Regenerate the preview for one fix. Each call re-resolves against
/// live cluster state; the apply executor enforces freshness.
async fn fix_preview(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<FixPreview>, (StatusCode, String)> {
    let incident = load_incident(&state, &id).await?;
    let runbook = resolve_runbook(&state, &incident, &request).await?;

    let pack = state.aggregator.gather(&incident, None).await;
    let archived = state.store.archived().await;
    let similar = find_similar(&incident, &archived, SIMILAR_LIMIT);
    let plan = state
        .planner
        .plan(&incident, std::slice::from_ref(&runbook), &pack, &similar);
    let fix_plan = plan
        .fix_plans
        .first()
        .ok_or_else(|| reject(RemedyError::FixNotFound(runbook.id.clone())))?;

    let preview = state
        .previews
        .preview(&incident, fix_plan, &runbook)
        .await
        .map_err(|e| {
            error!("[PREVIEW] {} failed: {}", fix_plan.id, e);
            reject(e)
        })?;

    state
        .executor
        .record_preview(&incident.id, PreviewRecord::from_preview(&preview, &runbook))
        .await;
    state.telemetry.previews_total.inc();

    Ok(Json(preview))
}

/// Apply a previously previewed and confirmed fix, exactly once.
async fn fix_apply(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    Json(request): Json<ApplyRequest>,
) -> Result<(StatusCode, Json<ApplyResponse>), (StatusCode, String)> {
    let incident = load_incident(&state, &id).await?;

    let execution = state
        .executor
        .apply(&incident, &request)
        .await
        .map_err(reject)?;

    let status_label = match execution.status {
        ExecutionStatus::Applied => "applied",
        ExecutionStatus::Failed => "failed",
    };
    state
        .telemetry
        .applies_total
        .with_label_values(&[status_label])
        .inc();

    let http_status = match execution.status {
        ExecutionStatus::Applied => {
            // Fire-and-forget: the response does not wait on the check.
            state
                .postcheck
                .schedule(incident.clone(), execution.clone());
            StatusCode::OK
        }
        ExecutionStatus::Failed => StatusCode::BAD_GATEWAY,
    };

    Ok((http_status, Json(ApplyResponse::from(&execution))))
}

/// Manual post-check, callable before the scheduled one fires.
async fn post_check(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    Json(request): Json<PostCheckRequest>,
) -> Result<Json<PostCheckReport>, (StatusCode, String)> {
    let incident = load_incident(&state, &id).await?;
    let execution = state
        .executor
        .get_execution(&request.execution_id)
        .await
        .ok_or_else(|| reject(RemedyError::ExecutionNotFound(request.execution_id.clone())))?;

    if execution.incident_id != incident.id {
        return Err(reject(RemedyError::InvalidRequest(format!(
            "execution {} does not belong to incident {}",
            execution.execution_id, incident.id
        ))));
    }

    Ok(Json(state.postcheck.check(&incident, &execution).await))
}

// ============================================================================
// Feedback Routes
// ============================================================================

pub fn feedback_routes() -> Router<AppStateArc> {
    Router::new().route(
        "/v1/incidents/:id/feedback",
        post(submit_feedback).get(feedback_history),
    )
}

async fn submit_feedback(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, (StatusCode, String)> {
    let response = state
        .feedback
        .record(&id, request)
        .await
        .map_err(reject)?;

    // A resolved incident ends any pending remediation flight.
    if !state.store.is_active(&id).await {
        state.executor.clear_incident(&id).await;
    }

    Ok(Json(response))
}

async fn feedback_history(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FeedbackEntry>>, (StatusCode, String)> {
    load_incident(&state, &id).await?;
    Ok(Json(state.feedback.history(&id).await))
}
