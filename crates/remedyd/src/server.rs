//! HTTP server for remedyd.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::Router;
use remedy_common::{ClusterGateway, RemedyConfig};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::apply::ApplyExecutor;
use crate::cluster;
use crate::evidence::EvidenceAggregator;
use crate::feedback::FeedbackRecorder;
use crate::matcher::RunbookRegistry;
use crate::planner::FixPlanner;
use crate::postcheck::PostCheckVerifier;
use crate::preview::PreviewEngine;
use crate::routes;
use crate::store::IncidentStore;
use crate::telemetry::Telemetry;

/// Application state shared across handlers. Every collaborator is an
/// explicit field; nothing workflow-related lives in process globals.
pub struct AppState {
    pub config: RemedyConfig,
    pub store: Arc<IncidentStore>,
    pub registry: Arc<RunbookRegistry>,
    pub aggregator: EvidenceAggregator,
    pub planner: FixPlanner,
    pub previews: PreviewEngine,
    pub executor: ApplyExecutor,
    pub postcheck: Arc<PostCheckVerifier>,
    pub feedback: FeedbackRecorder,
    pub telemetry: Arc<Telemetry>,
    pub start_time: Instant,
}

impl AppState {
    /// Build the state with the gateway selected by configuration.
    pub fn from_config(config: RemedyConfig) -> Result<Self> {
        let gateway = cluster::from_config(&config.cluster);
        Ok(Self::with_gateway(config, gateway))
    }

    /// Build the state around an explicit gateway; the test suites pass
    /// an in-memory cluster here.
    pub fn with_gateway(config: RemedyConfig, gateway: Arc<dyn ClusterGateway>) -> Self {
        let telemetry = Arc::new(Telemetry::new());
        let store = Arc::new(IncidentStore::new());
        let registry = Arc::new(RunbookRegistry::with_builtin_runbooks());

        let aggregator = EvidenceAggregator::new(
            gateway.clone(),
            config.evidence.clone(),
            config.confidence.clone(),
        );
        let planner = FixPlanner::new(config.confidence.clone(), config.risk_downgrades.clone());
        let previews = PreviewEngine::new(gateway.clone(), config.preview.clone());
        let executor = ApplyExecutor::new(gateway.clone());
        let postcheck = Arc::new(PostCheckVerifier::new(
            gateway.clone(),
            store.clone(),
            config.postcheck.clone(),
            telemetry.clone(),
        ));
        let feedback = FeedbackRecorder::new(
            registry.clone(),
            store.clone(),
            config.feedback.clone(),
            telemetry.clone(),
        );

        Self {
            config,
            store,
            registry,
            aggregator,
            planner,
            previews,
            executor,
            postcheck,
            feedback,
            telemetry,
            start_time: Instant::now(),
        }
    }
}

/// Run the HTTP server until shutdown.
pub async fn run(state: AppState) -> Result<()> {
    let addr = state.config.server.listen_addr.clone();
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("  Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// The full application router; shared with the integration tests.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::incident_routes())
        .merge(routes::remediation_routes())
        .merge(routes::feedback_routes())
        .merge(routes::metrics_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
