use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::{handlers, middleware::track_http_metrics};
use crate::observability::HealthChecker;
use crate::services::{FinalizationService, Pipeline, ReconciliationAuditor};

/// Handles to the pipeline plus optional operational hooks.
#[derive(Clone)]
pub struct AppState {
    pub finalization: Arc<FinalizationService>,
    pub auditor: Arc<ReconciliationAuditor>,
    pub metrics_handle: Option<PrometheusHandle>,
    pub health_checker: Option<Arc<HealthChecker>>,
}

impl AppState {
    pub fn new(pipeline: &Pipeline) -> Self {
        Self {
            finalization: pipeline.finalization.clone(),
            auditor: pipeline.auditor.clone(),
            metrics_handle: None,
            health_checker: None,
        }
    }

    /// Enables `/metrics`; without it the endpoint answers 404.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn with_health_checker(mut self, checker: Arc<HealthChecker>) -> Self {
        self.health_checker = Some(checker);
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Operational
        .route("/health", get(handlers::health_check))
        .route("/health/detailed", get(handlers::detailed_health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Checkout and finalization
        .route("/checkout/orders", post(handlers::create_pending_order))
        .route("/payments/verify/:reference", get(handlers::verify_payment))
        .route("/webhooks/:provider", post(handlers::receive_webhook))
        // Reconciliation and review
        .route("/admin/reconciliation/broken", get(handlers::list_broken_orders))
        .route("/admin/reconciliation/run", post(handlers::run_reconciliation))
        .route(
            "/admin/reconciliation/orders/:id/repair",
            post(handlers::repair_order),
        )
        .route("/admin/reviews", get(handlers::list_reviews))
        .layer(middleware::from_fn(track_http_metrics))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
