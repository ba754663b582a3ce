//! Application state and router assembly for the ingress binary.

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::kernel::LoadAccount;
use crate::orchestrator::Orchestrator;
use crate::server::metrics::Metrics;
use crate::server::routes::{health_handler, metrics_handler, query_handler};

/// Shared state reachable from every route handler.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub metrics: Metrics,
    pub load: Arc<dyn LoadAccount>,
    pub config: Arc<Config>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST]);

    Router::new()
        .route("/query", post(query_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
