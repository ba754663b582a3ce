use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};

use crate::server::app::AppState;

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let body = state.metrics.render(&state.load, state.config.replica_count).await;
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
}
