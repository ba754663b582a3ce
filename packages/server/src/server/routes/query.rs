use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub job_id: uuid::Uuid,
    pub answer: String,
    pub latency_ms: u64,
    pub selected_replica: usize,
}

pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, crate::common::AppError> {
    let start = std::time::Instant::now();
    let result = state.orchestrator.query(request.query).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let success = result.is_ok();
    state.metrics.record_query(latency_ms, success);

    let result = result?;
    Ok(Json(QueryResponse {
        job_id: result.job_id,
        answer: result.answer,
        latency_ms: result.latency_ms,
        selected_replica: result.selected_replica,
    }))
}
