//! The error taxonomy from SPEC_FULL.md §7, surfaced at the ingress as HTTP
//! responses and everywhere else as plain `Result<_, AppError>`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// A worker dropped a job because it was missing required fields.
    #[error("bad input: {0}")]
    BadInput(String),

    /// The ingress could not enqueue a job (broker unreachable).
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// An external backend call (embed/search/LLM) failed.
    #[error("backend failure: {0}")]
    BackendFailure(String),

    /// The ingress's end-to-end deadline elapsed without a completion record.
    #[error("timeout waiting for completion")]
    Timeout,

    /// The completion record says the generator failed.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// The RL policy could not be consulted; caller should fall back.
    #[error("policy unavailable: {0}")]
    PolicyUnavailable(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            AppError::BadInput(_) => (StatusCode::BAD_REQUEST, "BAD_INPUT"),
            AppError::UpstreamUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE")
            }
            AppError::BackendFailure(_) => (StatusCode::BAD_GATEWAY, "BACKEND_FAILURE"),
            AppError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            AppError::GenerationFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "GENERATION_FAILED")
            }
            AppError::PolicyUnavailable(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "POLICY_UNAVAILABLE")
            }
        };

        let body = ErrorBody {
            error: kind.to_string(),
            message: self.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
