//! HTTP surface: `POST /query`, `GET /metrics`, `GET /health`.

pub mod app;
pub mod metrics;
pub mod routes;

pub use app::{build_router, AppState};
