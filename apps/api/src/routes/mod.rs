pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::analysis::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Analysis API
        .route(
            "/api/v1/analyze",
            get(handlers::handle_get_analysis).post(handlers::handle_analyze),
        )
        .route("/api/v1/analyze/cancel", post(handlers::handle_cancel))
        .route("/api/v1/analyze/reset", post(handlers::handle_reset))
        .route("/api/v1/analyze/quota", get(handlers::handle_quota))
        .with_state(state)
}
