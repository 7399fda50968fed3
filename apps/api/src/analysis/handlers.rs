//! Axum route handlers for the Analysis API.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::analysis::coordinator::AnalysisSnapshot;
use crate::errors::AppError;
use crate::models::analysis::{AnalysisRequest, AnalysisResult, MatchTier};
use crate::rate_limit::QuotaStatus;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub result: AnalysisResult,
    pub match_tier: MatchTier,
}

/// POST /api/v1/analyze
///
/// Runs one analysis and waits for it. A newer POST supersedes this one, in
/// which case this request gets 409.
pub async fn handle_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let result = state.coordinator.analyze(request).await?;
    let match_tier = MatchTier::from_score(result.match_score);

    Ok(Json(AnalyzeResponse { result, match_tier }))
}

/// GET /api/v1/analyze
pub async fn handle_get_analysis(State(state): State<AppState>) -> Json<AnalysisSnapshot> {
    Json(state.coordinator.snapshot())
}

/// POST /api/v1/analyze/cancel
pub async fn handle_cancel(State(state): State<AppState>) -> Json<AnalysisSnapshot> {
    state.coordinator.cancel();
    Json(state.coordinator.snapshot())
}

/// POST /api/v1/analyze/reset
pub async fn handle_reset(State(state): State<AppState>) -> Json<AnalysisSnapshot> {
    state.coordinator.reset();
    Json(state.coordinator.snapshot())
}

/// GET /api/v1/analyze/quota
pub async fn handle_quota(State(state): State<AppState>) -> Json<QuotaStatus> {
    Json(state.limiter.quota().await)
}
