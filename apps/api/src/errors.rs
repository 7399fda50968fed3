use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::analysis::coordinator::{AnalysisError, CancelReason};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let AppError::Analysis(error) = self;

        let (status, code) = match &error {
            AnalysisError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            AnalysisError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AnalysisError::NotConfigured => (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONFIGURED"),
            AnalysisError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT"),
            AnalysisError::UpstreamHttp { status, .. } => {
                tracing::error!("Analysis service returned status {status}");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_HTTP_ERROR")
            }
            AnalysisError::InvalidUpstreamShape(e) => {
                tracing::error!("Analysis service payload rejected: {e}");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_INVALID_RESPONSE")
            }
            AnalysisError::Network(msg) => {
                tracing::error!("Analysis service unreachable: {msg}");
                (StatusCode::BAD_GATEWAY, "NETWORK_ERROR")
            }
            AnalysisError::Cancelled {
                reason: CancelReason::Superseded,
            } => (StatusCode::CONFLICT, "SUPERSEDED"),
            AnalysisError::Cancelled {
                reason: CancelReason::Caller,
            } => (StatusCode::CONFLICT, "CANCELLED"),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": error.to_string()
            }
        }));

        let mut response = (status, body).into_response();
        if let AnalysisError::RateLimited {
            seconds_until_reset,
        } = error
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds_until_reset));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::envelope::ShapeError;

    fn status_of(error: AnalysisError) -> StatusCode {
        AppError::from(error).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(AnalysisError::NotConfigured),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(AnalysisError::Timeout { after_ms: 30_000 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(AnalysisError::InvalidUpstreamShape(ShapeError::MissingOutput)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(AnalysisError::Network("reset".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(AnalysisError::Cancelled {
                reason: CancelReason::Caller
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AppError::from(AnalysisError::RateLimited {
            seconds_until_reset: 17,
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "17");
    }
}
