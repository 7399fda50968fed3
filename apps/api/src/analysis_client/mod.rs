/// Analysis client — the single point of entry for calls to the external
/// analysis webhook.
///
/// No other module talks to the webhook directly. The client does not retry
/// and does not enforce the overall deadline; the coordinator races it
/// against its own timeout and cancellation signal.
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::models::analysis::AnalysisRequest;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport-level failure: DNS, connect, TLS, reset, or an unreadable body.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError {
            message: e.to_string(),
        }
    }
}

/// Status and full body text of an upstream reply, before any interpretation.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: String,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The transport seam. `AnalysisClient` is the production implementation;
/// tests plug in scripted fakes.
#[async_trait]
pub trait AnalysisTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        request: &AnalysisRequest,
    ) -> Result<UpstreamResponse, TransportError>;
}

#[derive(Clone)]
pub struct AnalysisClient {
    client: Client,
}

impl AnalysisClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl AnalysisTransport for AnalysisClient {
    async fn post(
        &self,
        url: &str,
        request: &AnalysisRequest,
    ) -> Result<UpstreamResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!("Analysis webhook replied: status={status}, body_bytes={}", body.len());

        Ok(UpstreamResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> UpstreamResponse {
        UpstreamResponse {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_2xx_is_success() {
        assert!(response(200).is_success());
        assert!(response(204).is_success());
        assert!(response(299).is_success());
    }

    #[test]
    fn test_non_2xx_is_not_success() {
        assert!(!response(199).is_success());
        assert!(!response(301).is_success());
        assert!(!response(404).is_success());
        assert!(!response(500).is_success());
    }

    #[test]
    fn test_client_builds() {
        assert!(AnalysisClient::new().is_ok());
    }
}
