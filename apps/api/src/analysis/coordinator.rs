//! Single-flight request coordinator.
//!
//! One `Coordinator` owns at most one in-flight analysis. A new `analyze` call
//! supersedes the outstanding one instead of queueing behind it, and an outcome
//! only reaches the observable state while its handle is still current
//! (latest request wins).
//!
//! Pipeline per call: configuration check → rate-limit gate → supersede →
//! record attempt → sanitize + validate → POST raced against the timeout and
//! the handle's cancel signal → envelope validation → settle.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::analysis::envelope::{validate_envelope, ShapeError};
use crate::analysis::sanitize::{check_length, sanitize, validate_content};
use crate::analysis_client::AnalysisTransport;
use crate::models::analysis::{AnalysisRequest, AnalysisResult};
use crate::rate_limit::RateLimiter;

/// Upstream body text retained on a non-2xx reply.
const BODY_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// `cancel()` or `reset()` was called.
    Caller,
    /// A newer `analyze()` replaced this one.
    Superseded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Caller => write!(f, "cancelled by caller"),
            CancelReason::Superseded => write!(f, "superseded by a newer request"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InputField {
    ResumeText,
    JobDescription,
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputField::ResumeText => write!(f, "resume"),
            InputField::JobDescription => write!(f, "job description"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("Too many requests. Please wait {seconds_until_reset} seconds before trying again.")]
    RateLimited { seconds_until_reset: u64 },

    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: InputField, reason: String },

    #[error("Invalid response from analysis service: {0}")]
    InvalidUpstreamShape(#[from] ShapeError),

    #[error("Analysis service call failed with status {status}{}", snippet_suffix(.body_snippet))]
    UpstreamHttp { status: u16, body_snippet: String },

    #[error("Analysis timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Analysis request {reason}")]
    Cancelled { reason: CancelReason },

    #[error("Analysis service URL is not configured (ANALYZE_URL)")]
    NotConfigured,

    #[error("Network error while contacting analysis service: {0}")]
    Network(String),
}

impl AnalysisError {
    /// Stable machine-readable label.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::RateLimited { .. } => "rate_limited",
            AnalysisError::InvalidInput { .. } => "invalid_input",
            AnalysisError::InvalidUpstreamShape(_) => "invalid_upstream_shape",
            AnalysisError::UpstreamHttp { .. } => "upstream_http_error",
            AnalysisError::Timeout { .. } => "timeout",
            AnalysisError::Cancelled { .. } => "cancelled",
            AnalysisError::NotConfigured => "not_configured",
            AnalysisError::Network(_) => "network_error",
        }
    }
}

fn snippet_suffix(snippet: &str) -> String {
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

/// Why the network race ended early.
enum Abort {
    Timeout,
    Cancel(CancelReason),
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// `None` makes every call fail with `NotConfigured`.
    pub endpoint: Option<String>,
    pub timeout: Duration,
    pub max_input_chars: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        CoordinatorSettings {
            endpoint: None,
            timeout: Duration::from_millis(30_000),
            max_input_chars: 20_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Requesting,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
}

/// What a caller can observe between calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSnapshot {
    pub status: Phase,
    pub loading: bool,
    pub current_request: Option<AnalysisRequest>,
    pub result: Option<AnalysisResult>,
    pub error: Option<ErrorReport>,
    pub settled_at: Option<DateTime<Utc>>,
}

struct InFlight {
    id: u64,
    cancel: oneshot::Sender<CancelReason>,
}

#[derive(Default)]
struct Inner {
    next_handle: u64,
    in_flight: Option<InFlight>,
    current_request: Option<AnalysisRequest>,
    result: Option<AnalysisResult>,
    error: Option<AnalysisError>,
    settled_at: Option<DateTime<Utc>>,
}

pub struct Coordinator {
    settings: CoordinatorSettings,
    transport: Arc<dyn AnalysisTransport>,
    limiter: Arc<RateLimiter>,
    inner: Mutex<Inner>,
}

impl Coordinator {
    pub fn new(
        settings: CoordinatorSettings,
        transport: Arc<dyn AnalysisTransport>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            settings,
            transport,
            limiter,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Runs one analysis. Supersedes any call still in flight.
    ///
    /// A superseded or cancelled call returns `Cancelled` and leaves the
    /// observable state to whoever replaced it.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let Some(endpoint) = self.settings.endpoint.as_deref() else {
            warn!("Analysis rejected: ANALYZE_URL is not configured");
            return Err(self.reject(AnalysisError::NotConfigured));
        };

        if !self.limiter.can_make_request().await {
            let wait_ms = self.limiter.time_until_reset().await;
            info!("Analysis rejected by rate limiter, resets in {wait_ms}ms");
            return Err(self.reject(AnalysisError::RateLimited {
                seconds_until_reset: wait_ms.div_ceil(1000),
            }));
        }

        let (id, mut cancel_rx) = self.begin(&request);
        let _guard = InFlightGuard { coordinator: self, id };

        // Charged before validation so rejected payloads still cost a slot.
        self.limiter.record_request().await;

        let outcome = self.run(id, endpoint, &request, &mut cancel_rx).await;
        self.settle(id, outcome, &mut cancel_rx)
    }

    /// Aborts the in-flight call, if any, without surfacing an error.
    /// Returns whether there was anything to cancel.
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        match inner.in_flight.take() {
            Some(in_flight) => {
                info!("Analysis {} cancelled by caller", in_flight.id);
                let _ = in_flight.cancel.send(CancelReason::Caller);
                true
            }
            None => false,
        }
    }

    /// Cancels any in-flight call and clears result, error and request.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if let Some(in_flight) = inner.in_flight.take() {
            info!("Analysis {} cancelled by reset", in_flight.id);
            let _ = in_flight.cancel.send(CancelReason::Caller);
        }
        inner.current_request = None;
        inner.result = None;
        inner.error = None;
        inner.settled_at = None;
    }

    pub fn snapshot(&self) -> AnalysisSnapshot {
        let inner = self.lock();
        let requesting = inner.in_flight.is_some();

        AnalysisSnapshot {
            status: if requesting {
                Phase::Requesting
            } else {
                Phase::Idle
            },
            loading: requesting,
            current_request: inner.current_request.clone(),
            result: inner.result.clone(),
            error: inner.error.as_ref().map(|e| ErrorReport {
                kind: e.kind(),
                message: e.to_string(),
            }),
            settled_at: inner.settled_at,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records an immediate rejection. Skipped while a call is in flight so an
    /// extra attempt cannot clobber the outstanding one.
    fn reject(&self, error: AnalysisError) -> AnalysisError {
        let mut inner = self.lock();
        if inner.in_flight.is_none() {
            inner.result = None;
            inner.error = Some(error.clone());
            inner.settled_at = Some(Utc::now());
        }
        error
    }

    fn begin(&self, request: &AnalysisRequest) -> (u64, oneshot::Receiver<CancelReason>) {
        let mut inner = self.lock();

        if let Some(previous) = inner.in_flight.take() {
            info!("Analysis {} superseded", previous.id);
            let _ = previous.cancel.send(CancelReason::Superseded);
        }

        inner.next_handle += 1;
        let id = inner.next_handle;
        let (cancel_tx, cancel_rx) = oneshot::channel();

        inner.in_flight = Some(InFlight {
            id,
            cancel: cancel_tx,
        });
        inner.current_request = Some(request.clone());
        inner.error = None;

        info!("Analysis {id} started");
        (id, cancel_rx)
    }

    async fn run(
        &self,
        id: u64,
        endpoint: &str,
        request: &AnalysisRequest,
        cancel_rx: &mut oneshot::Receiver<CancelReason>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let payload = self.prepare(request)?;

        // Cancelled while the slot was being recorded.
        if let Some(reason) = pending_cancel(cancel_rx) {
            return Err(AnalysisError::Cancelled { reason });
        }

        let call = self.transport.post(endpoint, &payload);
        let raced = tokio::select! {
            biased;

            Ok(reason) = &mut *cancel_rx => Err(Abort::Cancel(reason)),

            _ = tokio::time::sleep(self.settings.timeout) => Err(Abort::Timeout),

            response = call => Ok(response),
        };

        let response = match raced {
            Ok(response) => response.map_err(|e| {
                warn!("Analysis {id} transport failure: {e}");
                AnalysisError::Network(e.message)
            })?,
            Err(Abort::Cancel(reason)) => return Err(AnalysisError::Cancelled { reason }),
            Err(Abort::Timeout) => {
                let after_ms = u64::try_from(self.settings.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!("Analysis {id} timed out after {after_ms}ms");
                return Err(AnalysisError::Timeout { after_ms });
            }
        };

        if !response.is_success() {
            warn!("Analysis {id} upstream returned {}", response.status);
            return Err(AnalysisError::UpstreamHttp {
                status: response.status,
                body_snippet: response.body.chars().take(BODY_SNIPPET_CHARS).collect(),
            });
        }

        let raw: serde_json::Value = serde_json::from_str(&response.body)
            .map_err(|e| ShapeError::NotJson(e.to_string()))?;

        validate_envelope(raw).map_err(|e| {
            warn!("Analysis {id} upstream payload rejected: {e}");
            AnalysisError::InvalidUpstreamShape(e)
        })
    }

    /// Sanitizes both fields and applies the content checks.
    fn prepare(&self, request: &AnalysisRequest) -> Result<AnalysisRequest, AnalysisError> {
        Ok(AnalysisRequest {
            resume_text: self.clean(InputField::ResumeText, &request.resume_text)?,
            job_description: self.clean(InputField::JobDescription, &request.job_description)?,
        })
    }

    fn clean(&self, field: InputField, text: &str) -> Result<String, AnalysisError> {
        let cleaned = sanitize(text);

        let length = check_length(&cleaned, self.settings.max_input_chars);
        let check = if length.valid {
            validate_content(&cleaned)
        } else {
            length
        };

        if check.valid {
            Ok(cleaned)
        } else {
            Err(AnalysisError::InvalidInput {
                field,
                reason: check.reason.unwrap_or_default(),
            })
        }
    }

    /// Applies the outcome if `id` is still current; otherwise discards it and
    /// reports the call as cancelled.
    fn settle(
        &self,
        id: u64,
        outcome: Result<AnalysisResult, AnalysisError>,
        cancel_rx: &mut oneshot::Receiver<CancelReason>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let mut inner = self.lock();

        let is_current = inner.in_flight.as_ref().is_some_and(|f| f.id == id);
        if !is_current {
            debug!("Discarding outcome of stale analysis {id}");
            return match outcome {
                Err(e @ AnalysisError::Cancelled { .. }) => Err(e),
                _ => Err(AnalysisError::Cancelled {
                    reason: cancel_rx.try_recv().unwrap_or(CancelReason::Superseded),
                }),
            };
        }

        inner.in_flight = None;
        inner.settled_at = Some(Utc::now());
        match &outcome {
            Ok(result) => {
                info!("Analysis {id} succeeded: match_score={}", result.match_score);
                inner.result = Some(result.clone());
                inner.error = None;
            }
            Err(AnalysisError::Cancelled { .. }) => {}
            Err(e) => {
                info!("Analysis {id} failed: {}", e.kind());
                inner.result = None;
                inner.error = Some(e.clone());
            }
        }

        outcome
    }
}

/// Clears the in-flight slot if the owning `analyze` future is dropped before
/// it settles, e.g. when the HTTP client disconnects.
struct InFlightGuard<'a> {
    coordinator: &'a Coordinator,
    id: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.coordinator.lock();
        if inner.in_flight.as_ref().is_some_and(|f| f.id == self.id) {
            debug!("Analysis {} dropped before settling", self.id);
            inner.in_flight = None;
        }
    }
}

/// Reason already delivered on `cancel_rx`, if any. A dropped sender means
/// the handle was replaced without a signal and counts as superseded.
fn pending_cancel(cancel_rx: &mut oneshot::Receiver<CancelReason>) -> Option<CancelReason> {
    match cancel_rx.try_recv() {
        Ok(reason) => Some(reason),
        Err(TryRecvError::Closed) => Some(CancelReason::Superseded),
        Err(TryRecvError::Empty) => None,
    }
}
