use std::sync::Arc;

use crate::analysis::Coordinator;
use crate::config::Config;
use crate::rate_limit::RateLimiter;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// The single coordinator; every caller shares its in-flight slot.
    pub coordinator: Arc<Coordinator>,
    /// Same limiter the coordinator gates on, exposed for quota reporting.
    pub limiter: Arc<RateLimiter>,
    pub config: Config,
}
