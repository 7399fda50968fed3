// Request orchestration and validation layer between callers and the external
// analysis webhook: input sanitizing, envelope validation, single-flight
// coordination. Rate limiting lives in crate::rate_limit; all network calls go
// through crate::analysis_client.

pub mod coordinator;
pub mod envelope;
pub mod handlers;
pub mod sanitize;

pub use coordinator::{Coordinator, CoordinatorSettings};
