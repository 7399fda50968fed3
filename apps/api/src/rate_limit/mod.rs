//! Client-side sliding-window rate limiter for calls to the analysis service.
//!
//! The ledger is a JSON array of epoch-millisecond timestamps kept in an
//! injected `LedgerStore`. Every access prunes entries older than the window.
//! Every store call is bounded by a deadline; a store that does not answer in
//! time counts as unavailable, so the limiter fails open instead of stalling.
//! Check-then-record is not atomic across processes sharing one store; real
//! enforcement belongs to the upstream.

pub mod clock;
pub mod store;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

pub use clock::{Clock, SystemClock};
pub use store::{LedgerStore, MemoryLedgerStore, RedisLedgerStore, StoreError};

/// Fixed key the ledger lives under.
pub const LEDGER_KEY: &str = "resume_analyzer_rate_limit";

/// Default deadline for a single ledger read or write.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(2_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        RateLimitPolicy {
            max_requests: 10,
            window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub limit: u32,
    pub remaining: u32,
    pub window_ms: u64,
    pub ms_until_reset: u64,
}

pub struct RateLimiter {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    policy: RateLimitPolicy,
    store_timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>, policy: RateLimitPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// True when fewer than `max_requests` fall inside the window.
    /// Fails open when the store cannot be read.
    pub async fn can_make_request(&self) -> bool {
        let ledger = match self.load().await {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!("Rate-limit ledger unreadable, allowing request: {e}");
                return true;
            }
        };

        let stored = ledger.len();
        let recent = self.prune(ledger, self.clock.now_ms());
        if recent.len() != stored {
            self.persist(&recent).await;
        }

        let allowed = recent.len() < self.policy.max_requests as usize;
        if !allowed {
            debug!(
                "Rate limit reached: {} requests in the last {}ms",
                recent.len(),
                self.policy.window_ms
            );
        }
        allowed
    }

    /// Appends "now" to the ledger. Best effort: store failures are logged.
    pub async fn record_request(&self) {
        let ledger = match self.load().await {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!("Rate-limit ledger unreadable, request not recorded: {e}");
                return;
            }
        };

        let now = self.clock.now_ms();
        let mut recent = self.prune(ledger, now);
        recent.push(now);
        self.persist(&recent).await;
    }

    pub async fn remaining_requests(&self) -> u32 {
        match self.load().await {
            Ok(ledger) => {
                let recent = self.prune(ledger, self.clock.now_ms());
                self.remaining_of(&recent)
            }
            Err(_) => self.policy.max_requests,
        }
    }

    /// Milliseconds until the oldest live entry leaves the window.
    pub async fn time_until_reset(&self) -> u64 {
        match self.load().await {
            Ok(ledger) => {
                let now = self.clock.now_ms();
                let recent = self.prune(ledger, now);
                self.reset_in(&recent, now)
            }
            Err(_) => 0,
        }
    }

    /// Limit, remaining and reset time from a single ledger read.
    pub async fn quota(&self) -> QuotaStatus {
        let (remaining, ms_until_reset) = match self.load().await {
            Ok(ledger) => {
                let now = self.clock.now_ms();
                let recent = self.prune(ledger, now);
                (self.remaining_of(&recent), self.reset_in(&recent, now))
            }
            Err(_) => (self.policy.max_requests, 0),
        };

        QuotaStatus {
            limit: self.policy.max_requests,
            remaining,
            window_ms: self.policy.window_ms,
            ms_until_reset,
        }
    }

    async fn load(&self) -> Result<Vec<i64>, StoreError> {
        let raw = self.bounded(self.store.get(LEDGER_KEY)).await?;
        Ok(raw.map(|raw| parse_ledger(&raw)).unwrap_or_default())
    }

    async fn persist(&self, ledger: &[i64]) {
        let encoded = match serde_json::to_string(ledger) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode rate-limit ledger: {e}");
                return;
            }
        };
        if let Err(e) = self.bounded(self.store.set(LEDGER_KEY, &encoded)).await {
            warn!("Failed to persist rate-limit ledger: {e}");
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!(
                    "no answer within {}ms",
                    self.store_timeout.as_millis()
                ))
            })?
    }

    fn window_ms(&self) -> i64 {
        i64::try_from(self.policy.window_ms).unwrap_or(i64::MAX)
    }

    fn prune(&self, mut ledger: Vec<i64>, now: i64) -> Vec<i64> {
        let window = self.window_ms();
        ledger.retain(|&ts| now.saturating_sub(ts) < window);
        ledger
    }

    fn remaining_of(&self, recent: &[i64]) -> u32 {
        let used = u32::try_from(recent.len()).unwrap_or(u32::MAX);
        self.policy.max_requests.saturating_sub(used)
    }

    fn reset_in(&self, recent: &[i64], now: i64) -> u64 {
        match recent.iter().min() {
            Some(&oldest) => {
                let reset_at = oldest.saturating_add(self.window_ms());
                u64::try_from(reset_at.saturating_sub(now)).unwrap_or(0)
            }
            None => 0,
        }
    }
}

/// Unparseable ledgers are treated as empty.
fn parse_ledger(raw: &str) -> Vec<i64> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Discarding corrupt rate-limit ledger: {e}");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::clock::ManualClock;
    use super::store::{FailingLedgerStore, StalledLedgerStore};
    use super::*;

    const START: i64 = 1_700_000_000_000;

    fn limiter_with(store: Arc<dyn LedgerStore>) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let limiter = RateLimiter::new(store, clock.clone(), RateLimitPolicy::default());
        (limiter, clock)
    }

    fn limiter() -> (RateLimiter, Arc<ManualClock>, Arc<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::new());
        let (limiter, clock) = limiter_with(store.clone());
        (limiter, clock, store)
    }

    async fn stored_ledger(store: &MemoryLedgerStore) -> Vec<i64> {
        let raw = store.get(LEDGER_KEY).await.unwrap().unwrap_or_default();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_ledger_allows_and_has_full_quota() {
        let (limiter, _, _) = limiter();
        assert!(limiter.can_make_request().await);
        assert_eq!(limiter.remaining_requests().await, 10);
        assert_eq!(limiter.time_until_reset().await, 0);
    }

    #[tokio::test]
    async fn test_ten_requests_exhaust_window() {
        let (limiter, clock, _) = limiter();
        for _ in 0..10 {
            assert!(limiter.can_make_request().await);
            limiter.record_request().await;
            clock.advance(1_000);
        }

        assert!(!limiter.can_make_request().await);
        assert_eq!(limiter.remaining_requests().await, 0);
    }

    #[tokio::test]
    async fn test_window_elapses_after_time_until_reset() {
        let (limiter, clock, _) = limiter();
        for _ in 0..10 {
            limiter.record_request().await;
            clock.advance(500);
        }
        assert!(!limiter.can_make_request().await);

        let wait = limiter.time_until_reset().await;
        assert_eq!(wait, 60_000 - 5_000);

        clock.advance(wait as i64);
        assert!(limiter.can_make_request().await);
        assert_eq!(limiter.remaining_requests().await, 1);
    }

    #[tokio::test]
    async fn test_entry_expires_exactly_at_window_edge() {
        let (limiter, clock, _) = limiter();
        limiter.record_request().await;

        clock.advance(59_999);
        assert_eq!(limiter.remaining_requests().await, 9);

        clock.advance(1);
        assert_eq!(limiter.remaining_requests().await, 10);
        assert_eq!(limiter.time_until_reset().await, 0);
    }

    #[tokio::test]
    async fn test_check_persists_pruned_ledger() {
        let (limiter, clock, store) = limiter();
        limiter.record_request().await;
        clock.advance(30_000);
        limiter.record_request().await;
        assert_eq!(stored_ledger(&store).await.len(), 2);

        clock.advance(40_000);
        assert!(limiter.can_make_request().await);
        assert_eq!(stored_ledger(&store).await, vec![START + 30_000]);
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_treated_as_empty() {
        let (limiter, _, store) = limiter();
        store.set(LEDGER_KEY, "not json {").await.unwrap();

        assert!(limiter.can_make_request().await);
        assert_eq!(limiter.remaining_requests().await, 10);

        limiter.record_request().await;
        assert_eq!(stored_ledger(&store).await, vec![START]);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_open() {
        let (limiter, _) = limiter_with(Arc::new(FailingLedgerStore));
        limiter.record_request().await;

        assert!(limiter.can_make_request().await);
        assert_eq!(limiter.remaining_requests().await, 10);
        assert_eq!(limiter.time_until_reset().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_store_fails_open_after_deadline() {
        let (limiter, _) = limiter_with(Arc::new(StalledLedgerStore));
        let limiter = limiter.with_store_timeout(Duration::from_millis(250));

        let started = tokio::time::Instant::now();
        assert!(limiter.can_make_request().await);
        limiter.record_request().await;
        assert_eq!(limiter.remaining_requests().await, 10);
        assert_eq!(limiter.time_until_reset().await, 0);

        // Four ledger reads, each abandoned after 250ms.
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_future_timestamps_do_not_panic() {
        let (limiter, _, store) = limiter();
        store
            .set(LEDGER_KEY, &format!("[{}, {}]", i64::MIN, START + 10_000))
            .await
            .unwrap();

        assert!(limiter.can_make_request().await);
        assert_eq!(limiter.remaining_requests().await, 9);
        assert_eq!(limiter.time_until_reset().await, 70_000);
    }

    #[tokio::test]
    async fn test_quota_reports_single_snapshot() {
        let (limiter, clock, _) = limiter();
        limiter.record_request().await;
        clock.advance(15_000);
        limiter.record_request().await;

        let quota = limiter.quota().await;
        assert_eq!(
            quota,
            QuotaStatus {
                limit: 10,
                remaining: 8,
                window_ms: 60_000,
                ms_until_reset: 45_000,
            }
        );
    }
}
