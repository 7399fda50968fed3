use chrono::Utc;

/// Wall-clock source in epoch milliseconds. Injected so ledger tests can move
/// time forward deterministically.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::Clock;

    /// Test clock that only moves when told to.
    pub struct ManualClock(AtomicI64);

    impl ManualClock {
        pub fn new(start_ms: i64) -> Self {
            ManualClock(AtomicI64::new(start_ms))
        }

        pub fn advance(&self, ms: i64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}
