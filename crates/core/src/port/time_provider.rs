// Time Provider Port (for testability)

/// Time provider interface (allows mocking in tests)
pub trait TimeProvider: Send + Sync {
    /// Current time in milliseconds since epoch
    fn now_millis(&self) -> i64;

    /// Current time in seconds since epoch (scheduling math is in seconds)
    fn now_secs(&self) -> i64 {
        self.now_millis() / 1000
    }
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::TimeProvider;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Manually advanced clock for deterministic tests
    pub struct FixedTimeProvider {
        now_secs: AtomicI64,
    }

    impl FixedTimeProvider {
        pub fn new(now_secs: i64) -> Self {
            Self {
                now_secs: AtomicI64::new(now_secs),
            }
        }

        pub fn set(&self, now_secs: i64) {
            self.now_secs.store(now_secs, Ordering::SeqCst);
        }

        pub fn advance(&self, secs: i64) {
            self.now_secs.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl TimeProvider for FixedTimeProvider {
        fn now_millis(&self) -> i64 {
            self.now_secs.load(Ordering::SeqCst) * 1000
        }
    }
}
