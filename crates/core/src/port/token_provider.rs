// Correlation Token Port (for deterministic testing)

/// Mints the globally unique token carried end-to-end through a work item
/// and its eventual result.
pub trait TokenProvider: Send + Sync {
    fn mint(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidTokenProvider;

impl TokenProvider for UuidTokenProvider {
    fn mint(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::TokenProvider;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Deterministic tokens: tok-1, tok-2, ...
    pub struct SequentialTokenProvider {
        counter: AtomicU64,
    }

    impl SequentialTokenProvider {
        pub fn new() -> Self {
            Self {
                counter: AtomicU64::new(0),
            }
        }
    }

    impl Default for SequentialTokenProvider {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TokenProvider for SequentialTokenProvider {
        fn mint(&self) -> String {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            format!("tok-{n}")
        }
    }
}
