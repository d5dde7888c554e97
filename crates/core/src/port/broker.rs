// Broker Port (message broker client interface)

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Message broker client.
///
/// Implementations own exactly one durable connection and all reconnection
/// logic; callers never see transient connection failures, only an eventual
/// publish error after the attempt budget is exhausted.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Durable publish with no delay.
    async fn publish_now(&self, body: Vec<u8>, routing_key: &str) -> Result<()>;

    /// Durable publish that becomes visible to consumers only after `delay`.
    /// The delay is carried per message, so items with different delays
    /// share one exchange/queue pair.
    async fn publish_delayed(&self, body: Vec<u8>, routing_key: &str, delay: Duration)
        -> Result<()>;

    /// Continuous, restartable stream of raw payloads from `queue`.
    /// The stream survives broker restarts; it ends only when the client is
    /// closed or the receiver is dropped.
    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Vec<u8>>>;

    /// Release broker resources. Idempotent; bounded by a grace period.
    async fn close(&self);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// One recorded publish call.
    #[derive(Debug, Clone)]
    pub struct PublishedMessage {
        pub body: Vec<u8>,
        pub routing_key: String,
        /// None for publish_now
        pub delay: Option<Duration>,
    }

    /// Recording broker for tests: captures publishes, lets the test inject
    /// deliveries into the consumed stream, and can be switched to fail
    /// every publish.
    pub struct MockBroker {
        published: Mutex<Vec<PublishedMessage>>,
        fail_publish: AtomicBool,
        delivery_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
        closed: AtomicBool,
    }

    impl MockBroker {
        pub fn new() -> Self {
            Self {
                published: Mutex::new(Vec::new()),
                fail_publish: AtomicBool::new(false),
                delivery_tx: Mutex::new(None),
                closed: AtomicBool::new(false),
            }
        }

        pub fn fail_publishes(&self, fail: bool) {
            self.fail_publish.store(fail, Ordering::SeqCst);
        }

        pub fn published(&self) -> Vec<PublishedMessage> {
            self.published.lock().unwrap().clone()
        }

        /// Push a payload into the stream returned by `consume`.
        pub async fn inject(&self, body: Vec<u8>) {
            let tx = self.delivery_tx.lock().unwrap().clone();
            if let Some(tx) = tx {
                tx.send(body).await.expect("consumer receiver dropped");
            }
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn record(&self, body: Vec<u8>, routing_key: &str, delay: Option<Duration>) -> Result<()> {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(crate::error::AppError::Broker(
                    "mock publish failure".to_string(),
                ));
            }
            self.published.lock().unwrap().push(PublishedMessage {
                body,
                routing_key: routing_key.to_string(),
                delay,
            });
            Ok(())
        }
    }

    impl Default for MockBroker {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Broker for MockBroker {
        async fn publish_now(&self, body: Vec<u8>, routing_key: &str) -> Result<()> {
            self.record(body, routing_key, None)
        }

        async fn publish_delayed(
            &self,
            body: Vec<u8>,
            routing_key: &str,
            delay: Duration,
        ) -> Result<()> {
            self.record(body, routing_key, Some(delay))
        }

        async fn consume(&self, _queue: &str) -> Result<mpsc::Receiver<Vec<u8>>> {
            let (tx, rx) = mpsc::channel(16);
            *self.delivery_tx.lock().unwrap() = Some(tx);
            Ok(rx)
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            *self.delivery_tx.lock().unwrap() = None;
        }
    }
}
