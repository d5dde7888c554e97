// Cooperative shutdown signal for the background loops.
// The sender lives in the composition root; every loop holds a token and
// checks it between units of work.

use tokio::sync::watch;

/// Create a shutdown channel. More tokens can be minted from the sender.
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token holder. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Mint an additional token for another loop.
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is signalled (or the sender is gone).
    pub async fn wait(&mut self) {
        let _ = self.rx.changed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokens_observe_the_signal() {
        let (sender, token) = shutdown_channel();
        let mut second = sender.token();

        assert!(!token.is_shutdown());
        sender.shutdown();
        assert!(token.is_shutdown());

        // wait() must resolve promptly after the signal.
        tokio::time::timeout(std::time::Duration::from_secs(1), second.wait())
            .await
            .expect("wait resolved");
        assert!(second.is_shutdown());
    }
}
