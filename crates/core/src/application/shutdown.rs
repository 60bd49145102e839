// Shutdown Token
//
// One sender, many tokens: the HTTP server and the queue drain both watch the
// same signal.

use tokio::sync::watch;

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal
    ///
    /// Returns immediately if shutdown was already requested, and also when the
    /// sender is dropped.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|requested| *requested).await;
    }

    /// Owned future for APIs that take a `'static` shutdown signal
    pub async fn cancelled(mut self) {
        self.wait().await;
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Another token watching this sender
    pub fn subscribe(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_tokens_observe_shutdown() {
        let (tx, token) = shutdown_channel();
        let mut second = tx.subscribe();
        assert!(!token.is_shutdown());

        let waiter = tokio::spawn(token.clone().cancelled());
        tx.shutdown();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        second.wait().await;
        assert!(token.is_shutdown());
        assert!(second.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_after_shutdown_returns_immediately() {
        let (tx, mut token) = shutdown_channel();
        tx.shutdown();
        tokio_test::assert_ready!(tokio_test::task::spawn(token.wait()).poll());
    }
}
