// Shutdown Token

use tokio::sync::watch;

/// Cooperative shutdown signal shared by the worker loop and the
/// stale-claim monitor.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check whether shutdown was requested (non-blocking)
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested
    pub async fn wait(&mut self) {
        // A dropped sender counts as shutdown
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Sending half of the shutdown signal
#[derive(Debug)]
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal all tokens to shut down
    pub fn shutdown(&self) {
        // Nothing to notify when every receiver is already gone
        let _ = self.tx.send(true);
    }

    /// Create another token observing the same signal
    pub fn subscribe(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a linked shutdown sender/token pair
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
