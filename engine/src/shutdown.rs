//! Graceful shutdown for long-running engine tasks.
//!
//! Broadcasts a stop signal to every subscribed loop (the background
//! identifier today) via a `tokio::sync::broadcast` channel.

use tokio::sync::broadcast;

/// Coordinates graceful shutdown across engine tasks.
///
/// Loops call [`subscribe`](Self::subscribe) to get a receiver, then
/// `select!` on it alongside their main work. When shutdown is triggered
/// every receiver is notified. Dropping the controller also stops them.
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Get a receiver that will be notified on shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Number of loops still listening.
    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_notifies_subscribers() {
        let controller = ShutdownController::new();
        let mut rx1 = controller.subscribe();
        let mut rx2 = controller.subscribe();
        assert_eq!(controller.listeners(), 2);
        controller.shutdown();
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn dropping_controller_closes_receivers() {
        let controller = ShutdownController::new();
        let mut rx = controller.subscribe();
        drop(controller);
        assert!(rx.recv().await.is_err());
    }
}
