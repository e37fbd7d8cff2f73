//! Cooperative shutdown shared by every loop of a node.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

/// One-shot "stop running" signal.
///
/// The running flag can be cleared exactly once; the first [`trigger`]
/// also wakes every [`ShutdownListener`] blocked in [`ShutdownListener::wait`].
///
/// [`trigger`]: ShutdownSignal::trigger
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    running: Arc<AtomicBool>,
    tx: broadcast::Sender<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            running: Arc::new(AtomicBool::new(true)),
            tx,
        }
    }

    /// Whether shutdown has not been requested yet.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request shutdown. Returns `true` only for the call that flipped the flag.
    pub fn trigger(&self) -> bool {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.tx.send(());
            true
        } else {
            false
        }
    }

    /// Create a listener for one loop.
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            running: Arc::clone(&self.running),
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-task view of a [`ShutdownSignal`].
#[derive(Debug)]
pub struct ShutdownListener {
    running: Arc<AtomicBool>,
    rx: broadcast::Receiver<()>,
}

impl ShutdownListener {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&mut self) {
        if !self.is_running() {
            return;
        }
        let _ = self.rx.recv().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_is_idempotent() {
        let signal = ShutdownSignal::new();
        assert!(signal.is_running());
        assert!(signal.trigger());
        assert!(!signal.trigger());
        assert!(!signal.is_running());
    }

    #[tokio::test]
    async fn test_listener_wakes_on_trigger() {
        let signal = ShutdownSignal::new();
        let mut listener = signal.subscribe();

        let waiter = tokio::spawn(async move {
            listener.wait().await;
            listener.is_running()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.trigger();

        let still_running = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("listener should wake")
            .unwrap();
        assert!(!still_running);
    }

    #[tokio::test]
    async fn test_late_listener_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();

        let mut listener = signal.subscribe();
        tokio::time::timeout(Duration::from_millis(200), listener.wait())
            .await
            .expect("already-triggered signal should not block");
    }
}
