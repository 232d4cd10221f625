//! Shutdown coordination for the monitor.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Every long-running task holds a child token; triggering cancels them all,
/// including probe batches that are still in flight.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A token cancelled when shutdown is triggered. Tokens handed out after
    /// the trigger are already cancelled.
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }
}
