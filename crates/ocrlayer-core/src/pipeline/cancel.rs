//! Whole-document cancellation.

use std::sync::Arc;

use tokio::sync::watch;

/// Cloneable cancellation flag shared between the caller and the pipeline.
///
/// Once cancelled, no new page work is started; pages already running finish
/// their current step.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this only ends on cancel.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}
