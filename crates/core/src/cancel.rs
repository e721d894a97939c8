// Cooperative cancellation flag shared between a caller and a worker thread

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Cancelled` if the token was tripped
    pub fn check(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::AudioError::Cancelled)
        } else {
            Ok(())
        }
    }
}
