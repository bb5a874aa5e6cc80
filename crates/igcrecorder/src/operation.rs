//! Cancellation and progress shared between a caller and a running driver
//! operation.
//!
//! Long device exchanges (flight list, flight download) run on the caller's
//! thread. Another thread can hold a clone of the same [`OperationHandle`]
//! to request cancellation or poll progress; the driver checks the flag
//! between chunks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, Result};

/// Handle to a cancellable, progress-reporting operation.
#[derive(Debug, Clone, Default)]
pub struct OperationHandle {
    cancel_signal: Arc<AtomicBool>,
    range: Arc<AtomicU64>,
    position: Arc<AtomicU64>,
}

impl OperationHandle {
    /// Create a new handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the operation to stop at the next checkpoint.
    pub fn cancel(&self) {
        self.cancel_signal.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_signal.load(Ordering::SeqCst)
    }

    /// Return [`Error::Cancelled`] if cancellation has been requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] once [`cancel`](Self::cancel) was called.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Clear the cancellation flag and progress.
    pub fn reset(&self) {
        self.cancel_signal.store(false, Ordering::SeqCst);
        self.range.store(0, Ordering::SeqCst);
        self.position.store(0, Ordering::SeqCst);
    }

    /// Set the total amount of work.
    pub fn set_progress_range(&self, range: u64) {
        self.range.store(range, Ordering::SeqCst);
    }

    /// Set how much of the work is done.
    pub fn set_progress_position(&self, position: u64) {
        trace!(position, range = self.range.load(Ordering::SeqCst), "Progress");
        self.position.store(position, Ordering::SeqCst);
    }

    /// Current `(position, range)`.
    #[must_use]
    pub fn progress(&self) -> (u64, u64) {
        (
            self.position.load(Ordering::SeqCst),
            self.range.load(Ordering::SeqCst),
        )
    }
}
