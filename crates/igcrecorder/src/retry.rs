//! Bounded retry shared by all protocol drivers.

use tracing::debug;

use crate::error::{Error, Result};

/// Run `op` up to `attempts` times.
///
/// The attempt number (starting at 1) is passed to `op`. The first success
/// is returned. Errors that [`Error::is_retryable`] rejects end the loop
/// immediately; otherwise the last error is returned once all attempts are
/// used up.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last retryable one.
pub fn retry<T>(attempts: u32, mut op: impl FnMut(u32) -> Result<T>) -> Result<T> {
    let mut last = None;

    for attempt in 1..=attempts.max(1) {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                debug!(attempt, attempts, error = %e, "Attempt failed, retrying");
                last = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last.unwrap_or_else(|| Error::internal("retry loop made no attempt")))
}
