//! Exponential backoff utilities for retry operations.

use crate::constants::{MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS};
use std::time::Duration;

/// Delay before retry number `attempt` (0-based): 50ms, 100ms, 200ms... capped at 500ms.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let delay = STARTING_BACKOFF_DELAY_MS.saturating_mul(factor).min(MAX_BACKOFF_DELAY_MS);
    Duration::from_millis(delay)
}

/// Performs exponential backoff on the current (blocking) thread.
///
/// # Arguments
/// * `attempt` - Current retry attempt number (0-based)
///
/// # Returns
/// * `u32` - The next attempt number (incremented)
pub fn blocking_backoff_with_delay(attempt: u32) -> u32 {
    std::thread::sleep(backoff_delay(attempt));
    attempt.saturating_add(1)
}
