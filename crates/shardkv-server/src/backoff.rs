// SPDX-License-Identifier: Apache-2.0
//! Bounded exponential backoff for the startup `Join` retry loop, in the
//! style of the corpus's `backoff(attempt)` helpers used around flaky
//! upstream calls (e.g. `gazette::journal::list`'s retry loop).

use std::time::Duration;

/// Delay before retry number `attempt` (0-indexed): doubles each attempt,
/// capped at 5 seconds.
#[must_use]
pub fn delay_for(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(8)).unwrap_or(u32::MAX);
    let scaled = base.saturating_mul(factor);
    scaled.min(Duration::from_secs(5))
}
