//! Polling helpers used instead of fixed sleeps.

use crate::error::{Error, Result};
use crate::vcr::VcrRecorder;
use std::time::{Duration, Instant};
use tracing::debug;

/// Poll interval to use under `recorder`: zero when traffic is replayed.
#[must_use]
pub fn effective_interval(interval: Duration, recorder: Option<&VcrRecorder>) -> Duration {
    match recorder {
        Some(recorder) if recorder.should_retry_immediately() => Duration::ZERO,
        _ => interval,
    }
}

/// Call `condition` until it returns `true`, sleeping `interval` between
/// attempts. Errors from `condition` end the wait immediately.
///
/// The condition is always evaluated at least once, even with a zero timeout.
pub fn wait_till_condition<F>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    let started = Instant::now();
    let mut attempts = 0_u32;
    loop {
        attempts += 1;
        if condition()? {
            debug!(what, attempts, "wait condition met");
            return Ok(());
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(Error::Timeout {
                what: what.to_string(),
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            });
        }
        if !interval.is_zero() {
            std::thread::sleep(interval.min(timeout.saturating_sub(elapsed)));
        }
    }
}
