use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Wait until `is_busy` reports false or `timeout` expires.
/// Sleeps in small intervals to avoid CPU spinning.
pub fn wait_until_idle_with_timeout(
    mut is_busy: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while is_busy() {
        if Instant::now() >= deadline {
            return Err(HwError::Timeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}

/// Model a call that takes `latency` to complete against a caller deadline.
pub fn simulate_call_latency(latency: Duration, timeout: Duration) -> Result<()> {
    if latency.is_zero() {
        return Ok(());
    }
    let started = Instant::now();
    wait_until_idle_with_timeout(
        || started.elapsed() < latency,
        timeout,
        Duration::from_micros(200),
    )
}
