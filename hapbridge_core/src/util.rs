//! Common time/period helpers for hapbridge_core.

use std::time::Duration;

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Tick rate in Hz for a period in milliseconds, at least 1.
#[inline]
pub fn rate_hz(period_ms: u64) -> u32 {
    u32::try_from(MILLIS_PER_SEC / period_ms.max(1))
        .unwrap_or(u32::MAX)
        .max(1)
}

/// How long to wait before the next tick: `max(period - elapsed, 0)`.
#[inline]
pub fn remaining_in_period(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

/// Duration as fractional milliseconds.
#[allow(clippy::cast_possible_truncation)]
#[inline]
pub fn duration_ms_f32(d: Duration) -> f32 {
    (d.as_secs_f64() * 1000.0) as f32
}
