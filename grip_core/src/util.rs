//! Common time/period helpers for grip_core.

use std::time::Duration;

/// Number of microseconds in one millisecond.
pub const MICROS_PER_MILLI: u64 = 1_000;

/// Round a period in microseconds up to whole milliseconds, at least 1.
#[inline]
pub fn period_ms(period_us: u64) -> u64 {
    period_us.div_ceil(MICROS_PER_MILLI).max(1)
}

/// Cycle rate in Hz for a period in microseconds. Clamps the period to at least 1 µs.
#[inline]
#[allow(clippy::cast_precision_loss)]
pub fn rate_hz(period_us: u64) -> f64 {
    1_000_000.0 / period_us.max(1) as f64
}

/// Saturating milliseconds of a `Duration`.
#[inline]
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Watchdog threshold for the frame reader.
///
/// Starts from four read timeouts so a single slow read never trips it, never
/// shorter than two control periods, and kept strictly below `max_run_ms`
/// (when a cap is set) so the watchdog can still fire before the hard stop.
#[inline]
pub fn stall_threshold_ms(read_timeout_ms: u64, period_ms: u64, max_run_ms: u64) -> u64 {
    let fast = read_timeout_ms.saturating_mul(4);
    let two_p = period_ms.saturating_mul(2);
    let safe = fast.max(two_p);
    if max_run_ms == 0 {
        return safe.max(1);
    }
    safe.min(max_run_ms.saturating_sub(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stall_threshold_unbounded_run() {
        assert_eq!(stall_threshold_ms(100, 10, 0), 400);
        assert_eq!(stall_threshold_ms(1, 10, 0), 20);
    }

    #[test]
    fn stall_threshold_capped_below_max_run() {
        assert_eq!(stall_threshold_ms(100, 10, 250), 249);
        assert_eq!(stall_threshold_ms(100, 10, 1), 1);
    }
}
