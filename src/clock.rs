// src/clock.rs

// Wall-clock helpers shared by every time-based algorithm.
//
// All limiters deliberately read the system (wall) clock rather than a
// monotonic one: window alignment has to agree across processes sharing a
// store, and aligned window starts are only meaningful against the epoch.
// A backward clock jump can therefore shift window alignment or stall a
// refill; callers that cannot tolerate that should not step the clock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time as fractional seconds since the epoch.
pub fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs_f64()
}

/// Start of the aligned window containing `now_secs`, for windows of
/// `window_secs` seconds anchored at the epoch.
pub fn window_start(now_secs: f64, window_secs: u64) -> u64 {
    let now = now_secs as u64;
    now - (now % window_secs)
}

/// Convert fractional seconds to a `Duration`. Non-positive and NaN
/// inputs clamp to zero; inputs past the representable range clamp to
/// `Duration::MAX` instead of panicking, so an absurdly large cost still
/// yields a well-formed rejection.
pub fn duration_from_secs(secs: f64) -> Duration {
    if !(secs > 0.0) {
        return Duration::ZERO;
    }
    if secs >= Duration::MAX.as_secs_f64() {
        return Duration::MAX;
    }
    Duration::from_secs_f64(secs)
}

/// Convert fractional epoch seconds back to a `SystemTime`. Out-of-range
/// inputs clamp to the epoch, the same sentinel limiters without a
/// meaningful reset time report.
pub fn system_time_from_secs(secs: f64) -> SystemTime {
    if secs <= 0.0 {
        return UNIX_EPOCH;
    }
    UNIX_EPOCH
        .checked_add(duration_from_secs(secs))
        .unwrap_or(UNIX_EPOCH)
}
