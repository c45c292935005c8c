//! Process clock and nanosecond timestamp formatting.
//!
//! `now_in_nano` combines a wall-clock anchor captured once per process
//! with the monotonic clock, so consecutive reads never go backwards while
//! values stay aligned to the system epoch.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chrono::{Local, LocalResult, TimeZone};
use lazy_static::lazy_static;

use crate::util::hash::hash_str_32;

pub const NANOSECONDS_PER_MILLISECOND: i64 = 1_000_000;
pub const NANOSECONDS_PER_SECOND: i64 = 1000 * NANOSECONDS_PER_MILLISECOND;
pub const NANOSECONDS_PER_MINUTE: i64 = 60 * NANOSECONDS_PER_SECOND;
pub const NANOSECONDS_PER_HOUR: i64 = 60 * NANOSECONDS_PER_MINUTE;
pub const NANOSECONDS_PER_DAY: i64 = 24 * NANOSECONDS_PER_HOUR;

/// Default `strftime` format; `%N` expands to nine-digit nanoseconds
pub const DEFAULT_FORMAT: &str = "%F %T.%N";

struct ClockAnchor {
    wall_nano: i64,
    mono: Instant,
}

lazy_static! {
    static ref ANCHOR: ClockAnchor = ClockAnchor {
        wall_nano: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0),
        mono: Instant::now(),
    };
}

/// Monotonic nanoseconds aligned to the system epoch at process start.
pub fn now_in_nano() -> i64 {
    ANCHOR.wall_nano + ANCHOR.mono.elapsed().as_nanos() as i64
}

/// Stable 32-bit hash of a nanosecond timestamp.
pub fn nano_hashed(nano: i64) -> u32 {
    hash_str_32(&nano.to_string(), 0)
}

/// Format a nanosecond timestamp in local time.
///
/// `i64::MAX` renders as `"end of world"`; zero renders with every digit
/// replaced by `'0'` and negative values with every digit replaced by `'#'`.
pub fn strftime(nano: i64, format: &str) -> String {
    if nano == i64::MAX {
        return "end of world".to_string();
    }

    let clamped = nano.max(0);
    let secs = clamped / NANOSECONDS_PER_SECOND;
    let subsec = (clamped % NANOSECONDS_PER_SECOND) as u32;

    let expanded = if format.contains("%N") {
        format.replace("%N", &format!("{:09}", subsec))
    } else {
        format.to_string()
    };

    let rendered = match Local.timestamp_opt(secs, subsec) {
        LocalResult::Single(datetime) => datetime.format(&expanded).to_string(),
        _ => expanded,
    };

    if nano > 0 {
        rendered
    } else if nano == 0 {
        rendered
            .chars()
            .map(|c| if c.is_ascii_digit() { '0' } else { c })
            .collect()
    } else {
        rendered
            .chars()
            .map(|c| if c.is_ascii_digit() { '#' } else { c })
            .collect()
    }
}
