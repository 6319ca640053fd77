//! Wall-clock source for legacy session expiry.

use time::OffsetDateTime;

/// Legacy sessions live for 24 hours.
pub const LEGACY_SESSION_TTL_MS: i64 = 24 * 60 * 60 * 1000;

pub trait Clock: Send + Sync {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_ms(&self) -> i64 {
        (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
    }
}
