//! Conversions between `Duration` TTLs and memcached `exptime` fields
//!
//! Exptime rules (memcached-compatible):
//! - 0 = never expire
//! - <= 2592000 (30 days) = relative seconds from now
//! - > 2592000 = absolute Unix timestamp

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Maximum relative exptime value (30 days in seconds)
pub const MAX_RELATIVE_EXPTIME: u64 = 2_592_000;

/// Encode a TTL for the wire.
///
/// Sub-second remainders round up so a non-zero TTL never turns into "never expire".
pub fn exptime_from_ttl(ttl: Duration) -> u64 {
    if ttl.is_zero() {
        return 0;
    }
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    if secs <= MAX_RELATIVE_EXPTIME {
        secs
    } else {
        current_timestamp() + secs
    }
}

/// Decode a wire exptime into a TTL.
///
/// `Some(Duration::ZERO)` means no expiration; `None` means the absolute time has
/// already passed and the item should not be stored.
pub fn ttl_from_exptime(exptime: u64) -> Option<Duration> {
    if exptime <= MAX_RELATIVE_EXPTIME {
        return Some(Duration::from_secs(exptime));
    }
    let now = current_timestamp();
    (exptime > now).then(|| Duration::from_secs(exptime - now))
}

/// Get the current Unix timestamp
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
