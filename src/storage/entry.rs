//! Embedded cache entry

use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;

/// Value plus optional absolute expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: Bytes,
    /// `None` = never expires
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    /// A zero `ttl` means the entry never expires
    pub fn new(value: Bytes, ttl: Duration) -> Self {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        Self { value, expires_at }
    }

    /// Visible only while `now` is strictly before the expiry
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}
