//! In-process cache: a key -> entry map behind a reader-writer lock, with lazy
//! expiry on read and a periodic background sweep.

use crate::StorageError;
use crate::storage::Storage;
use crate::storage::entry::CacheEntry;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Entries removed by the background sweep
pub static SWEEP_EVICTED: AtomicU64 = AtomicU64::new(0);

type Entries = RwLock<HashMap<String, CacheEntry>>;

struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Embedded `Storage` backend
pub struct EmbeddedCache {
    entries: Arc<Entries>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl EmbeddedCache {
    /// Create the cache and start its sweep task. Must be called within a Tokio runtime.
    pub fn new(sweep_interval: Duration) -> Self {
        let entries = Arc::new(RwLock::new(HashMap::new()));
        let cancel = CancellationToken::new();
        // interval() rejects a zero period
        let period = sweep_interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(sweep(Arc::downgrade(&entries), period, cancel.clone()));

        Self {
            entries,
            sweeper: Mutex::new(Some(Sweeper { cancel, handle })),
        }
    }

    /// Current value, if present and not expired
    pub fn lookup(&self, key: &str) -> Option<Bytes> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    /// Insert or replace; a zero `ttl` never expires
    pub fn insert(&self, key: &str, value: Bytes, ttl: Duration) {
        let entry = CacheEntry::new(value, ttl);
        self.entries.write().insert(key.to_owned(), entry);
    }

    pub fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Entries held, including expired ones the sweep has not reached yet
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run one sweep pass now, returning how many entries were removed
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries)
    }

    /// Stop the sweep task and wait for it to finish. Idempotent.
    ///
    /// The map stays usable afterwards; expired entries are then only hidden on
    /// read, never removed.
    pub async fn stop(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(Sweeper { cancel, handle }) = sweeper {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!("Sweep task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for EmbeddedCache {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.cancel.cancel();
        }
    }
}

#[async_trait]
impl Storage for EmbeddedCache {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        Ok(self.lookup(key))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StorageError> {
        self.insert(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.remove(key);
        Ok(())
    }

    async fn shutdown(&self) {
        self.stop().await;
    }
}

async fn sweep(entries: Weak<Entries>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                let removed = purge(&entries);
                if removed > 0 {
                    debug!(removed, "Sweep evicted expired entries");
                }
            }
        }
    }

    debug!("Expiry sweep stopped");
}

fn purge(entries: &Entries) -> usize {
    let now = Instant::now();
    let mut map = entries.write();
    let before = map.len();
    map.retain(|_, entry| !entry.is_expired_at(now));
    let removed = before - map.len();
    SWEEP_EVICTED.fetch_add(removed as u64, Ordering::Relaxed);
    removed
}
