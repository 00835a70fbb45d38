//! In-memory TTL cache shared by every lookup in the process.
//!
//! Values are stored as `serde_json::Value` so one cache can hold snapshots,
//! calendars and misses side by side. Entries are replaced wholesale on
//! `set`; nothing mutates an entry in place.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Clone, Debug)]
struct CacheEntry {
    value: serde_json::Value,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Entry counts at a point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub live: usize,
    pub expired: usize,
    /// Creation time of the oldest stored entry.
    pub oldest: Option<DateTime<Utc>>,
}

pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            clock,
        }
    }

    pub fn with_system_clock(default_ttl: Duration) -> Self {
        Self::new(default_ttl, Arc::new(SystemClock))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!("Cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!("Cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Returns the cached value for `key` if present and not expired.
    ///
    /// An entry that no longer deserializes into `T` is evicted and reported
    /// as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let value = {
            let entries = self.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if entry.is_expired(now) => None,
                Some(entry) => Some(entry.value.clone()),
            }
        };

        let Some(value) = value else {
            self.evict_if(key, |e| e.is_expired(now));
            debug!("Cache expired: {}", key);
            return None;
        };

        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Cache entry '{}' is corrupt, evicting: {}", key, e);
                self.delete(key);
                None
            }
        }
    }

    /// Stores `value` under `key` with `ttl`, or the default TTL when `None`.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("Refusing to cache '{}': {}", key, e);
                return;
            }
        };
        let now = self.clock.now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.write().insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: now,
                expires_at,
            },
        );
    }

    /// Removes `key`. Returns true if something was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.read();
        let expired = entries.values().filter(|e| e.is_expired(now)).count();
        CacheStats {
            total: entries.len(),
            live: entries.len() - expired,
            expired,
            oldest: entries.values().map(|e| e.created_at).min(),
        }
    }

    fn evict_if(&self, key: &str, predicate: impl Fn(&CacheEntry) -> bool) {
        let mut entries = self.write();
        if entries.get(key).is_some_and(predicate) {
            entries.remove(key);
        }
    }
}
