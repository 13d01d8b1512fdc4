//! In-memory remote store.
//!
//! A single mutex guards the whole map so `replace` is atomic with respect
//! to every other operation. Expired entries are dropped when read, and
//! every `CLEANUP_INTERVAL` writes sweep the whole map so entries nobody
//! reads again do not accumulate.

use crate::error::SessionResult;
use crate::remote::RemoteStore;
use crate::state::{add_duration, now};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// Writes between two full sweeps of expired entries.
const CLEANUP_INTERVAL: usize = 64;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_live(&self, at: DateTime<Utc>) -> bool {
        at < self.expires_at
    }
}

/// In-memory remote store
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    entries: Mutex<HashMap<String, Entry>>,
    writes: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired entries.
    pub fn len(&self) -> usize {
        let at = now();
        self.entries.lock().values().filter(|e| e.is_live(at)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an unexpired entry exists under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        let at = now();
        self.entries
            .lock()
            .get(key)
            .is_some_and(|e| e.is_live(at))
    }

    /// Overwrite the raw stored text, keeping the entry's expiry.
    ///
    /// Simulates a store owner tampering with data; returns false if absent.
    pub fn overwrite_raw(&self, key: &str, value: impl Into<String>) -> bool {
        match self.entries.lock().get_mut(key) {
            Some(entry) => {
                entry.value = value.into();
                true
            }
            None => false,
        }
    }

    /// Raw stored text under `key`, ignoring expiry.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).map(|e| e.value.clone())
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let at = now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(at));
        let removed = before - entries.len();

        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Cleaned up expired entries");
        }
        removed
    }

    fn record_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % CLEANUP_INTERVAL == 0 {
            self.cleanup_expired();
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, key: &str) -> SessionResult<Option<String>> {
        let at = now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if entry.is_live(at) => Ok(Some(entry.value.clone())),
            Some(_) => {
                trace!("Dropping expired entry");
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> SessionResult<()> {
        let expires_at = add_duration(now(), ttl);
        self.entries
            .lock()
            .insert(key.to_string(), Entry { value, expires_at });
        self.record_write();
        Ok(())
    }

    async fn delete(&self, key: &str) -> SessionResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn replace(
        &self,
        old_key: &str,
        new_key: &str,
        value: String,
        ttl: Duration,
    ) -> SessionResult<()> {
        let expires_at = add_duration(now(), ttl);
        {
            let mut entries = self.entries.lock();
            entries.insert(new_key.to_string(), Entry { value, expires_at });
            if old_key != new_key {
                entries.remove(old_key);
            }
        }
        self.record_write();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
