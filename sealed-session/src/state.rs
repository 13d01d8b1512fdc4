//! In-memory session state.

use crate::error::{SessionError, SessionResult};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// The clock every expiry decision in this crate reads.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// `at + duration`, saturating instead of overflowing.
pub(crate) fn add_duration(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
    at.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Time left until `expires_at`, or `None` once it has passed.
pub(crate) fn remaining_until(expires_at: DateTime<Utc>) -> Option<Duration> {
    (expires_at - now()).to_std().ok().filter(|d| !d.is_zero())
}

/// Persisted form of a session: everything except the transient `is_new` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier
    pub id: String,
    /// Logical session name (cookie name)
    pub name: String,
    /// Session data as key-value pairs
    #[serde(default)]
    pub values: HashMap<String, serde_json::Value>,
    /// Session creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
    /// Session expiration timestamp
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Inner {
    record: SessionRecord,
    is_new: bool,
}

/// One session's identity, data and timestamps.
///
/// Every method takes `&self`; a single reader/writer lock guards the whole
/// state, so a `SessionState` can be shared across tasks as
/// `Arc<SessionState>`. A `set` that has returned is visible to every later
/// `get` on the same instance.
///
/// Remote lifecycle operations (`persist`, `rotate_id`, `destroy`) on one
/// instance run one at a time, so a persist that started before a rotation
/// cannot write the old identifier back after it.
#[derive(Debug)]
pub struct SessionState {
    inner: RwLock<Inner>,
    lifecycle: Mutex<()>,
}

impl SessionState {
    /// Create a session that has not been stored yet.
    pub fn new(id: impl Into<String>, name: impl Into<String>, ttl: Duration) -> Self {
        let now = now();
        Self {
            inner: RwLock::new(Inner {
                record: SessionRecord {
                    id: id.into(),
                    name: name.into(),
                    values: HashMap::new(),
                    created_at: now,
                    updated_at: now,
                    expires_at: add_duration(now, ttl),
                },
                is_new: true,
            }),
            lifecycle: Mutex::new(()),
        }
    }

    /// Rebuild a session loaded from the remote store.
    pub fn from_record(record: SessionRecord) -> Self {
        Self {
            inner: RwLock::new(Inner {
                record,
                is_new: false,
            }),
            lifecycle: Mutex::new(()),
        }
    }

    /// Snapshot of the persistable state.
    pub fn to_record(&self) -> SessionRecord {
        self.inner.read().record.clone()
    }

    pub fn id(&self) -> String {
        self.inner.read().record.id.clone()
    }

    pub fn name(&self) -> String {
        self.inner.read().record.name.clone()
    }

    /// True until the session has been found in the remote store.
    pub fn is_new(&self) -> bool {
        self.inner.read().is_new
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.read().record.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.inner.read().record.updated_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.inner.read().record.expires_at
    }

    /// A session is usable iff `now < expires_at`.
    pub fn is_expired(&self) -> bool {
        now() >= self.expires_at()
    }

    /// Remaining lifetime, `None` once expired.
    pub fn remaining_ttl(&self) -> Option<Duration> {
        remaining_until(self.expires_at())
    }

    /// Get a value from the session data.
    ///
    /// Returns `None` when the key is absent or holds a value of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key)?;
        serde_json::from_value(value).ok()
    }

    /// Get the raw stored value.
    pub fn get_value(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().record.values.get(key).cloned()
    }

    /// Set a value in the session data.
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: T) -> SessionResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;

        let mut inner = self.inner.write();
        inner.record.values.insert(key.into(), value);
        inner.record.updated_at = now();
        Ok(())
    }

    /// Remove a value, returning it if it was present.
    pub fn delete(&self, key: &str) -> Option<serde_json::Value> {
        let mut inner = self.inner.write();
        inner.record.updated_at = now();
        inner.record.values.remove(key)
    }

    /// Check if a key exists in the session data.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().record.values.contains_key(key)
    }

    /// Get all keys in the session data.
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().record.values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().record.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().record.values.is_empty()
    }

    /// Clear all session data.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.record.values.clear();
        inner.record.updated_at = now();
    }

    /// Reset the expiry to `now + ttl`.
    pub fn refresh(&self, ttl: Duration) {
        let now = now();
        let mut inner = self.inner.write();
        inner.record.expires_at = add_duration(now, ttl);
        inner.record.updated_at = now;
    }

    /// Push the current expiry back by `delta`.
    pub fn extend(&self, delta: Duration) {
        let mut inner = self.inner.write();
        inner.record.expires_at = add_duration(inner.record.expires_at, delta);
        inner.record.updated_at = now();
    }

    pub(crate) fn set_id(&self, id: String) {
        self.inner.write().record.id = id;
    }

    /// Held across the remote call of every lifecycle operation.
    pub(crate) async fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }
}
