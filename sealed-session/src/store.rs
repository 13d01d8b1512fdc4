//! Session lifecycle on top of a remote store.

use crate::config::SessionConfig;
use crate::cookie::SessionCookie;
use crate::crypto::{CryptoEnvelope, generate_session_id, is_valid_session_id};
use crate::error::{SessionError, SessionResult};
use crate::remote::RemoteStore;
use crate::state::{SessionRecord, SessionState, now, remaining_until};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Resolves, creates, persists, rotates and destroys sessions.
///
/// Each session lives in the remote store under
/// `<key_prefix><name>:<id>` as a sealed envelope whose associated data is
/// the session name. The store handle is meant to be passed explicitly to
/// whatever needs it; clones share the same connection and keys.
///
/// # Examples
///
/// ```
/// use sealed_session::*;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), SessionError> {
/// let cipher = Cipher::aes_gcm(&generate_key(32))?;
/// let envelope = CryptoEnvelope::new(cipher, Some(generate_key(32).as_slice()))?;
/// let store = SessionStore::new(MemoryRemoteStore::new(), envelope, SessionConfig::default())?;
///
/// let session = store.create("sid", Some(Duration::from_secs(3600)));
/// session.set("user", "alice")?;
/// store.persist(&session).await?;
///
/// let id = session.id();
/// let again = store.resolve(Some(&id), "sid").await?;
/// assert_eq!(again.get::<String>("user").as_deref(), Some("alice"));
/// assert!(!again.is_new());
/// # Ok(())
/// # }
/// ```
pub struct SessionStore<R> {
    remote: Arc<R>,
    envelope: Arc<CryptoEnvelope>,
    config: SessionConfig,
}

impl<R> Clone for SessionStore<R> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            envelope: Arc::clone(&self.envelope),
            config: self.config.clone(),
        }
    }
}

fn id_prefix(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Remaining lifetime worth writing: at least one millisecond.
fn writable_ttl(expires_at: DateTime<Utc>) -> SessionResult<Duration> {
    remaining_until(expires_at)
        .filter(|ttl| ttl.as_millis() > 0)
        .ok_or(SessionError::Expired)
}

impl<R: RemoteStore> SessionStore<R> {
    /// Create a store over `remote`.
    pub fn new(remote: R, envelope: CryptoEnvelope, config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;
        debug!(
            backend = remote.backend_name(),
            cipher = envelope.cipher().algorithm(),
            signed = envelope.is_signed(),
            "Session store initialized"
        );

        Ok(Self {
            remote: Arc::new(remote),
            envelope: Arc::new(envelope),
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn envelope(&self) -> &CryptoEnvelope {
        &self.envelope
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Remote key for a session.
    pub fn session_key(&self, name: &str, session_id: &str) -> String {
        self.config.session_key(name, session_id)
    }

    /// Find the session behind `incoming_id`, or start a new one.
    ///
    /// Any content problem (no entry, expired, tampered, undecodable,
    /// malformed identifier) yields a fresh session with `is_new() == true`.
    /// Errors from the remote store itself are returned.
    pub async fn resolve(&self, incoming_id: Option<&str>, name: &str) -> SessionResult<SessionState> {
        if let Some(id) = incoming_id.filter(|id| !id.is_empty()) {
            match self.load(name, id).await {
                Ok(session) => return Ok(session),
                Err(e) if e.is_content_error() => {
                    debug!(
                        session_name = %name,
                        session_id = %id_prefix(id),
                        reason = %e,
                        "No usable session, starting a new one"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(self.create(name, None))
    }

    /// Load an existing session, surfacing why it is unusable.
    ///
    /// An expired entry is deleted before [`SessionError::Expired`] is returned.
    pub async fn load(&self, name: &str, session_id: &str) -> SessionResult<SessionState> {
        if !is_valid_session_id(session_id) {
            return Err(SessionError::InvalidSessionId);
        }

        let key = self.session_key(name, session_id);
        let text = self.remote.get(&key).await?.ok_or(SessionError::NotFound)?;

        let record: SessionRecord = self.envelope.decrypt_and_verify(&text, name.as_bytes())?;

        // A valid blob copied under another key must not authenticate there.
        if record.id != session_id || record.name != name {
            warn!(session_name = %name, "Session record does not match its key");
            return Err(SessionError::InvalidData);
        }

        if now() >= record.expires_at {
            trace!(session_name = %name, session_id = %id_prefix(session_id), "Removing expired session");
            self.remote.delete(&key).await?;
            return Err(SessionError::Expired);
        }

        Ok(SessionState::from_record(record))
    }

    /// Start a new, unsaved session. `ttl` is clamped to `max_ttl`.
    pub fn create(&self, name: &str, ttl: Option<Duration>) -> SessionState {
        let ttl = self.config.effective_ttl(ttl);
        SessionState::new(generate_session_id(), name, ttl)
    }

    /// Write the session with a store-side expiry equal to its remaining lifetime.
    ///
    /// Lifecycle calls on one `SessionState` run one at a time; persists from
    /// separate copies of a session (other processes) are last-writer-wins.
    pub async fn persist(&self, session: &SessionState) -> SessionResult<()> {
        let _guard = session.lock_lifecycle().await;
        let record = session.to_record();
        let ttl = writable_ttl(record.expires_at)?;

        let text = self
            .envelope
            .encrypt_and_sign(&record, record.name.as_bytes())?;
        let key = self.session_key(&record.name, &record.id);

        self.remote.set_with_expiry(&key, text, ttl).await?;

        debug!(
            session_name = %record.name,
            session_id = %id_prefix(&record.id),
            ttl_ms = ttl.as_millis() as u64,
            "Session persisted"
        );
        Ok(())
    }

    /// Move the session to a fresh identifier in one atomic remote operation.
    ///
    /// The old identifier stops working as the new one starts. `session`
    /// only takes the new identifier after the remote write succeeded.
    pub async fn rotate_id(&self, session: &SessionState) -> SessionResult<()> {
        let _guard = session.lock_lifecycle().await;
        let mut record = session.to_record();
        let ttl = writable_ttl(record.expires_at)?;

        let old_id = std::mem::replace(&mut record.id, generate_session_id());
        let old_key = self.session_key(&record.name, &old_id);
        let new_key = self.session_key(&record.name, &record.id);

        let text = self
            .envelope
            .encrypt_and_sign(&record, record.name.as_bytes())?;

        self.remote.replace(&old_key, &new_key, text, ttl).await?;

        debug!(
            session_name = %record.name,
            old_id = %id_prefix(&old_id),
            new_id = %id_prefix(&record.id),
            "Session identifier rotated"
        );
        session.set_id(record.id);
        Ok(())
    }

    /// Delete the session's remote entry. Safe to call more than once.
    pub async fn destroy(&self, session: &SessionState) -> SessionResult<()> {
        let _guard = session.lock_lifecycle().await;
        let key = self.session_key(&session.name(), &session.id());
        self.remote.delete(&key).await?;
        debug!(session_name = %session.name(), "Session destroyed");
        Ok(())
    }

    /// Cookie carrying the session identifier until it expires.
    pub fn cookie_for(&self, session: &SessionState) -> SessionCookie {
        let record = session.to_record();
        let max_age = remaining_until(record.expires_at)
            .map(|ttl| ttl.as_secs() as i64)
            .unwrap_or(0);
        self.config
            .cookie
            .cookie(record.name, record.id, record.expires_at, max_age)
    }

    /// Cookie that makes the client forget session `name`.
    pub fn removal_cookie(&self, name: &str) -> SessionCookie {
        self.config.cookie.removal(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Cipher, generate_key};
    use crate::remote::MemoryRemoteStore;
    use async_trait::async_trait;

    fn envelope() -> CryptoEnvelope {
        let cipher = Cipher::aes_gcm(&generate_key(32)).unwrap();
        CryptoEnvelope::new(cipher, Some(generate_key(32).as_slice())).unwrap()
    }

    fn store() -> SessionStore<MemoryRemoteStore> {
        SessionStore::new(MemoryRemoteStore::new(), envelope(), SessionConfig::default()).unwrap()
    }

    /// Remote store whose connection is always down.
    struct DownStore;

    #[async_trait]
    impl RemoteStore for DownStore {
        async fn get(&self, _key: &str) -> SessionResult<Option<String>> {
            Err(SessionError::Connection("connection refused".to_string()))
        }

        async fn set_with_expiry(&self, _key: &str, _value: String, _ttl: Duration) -> SessionResult<()> {
            Err(SessionError::Connection("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> SessionResult<()> {
            Err(SessionError::Connection("connection refused".to_string()))
        }

        async fn replace(&self, _old: &str, _new: &str, _value: String, _ttl: Duration) -> SessionResult<()> {
            Err(SessionError::Connection("connection refused".to_string()))
        }

        fn backend_name(&self) -> &'static str {
            "down"
        }
    }

    #[tokio::test]
    async fn test_create_is_new_and_unsaved() {
        let store = store();
        let session = store.create("sid", Some(Duration::from_secs(60)));

        assert!(session.is_new());
        assert_eq!(session.name(), "sid");
        assert!(is_valid_session_id(&session.id()));
        assert!(store.remote().is_empty());
    }

    #[tokio::test]
    async fn test_create_clamps_ttl() {
        let config = SessionConfig::default()
            .with_default_ttl(Duration::from_secs(60))
            .with_max_ttl(Duration::from_secs(120));
        let store = SessionStore::new(MemoryRemoteStore::new(), envelope(), config).unwrap();

        let session = store.create("sid", Some(Duration::from_secs(86400)));
        assert!(session.remaining_ttl().unwrap() <= Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_persist_then_resolve() {
        let store = store();
        let session = store.create("sid", Some(Duration::from_secs(3600)));
        session.set("user", "alice").unwrap();
        store.persist(&session).await.unwrap();

        let key = store.session_key("sid", &session.id());
        assert!(store.remote().contains_key(&key));

        let loaded = store.resolve(Some(&session.id()), "sid").await.unwrap();
        assert!(!loaded.is_new());
        assert_eq!(loaded.id(), session.id());
        assert_eq!(loaded.get::<String>("user").as_deref(), Some("alice"));
        assert_eq!(loaded.expires_at(), session.expires_at());
    }

    #[tokio::test]
    async fn test_resolve_without_id_creates() {
        let store = store();
        let session = store.resolve(None, "sid").await.unwrap();
        assert!(session.is_new());

        let session = store.resolve(Some(""), "sid").await.unwrap();
        assert!(session.is_new());
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_creates_fresh() {
        let store = store();
        let unknown = generate_session_id();

        let session = store.resolve(Some(&unknown), "sid").await.unwrap();
        assert!(session.is_new());
        assert_ne!(session.id(), unknown);
        assert!(matches!(store.load("sid", &unknown).await, Err(SessionError::NotFound)));
    }

    #[tokio::test]
    async fn test_malformed_id_never_reaches_remote() {
        let store = SessionStore::new(DownStore, envelope(), SessionConfig::default()).unwrap();

        // The down store would error if it were contacted.
        let session = store.resolve(Some("../../etc:passwd"), "sid").await.unwrap();
        assert!(session.is_new());
    }

    #[tokio::test]
    async fn test_name_is_bound() {
        let store = store();
        let session = store.create("sid", Some(Duration::from_secs(60)));
        store.persist(&session).await.unwrap();

        // Same blob moved under another name fails AEAD.
        let text = store.remote().raw(&store.session_key("sid", &session.id())).unwrap();
        store
            .remote()
            .set_with_expiry(&store.session_key("other", &session.id()), text, Duration::from_secs(60))
            .await
            .unwrap();

        let err = store.load("other", &session.id()).await.unwrap_err();
        assert!(matches!(err, SessionError::EncryptionFailed));

        let resolved = store.resolve(Some(&session.id()), "other").await.unwrap();
        assert!(resolved.is_new());
    }

    #[tokio::test]
    async fn test_blob_copied_to_other_id_is_rejected() {
        let store = store();
        let victim = store.create("sid", Some(Duration::from_secs(60)));
        victim.set("role", "admin").unwrap();
        store.persist(&victim).await.unwrap();

        let text = store.remote().raw(&store.session_key("sid", &victim.id())).unwrap();
        let forged_id = generate_session_id();
        store
            .remote()
            .set_with_expiry(&store.session_key("sid", &forged_id), text, Duration::from_secs(60))
            .await
            .unwrap();

        let err = store.load("sid", &forged_id).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidData));
    }

    #[tokio::test]
    async fn test_tampered_blob_yields_new_session() {
        let store = store();
        let session = store.create("sid", Some(Duration::from_secs(60)));
        session.set("user", "alice").unwrap();
        store.persist(&session).await.unwrap();

        let key = store.session_key("sid", &session.id());
        let mut text = store.remote().raw(&key).unwrap();
        let last = text.pop().unwrap();
        text.push(if last == 'A' { 'B' } else { 'A' });
        store.remote().overwrite_raw(&key, text);

        let resolved = store.resolve(Some(&session.id()), "sid").await.unwrap();
        assert!(resolved.is_new());
        assert_eq!(resolved.get::<String>("user"), None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_cleaned_up() {
        let store = store();
        let session = store.create("sid", Some(Duration::from_secs(60)));
        store.persist(&session).await.unwrap();

        // Rewrite the stored record so it expired in the past while the
        // remote entry itself is still live.
        let mut record = session.to_record();
        record.expires_at = now() - chrono::TimeDelta::seconds(1);
        let text = store.envelope().encrypt_and_sign(&record, b"sid").unwrap();
        let key = store.session_key("sid", &session.id());
        store.remote().overwrite_raw(&key, text);

        let err = store.load("sid", &session.id()).await.unwrap_err();
        assert!(matches!(err, SessionError::Expired));
        assert!(!store.remote().contains_key(&key));
    }

    #[tokio::test]
    async fn test_persist_expired_session_fails() {
        let store = store();
        let session = SessionState::new(generate_session_id(), "sid", Duration::ZERO);

        let err = store.persist(&session).await.unwrap_err();
        assert!(matches!(err, SessionError::Expired));
        assert!(store.remote().is_empty());
    }

    #[tokio::test]
    async fn test_rotate_id_moves_entry() {
        let store = store();
        let session = store.create("sid", Some(Duration::from_secs(600)));
        session.set("user", "alice").unwrap();
        store.persist(&session).await.unwrap();
        let old_id = session.id();

        store.rotate_id(&session).await.unwrap();
        let new_id = session.id();
        assert_ne!(old_id, new_id);
        assert!(is_valid_session_id(&new_id));

        assert!(!store.remote().contains_key(&store.session_key("sid", &old_id)));
        assert_eq!(store.remote().len(), 1);

        let loaded = store.load("sid", &new_id).await.unwrap();
        assert_eq!(loaded.get::<String>("user").as_deref(), Some("alice"));
        assert_eq!(loaded.expires_at(), session.expires_at());

        let stale = store.resolve(Some(&old_id), "sid").await.unwrap();
        assert!(stale.is_new());
    }

    #[tokio::test]
    async fn test_rotate_expired_session_leaves_everything_alone() {
        let store = store();
        let session = SessionState::new(generate_session_id(), "sid", Duration::ZERO);
        let id = session.id();

        let err = store.rotate_id(&session).await.unwrap_err();
        assert!(matches!(err, SessionError::Expired));
        assert_eq!(session.id(), id);
    }

    #[tokio::test]
    async fn test_failed_rotation_keeps_old_id() {
        let store = SessionStore::new(DownStore, envelope(), SessionConfig::default()).unwrap();
        let session = store.create("sid", Some(Duration::from_secs(60)));
        let id = session.id();

        let err = store.rotate_id(&session).await.unwrap_err();
        assert!(err.is_infrastructure_error());
        assert_eq!(session.id(), id);
    }

    /// Memory store whose plain writes take a while to land.
    struct SlowWrites {
        inner: MemoryRemoteStore,
        delay: Duration,
    }

    #[async_trait]
    impl RemoteStore for SlowWrites {
        async fn get(&self, key: &str) -> SessionResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> SessionResult<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.set_with_expiry(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> SessionResult<()> {
            self.inner.delete(key).await
        }

        async fn replace(&self, old: &str, new: &str, value: String, ttl: Duration) -> SessionResult<()> {
            self.inner.replace(old, new, value, ttl).await
        }

        fn backend_name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_in_flight_persist_cannot_revive_rotated_id() {
        let remote = SlowWrites {
            inner: MemoryRemoteStore::new(),
            delay: Duration::from_millis(50),
        };
        let store = SessionStore::new(remote, envelope(), SessionConfig::default()).unwrap();
        let session = Arc::new(store.create("sid", Some(Duration::from_secs(600))));
        session.set("user", "alice").unwrap();
        let old_id = session.id();

        let persist = {
            let store = store.clone();
            let session = Arc::clone(&session);
            tokio::spawn(async move { store.persist(&session).await })
        };

        // Let the persist start its slow write first.
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.rotate_id(&session).await.unwrap();
        persist.await.unwrap().unwrap();

        let new_id = session.id();
        assert_ne!(new_id, old_id);
        assert!(matches!(store.load("sid", &old_id).await, Err(SessionError::NotFound)));

        let loaded = store.load("sid", &new_id).await.unwrap();
        assert_eq!(loaded.get::<String>("user").as_deref(), Some("alice"));
        assert_eq!(store.remote().inner.len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let store = store();
        let session = store.create("sid", Some(Duration::from_secs(60)));
        store.persist(&session).await.unwrap();

        store.destroy(&session).await.unwrap();
        store.destroy(&session).await.unwrap();
        assert!(store.remote().is_empty());

        let resolved = store.resolve(Some(&session.id()), "sid").await.unwrap();
        assert!(resolved.is_new());
    }

    #[tokio::test]
    async fn test_infrastructure_errors_propagate() {
        let store = SessionStore::new(DownStore, envelope(), SessionConfig::default()).unwrap();
        let id = generate_session_id();

        let err = store.resolve(Some(&id), "sid").await.unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));

        let session = store.create("sid", None);
        assert!(store.persist(&session).await.is_err());
        assert!(store.destroy(&session).await.is_err());
    }

    #[tokio::test]
    async fn test_cookies() {
        let store = store();
        let session = store.create("sid", Some(Duration::from_secs(3600)));

        let cookie = store.cookie_for(&session);
        assert_eq!(cookie.name, "sid");
        assert_eq!(cookie.value, session.id());
        assert_eq!(cookie.expires, session.expires_at());
        assert!(cookie.max_age > 3590 && cookie.max_age <= 3600);

        let removal = store.removal_cookie("sid");
        assert!(removal.is_removal());
        assert!(removal.value.is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SessionConfig::default().with_max_ttl(Duration::ZERO);
        assert!(SessionStore::new(MemoryRemoteStore::new(), envelope(), config).is_err());
    }
}
