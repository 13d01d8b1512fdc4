//! Redis remote store.

use crate::config::SessionConfig;
use crate::crypto::CryptoEnvelope;
use crate::error::{SessionError, SessionResult};
use crate::remote::RemoteStore;
use crate::store::SessionStore;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sealed_redis::RedisConfig;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Writes the new key and deletes the old one inside a single script run.
const ROTATE_SCRIPT: &str = r#"
redis.call("SET", KEYS[2], ARGV[1], "PX", ARGV[2])
redis.call("DEL", KEYS[1])
return 1
"#;

/// How [`RemoteStore::replace`] is made atomic on Redis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    /// Server-side Lua script (`EVALSHA`, falling back to `EVAL`)
    #[default]
    Script,
    /// `MULTI` / `SET PX` / `DEL` / `EXEC`
    Transaction,
}

/// Redis-backed remote store.
///
/// # Examples
///
/// ```no_run
/// use sealed_session::{RedisRemoteStore, RotationStrategy};
/// use sealed_redis::RedisConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RedisConfig::from_env().build();
/// let remote = RedisRemoteStore::connect(&config)
///     .await?
///     .with_rotation(RotationStrategy::Transaction);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisRemoteStore {
    conn: ConnectionManager,
    command_timeout: Duration,
    rotation: RotationStrategy,
    rotate_script: redis::Script,
}

impl RedisRemoteStore {
    /// Connect using `config`; commands are bounded by its command timeout.
    pub async fn connect(config: &RedisConfig) -> SessionResult<Self> {
        let conn = sealed_redis::connect(config).await?;
        info!(url = %config.url, "Redis session backend ready");
        Ok(Self::from_connection(conn).with_command_timeout(config.command_timeout))
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            command_timeout: Duration::from_secs(5),
            rotation: RotationStrategy::default(),
            rotate_script: redis::Script::new(ROTATE_SCRIPT),
        }
    }

    /// Set the per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Choose the rotation primitive.
    pub fn with_rotation(mut self, rotation: RotationStrategy) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn rotation(&self) -> RotationStrategy {
        self.rotation
    }

    /// Get the underlying connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    async fn bounded<T, F>(&self, command: F) -> SessionResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.command_timeout, command)
            .await
            .map_err(|_| SessionError::Timeout)?
            .map_err(SessionError::from)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl RemoteStore for RedisRemoteStore {
    async fn get(&self, key: &str) -> SessionResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded(async {
            let value: Option<String> = conn.get(key).await?;
            Ok::<_, redis::RedisError>(value)
        })
        .await
    }

    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> SessionResult<()> {
        let mut conn = self.conn.clone();
        let millis = ttl_millis(ttl);
        self.bounded(async {
            let _: () = conn.pset_ex(key, value, millis).await?;
            Ok::<_, redis::RedisError>(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> SessionResult<()> {
        let mut conn = self.conn.clone();
        self.bounded(async {
            let _: () = conn.del(key).await?;
            Ok::<_, redis::RedisError>(())
        })
        .await
    }

    async fn replace(
        &self,
        old_key: &str,
        new_key: &str,
        value: String,
        ttl: Duration,
    ) -> SessionResult<()> {
        let mut conn = self.conn.clone();
        let millis = ttl_millis(ttl);
        debug!(strategy = ?self.rotation, "Rotating session key");

        match self.rotation {
            RotationStrategy::Script => {
                self.bounded(async {
                    let _: i64 = self
                        .rotate_script
                        .key(old_key)
                        .key(new_key)
                        .arg(value)
                        .arg(millis)
                        .invoke_async(&mut conn)
                        .await?;
                    Ok::<_, redis::RedisError>(())
                })
                .await
            }
            RotationStrategy::Transaction => {
                self.bounded(async {
                    let _: () = redis::pipe()
                        .atomic()
                        .pset_ex(new_key, value, millis)
                        .ignore()
                        .del(old_key)
                        .ignore()
                        .query_async(&mut conn)
                        .await?;
                    Ok::<_, redis::RedisError>(())
                })
                .await
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Session store backed by Redis.
pub type RedisSessionStore = SessionStore<RedisRemoteStore>;

impl SessionStore<RedisRemoteStore> {
    /// Connect to Redis and build a session store over it.
    pub async fn connect(
        redis: &RedisConfig,
        envelope: CryptoEnvelope,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        let remote = RedisRemoteStore::connect(redis).await?;
        Self::new(remote, envelope, config)
    }
}
