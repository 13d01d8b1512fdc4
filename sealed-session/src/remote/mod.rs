//! Remote key/value stores that hold sealed session blobs.
//!
//! - **Memory**: in-process map, for tests and single-instance deployments
//! - **Redis**: the shared store for multi-instance deployments

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::MemoryRemoteStore;
#[cfg(feature = "redis")]
pub use redis_store::{RedisRemoteStore, RedisSessionStore, RotationStrategy};

use crate::error::SessionResult;
use async_trait::async_trait;
use std::time::Duration;

/// What the session store needs from a key/value backend.
///
/// Implementations perform no retries; infrastructure errors go back to the
/// caller as they are.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the value under `key`, `None` when absent or expired.
    async fn get(&self, key: &str) -> SessionResult<Option<String>>;

    /// Unconditionally write `value` under `key`, expiring after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> SessionResult<()>;

    /// Delete `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> SessionResult<()>;

    /// Write `value` under `new_key` (expiring after `ttl`) and delete
    /// `old_key` as one indivisible operation.
    ///
    /// No observer may see neither key, and `old_key` must be gone once this
    /// returns `Ok`.
    async fn replace(
        &self,
        old_key: &str,
        new_key: &str,
        value: String,
        ttl: Duration,
    ) -> SessionResult<()>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}
