//! Encrypted, signed server-side sessions.
//!
//! A client only ever holds an opaque identifier (usually in a cookie). The
//! session's data lives in a remote store under that identifier, sealed with
//! an AEAD cipher and optionally signed with HMAC-SHA256, so whoever operates
//! the store can neither read nor silently alter it.
//!
//! # Features
//!
//! - `redis` - Redis remote store (enabled by default)
//!
//! # Components
//!
//! - [`SessionState`] - one session's data and timestamps behind a single lock
//! - [`CryptoEnvelope`] - value ⇄ `base64(signature ‖ nonce ‖ ciphertext ‖ tag)`
//! - [`SessionStore`] - resolve / create / persist / rotate / destroy
//! - [`RemoteStore`] - what a backend must provide, with
//!   [`MemoryRemoteStore`] and (feature `redis`) `RedisRemoteStore`
//!
//! # Examples
//!
//! ## Redis Session Store (Default)
//!
//! ```no_run
//! use sealed_session::*;
//! use sealed_redis::RedisConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let cipher = Cipher::aes_gcm(&generate_key(32))?;
//!     let envelope = CryptoEnvelope::new(cipher, Some(generate_key(32).as_slice()))?;
//!     let config = SessionConfig::default()
//!         .with_key_prefix("myapp:")
//!         .with_default_ttl(Duration::from_secs(3600));
//!
//!     let store = RedisSessionStore::connect(&RedisConfig::from_env().build(), envelope, config).await?;
//!
//!     // Incoming cookie value, if any
//!     let session = store.resolve(None, "sid").await?;
//!     session.set("user_id", 123)?;
//!     store.persist(&session).await?;
//!
//!     // After login: move to a new identifier
//!     store.rotate_id(&session).await?;
//!     let set_cookie = store.cookie_for(&session).to_header_value();
//!     println!("Set-Cookie: {}", set_cookie);
//!
//!     // Logout
//!     store.destroy(&session).await?;
//!     let _clear = store.removal_cookie("sid");
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cookie;
pub mod crypto;
pub mod error;
pub mod remote;
pub mod state;
pub mod store;

pub use config::SessionConfig;
pub use cookie::{CookieOptions, SameSite, SessionCookie};
pub use crypto::{
    Cipher, CryptoEnvelope, generate_key, generate_session_id, is_valid_session_id,
};
pub use error::{SessionError, SessionResult};
pub use remote::{MemoryRemoteStore, RemoteStore};
pub use state::{SessionRecord, SessionState};
pub use store::SessionStore;

#[cfg(feature = "redis")]
pub use remote::{RedisRemoteStore, RedisSessionStore, RotationStrategy};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::SessionConfig;
    pub use crate::cookie::{CookieOptions, SameSite, SessionCookie};
    pub use crate::crypto::{Cipher, CryptoEnvelope, generate_key, generate_session_id};
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::remote::{MemoryRemoteStore, RemoteStore};
    pub use crate::state::SessionState;
    pub use crate::store::SessionStore;

    #[cfg(feature = "redis")]
    pub use crate::remote::{RedisRemoteStore, RedisSessionStore, RotationStrategy};
}
