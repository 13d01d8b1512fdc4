// Sealed Sessions - encrypted, signed server-side sessions for Rust
//
// This library keeps session data in a remote store, sealed with an AEAD
// cipher, and hands clients nothing but an opaque identifier.

// Re-export session functionality
pub use sealed_session::*;

// Re-export optional crates
#[cfg(feature = "redis")]
pub use sealed_redis;

#[cfg(feature = "redis")]
pub use sealed_redis::{RedisConfig, RedisConfigBuilder, RedisError};

// Prelude for common imports
pub mod prelude {
    pub use sealed_session::prelude::*;

    #[cfg(feature = "redis")]
    pub use sealed_redis::RedisConfig;
}
