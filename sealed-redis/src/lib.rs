//! # Sealed Redis
//!
//! Redis connection configuration for the sealed session store.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sealed_redis::{RedisConfig, connect};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::from_env()
//!         .connection_name("sessions")
//!         .build();
//!
//!     let conn = connect(&config).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod error;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use connection::connect;
pub use error::{RedisError, Result};

// Re-export redis crate for convenience
pub use redis;
pub use redis::aio::ConnectionManager;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::connection::connect;
    pub use crate::error::{RedisError, Result};
}
