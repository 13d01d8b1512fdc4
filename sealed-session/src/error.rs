//! Error types for session operations.

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
///
/// The cryptographic variants deliberately carry no cause: a caller (or an
/// attacker observing the caller) learns which check failed and nothing more.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Redis-specific error, passed through unmodified
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// No entry under the requested key
    #[error("Session not found")]
    NotFound,

    /// Entry present but past its expiry, or a write of an already-expired session
    #[error("Session expired")]
    Expired,

    /// Envelope undecodable, too short, or bound to a different key
    #[error("Invalid session data")]
    InvalidData,

    /// HMAC signature mismatch
    #[error("Signature verification failed")]
    SignatureInvalid,

    /// AEAD seal/open failure
    #[error("Encryption/decryption failed")]
    EncryptionFailed,

    /// Incoming identifier is not shaped like one we issue
    #[error("Invalid session ID")]
    InvalidSessionId,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Authenticated plaintext did not decode into a session record
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error (bad key material, bad TTLs)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Remote store did not answer within the command timeout
    #[error("Operation timeout")]
    Timeout,
}

impl SessionError {
    /// Errors that mean "there is no usable session behind this identifier".
    ///
    /// [`SessionStore::resolve`](crate::SessionStore::resolve) turns these
    /// into a fresh session instead of surfacing them.
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::Expired
                | Self::InvalidData
                | Self::SignatureInvalid
                | Self::EncryptionFailed
                | Self::InvalidSessionId
                | Self::Deserialization(_)
        )
    }

    /// Errors raised by the remote store or the path to it.
    pub fn is_infrastructure_error(&self) -> bool {
        match self {
            #[cfg(feature = "redis")]
            Self::Redis(_) => true,
            Self::Connection(_) | Self::Timeout => true,
            _ => false,
        }
    }
}

#[cfg(feature = "redis")]
impl From<sealed_redis::RedisError> for SessionError {
    fn from(err: sealed_redis::RedisError) -> Self {
        match err {
            sealed_redis::RedisError::Redis(e) => Self::Redis(e),
            sealed_redis::RedisError::Timeout => Self::Timeout,
            sealed_redis::RedisError::Connection(msg) => Self::Connection(msg),
            sealed_redis::RedisError::Config(msg) => Self::Config(msg),
        }
    }
}
