//! Connection setup.

use redis::aio::ConnectionManager;
use tracing::{debug, info};

use crate::{RedisConfig, RedisError, Result};

/// Open a managed, auto-reconnecting connection and verify it with `PING`.
///
/// The whole handshake is bounded by `config.connection_timeout`.
pub async fn connect(config: &RedisConfig) -> Result<ConnectionManager> {
    config.validate()?;

    let client = redis::Client::open(config.connection_url()?)
        .map_err(|e| RedisError::Config(e.to_string()))?;

    let handshake = async {
        let mut conn = ConnectionManager::new(client).await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        if let Some(name) = &config.connection_name {
            let _: () = redis::cmd("CLIENT")
                .arg("SETNAME")
                .arg(name)
                .query_async(&mut conn)
                .await?;
            debug!(connection_name = %name, "Redis connection named");
        }

        Ok::<_, RedisError>(conn)
    };

    let conn = tokio::time::timeout(config.connection_timeout, handshake)
        .await
        .map_err(|_| RedisError::Timeout)??;

    info!(
        url = %config.url,
        database = ?config.database,
        "Redis connection established"
    );

    Ok(conn)
}
