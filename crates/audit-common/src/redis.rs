/// Redis access for durable slots.
///
/// A slot has to tell "no value stored" apart from "could not ask", so every command
/// returns a `Result` and only a missing key reads as `Ok(None)`. One multiplexed
/// connection is opened on first use and shared by all clones; a failed attempt is not
/// cached, so the next command tries again.
use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::CommonError;

#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: Arc<OnceCell<MultiplexedConnection>>,
}

impl RedisStore {
    /// Parse `url`. Nothing is sent until the first command.
    pub fn open(url: &str) -> Result<Self, CommonError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            conn: Arc::new(OnceCell::new()),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CommonError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .inspect_err(|e| warn!(error = %e, "redis connection failed"))
            })
            .await?;
        Ok(conn.clone())
    }

    pub async fn ping(&self) -> Result<(), CommonError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CommonError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .get(key)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis GET failed"))?;
        debug!(key, found = value.is_some(), "redis GET");
        Ok(value)
    }

    /// Store `value` under `key` with no expiry.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), CommonError> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(key, value)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis SET failed"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on port 1, so the connection is refused immediately.
    const UNREACHABLE: &str = "redis://127.0.0.1:1/";

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(matches!(
            RedisStore::open("not a redis url"),
            Err(CommonError::Redis(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error_not_a_missing_key() {
        let store = RedisStore::open(UNREACHABLE).unwrap();
        assert!(matches!(store.ping().await, Err(CommonError::Redis(_))));
        assert!(matches!(store.get("history").await, Err(CommonError::Redis(_))));
        assert!(matches!(
            store.set("history", "[]").await,
            Err(CommonError::Redis(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_connection_is_retried() {
        let store = RedisStore::open(UNREACHABLE).unwrap();
        let clone = store.clone();
        assert!(store.get("history").await.is_err());
        assert!(clone.get("history").await.is_err());
        assert!(store.conn.get().is_none());
    }
}
