//! Redis-backed session store.

use super::{decode, encode, SessionStore, StoreError};
use crate::message::{Message, Transcript};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::Duration;

/// Redis session store.
///
/// Uses a [`ConnectionManager`], which multiplexes one reconnecting
/// connection and is cheap to clone per command, so concurrent requests share
/// it without locking.
pub struct RedisSessionStore {
    conn: ConnectionManager,
    key_prefix: String,
    op_timeout: Duration,
}

impl RedisSessionStore {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(
        url: &str,
        key_prefix: &str,
        op_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid redis url: {e}")))?;

        let conn = tokio::time::timeout(op_timeout, client.get_connection_manager())
            .await
            .map_err(|_| StoreError::Unavailable(format!("timed out connecting to {url}")))?
            .map_err(|e| StoreError::Unavailable(format!("failed to connect to {url}: {e}")))?;

        let store = Self {
            conn,
            key_prefix: key_prefix.to_string(),
            op_timeout,
        };
        store.ping().await?;

        tracing::info!(url = %url, "Connected to Redis session store");
        Ok(store)
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }

    /// Run one command under the operation timeout.
    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>> + Send,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Unavailable(format!("redis {op} failed: {e}"))),
            Err(_) => Err(StoreError::Unavailable(format!(
                "redis {op} timed out after {}s",
                self.op_timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    fn backend(&self) -> &str {
        "redis"
    }

    async fn get(&self, session_id: &str) -> Result<Transcript, StoreError> {
        let mut conn = self.conn.clone();
        let key = self.key(session_id);
        let mut cmd = redis::cmd("GET");
        cmd.arg(&key);

        let raw: Option<String> = self.bounded("GET", cmd.query_async(&mut conn)).await?;

        match raw {
            Some(raw) => decode(session_id, &raw),
            None => Ok(Vec::new()),
        }
    }

    async fn set(
        &self,
        session_id: &str,
        transcript: &[Message],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let value = encode(transcript)?;
        let mut conn = self.conn.clone();
        let key = self.key(session_id);
        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(value).arg("EX").arg(ttl.as_secs().max(1));

        self.bounded::<(), _>("SET", cmd.query_async(&mut conn)).await?;

        tracing::debug!(
            session_id = %session_id,
            messages = transcript.len(),
            ttl_secs = ttl.as_secs(),
            "Transcript saved to Redis"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("PING");
        let reply: String = self.bounded("PING", cmd.query_async(&mut conn)).await?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("unexpected PING reply: {reply}")))
        }
    }
}
