//! Session transcript storage.
//!
//! One key per session id, value = JSON array of `{role, text}`, expiring
//! [`SESSION_TTL`] after the last write. The whole transcript is read and
//! rewritten on every turn; there are no partial updates.
//!
//! Reads and writes are not synchronized across requests. Two concurrent
//! turns on the same session both read the same history and the later `set`
//! wins, dropping the other turn. Sessions are assumed to have one client.

mod memory;
mod redis_store;

pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;

use crate::message::{Message, Transcript};
use async_trait::async_trait;
use relay_common::config::{StoreBackend, StoreConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Expiry applied (and refreshed) on every transcript write.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Session store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend unreachable, timed out, or not configured.
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    /// Stored value is not a transcript.
    #[error("stored transcript for session {session_id} is corrupt: {message}")]
    Corrupt { session_id: String, message: String },
}

/// Key-value storage for session transcripts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name reported by the health endpoint.
    fn backend(&self) -> &str;

    /// Stored transcript, or an empty one when the key is absent or expired.
    async fn get(&self, session_id: &str) -> Result<Transcript, StoreError>;

    /// Overwrite the transcript and reset its expiry to `ttl`.
    async fn set(
        &self,
        session_id: &str,
        transcript: &[Message],
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Serialize a transcript to the persisted JSON layout.
pub(crate) fn encode(transcript: &[Message]) -> Result<String, StoreError> {
    serde_json::to_string(transcript)
        .map_err(|e| StoreError::Unavailable(format!("failed to encode transcript: {e}")))
}

/// Parse the persisted JSON layout.
pub(crate) fn decode(session_id: &str, raw: &str) -> Result<Transcript, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
        session_id: session_id.to_string(),
        message: e.to_string(),
    })
}

/// Store used when no Redis address is configured.
///
/// Every operation fails, so chat requests are refused with a history error
/// instead of silently running without memory.
#[derive(Debug, Default)]
pub struct StatelessStore;

const STATELESS_REASON: &str = "no store address configured (stateless mode)";

#[async_trait]
impl SessionStore for StatelessStore {
    fn backend(&self) -> &str {
        "stateless"
    }

    async fn get(&self, _session_id: &str) -> Result<Transcript, StoreError> {
        Err(StoreError::Unavailable(STATELESS_REASON.into()))
    }

    async fn set(
        &self,
        _session_id: &str,
        _transcript: &[Message],
        _ttl: Duration,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(STATELESS_REASON.into()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(STATELESS_REASON.into()))
    }
}

/// Build the configured session store.
///
/// A configured Redis that cannot be reached is a startup error.
pub async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>, StoreError> {
    match config.backend() {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory session store");
            Ok(Arc::new(MemorySessionStore::new()))
        }
        StoreBackend::Redis => match config.redis_url() {
            Some(url) => {
                let store = RedisSessionStore::connect(
                    &url,
                    &config.key_prefix,
                    Duration::from_secs(config.timeout_secs),
                )
                .await?;
                Ok(Arc::new(store))
            }
            None => {
                tracing::warn!("REDIS_ADDR not set. Running in stateless mode.");
                Ok(Arc::new(StatelessStore))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_is_one_day() {
        assert_eq!(SESSION_TTL.as_secs(), 86_400);
    }

    #[test]
    fn test_decode_rejects_non_array() {
        let err = decode("s1", r#"{"role":"user"}"#).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref session_id, .. } if session_id == "s1"));
    }

    #[test]
    fn test_encode_decode_layout() {
        let transcript = vec![Message::system("sys"), Message::user("hi")];
        let raw = encode(&transcript).unwrap();
        assert_eq!(
            raw,
            r#"[{"role":"system","text":"sys"},{"role":"user","text":"hi"}]"#
        );
        assert_eq!(decode("s1", &raw).unwrap(), transcript);
    }

    #[tokio::test]
    async fn test_stateless_store_is_unavailable() {
        let store = StatelessStore;
        assert!(matches!(store.get("s1").await, Err(StoreError::Unavailable(_))));
        assert!(store.set("s1", &[], SESSION_TTL).await.is_err());
        assert!(store.ping().await.is_err());
        assert_eq!(store.backend(), "stateless");
    }

    #[tokio::test]
    async fn test_connect_store_without_address_is_stateless() {
        let store = connect_store(&StoreConfig::default()).await.unwrap();
        assert_eq!(store.backend(), "stateless");
    }

    #[tokio::test]
    async fn test_connect_store_memory_backend() {
        let config = StoreConfig {
            backend: "memory".into(),
            ..Default::default()
        };
        let store = connect_store(&config).await.unwrap();
        assert_eq!(store.backend(), "memory");
        assert!(store.ping().await.is_ok());
    }
}
