//! Process-local session store.

use super::{decode, encode, SessionStore, StoreError};
use crate::message::{Message, Transcript};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory store with per-key expiry, for development and tests.
///
/// Values are kept in their persisted JSON form so behavior matches Redis.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) sessions.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn get(&self, session_id: &str) -> Result<Transcript, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(session_id) {
            Some(entry) if entry.expires_at > Instant::now() => decode(session_id, &entry.value),
            _ => Ok(Vec::new()),
        }
    }

    async fn set(
        &self,
        session_id: &str,
        transcript: &[Message],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let value = encode(transcript)?;
        let now = Instant::now();

        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            session_id.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
