//! Conversation assembly: one chat turn against a stored transcript.

use crate::error::GatewayError;
use crate::message::Message;
use crate::provider::Provider;
use crate::store::{SessionStore, SESSION_TTL};
use std::sync::Arc;
use std::time::Duration;

/// Runs a turn: load history, seed, append, call the provider, persist.
#[derive(Clone)]
pub struct ConversationAssembler {
    store: Arc<dyn SessionStore>,
    system_prompt: String,
    ttl: Duration,
}

impl ConversationAssembler {
    pub fn new(store: Arc<dyn SessionStore>, system_prompt: impl Into<String>) -> Self {
        Self {
            store,
            system_prompt: system_prompt.into(),
            ttl: SESSION_TTL,
        }
    }

    /// Override the expiry applied on write.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Run one turn and return the provider's reply.
    ///
    /// Nothing is written unless the provider succeeds. A failed write is
    /// logged and the reply is still returned.
    pub async fn converse(
        &self,
        session_id: &str,
        provider: &dyn Provider,
        new_message: Message,
    ) -> Result<String, GatewayError> {
        let mut history = self
            .store
            .get(session_id)
            .await
            .map_err(GatewayError::HistoryUnavailable)?;

        if history.is_empty() {
            tracing::debug!(session_id = %session_id, "Starting new session");
            history.push(Message::system(self.system_prompt.clone()));
        }
        history.push(new_message);

        let ai_text = provider.chat(&history).await?;
        history.push(Message::ai(ai_text.clone()));

        if let Err(e) = self.store.set(session_id, &history, self.ttl).await {
            tracing::warn!(
                session_id = %session_id,
                error = %e,
                "Failed to save history"
            );
        } else {
            tracing::debug!(
                session_id = %session_id,
                messages = history.len(),
                "History saved"
            );
        }

        Ok(ai_text)
    }
}
