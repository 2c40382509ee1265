//! Provider adapters for the upstream LLM APIs.
//!
//! Each adapter turns the canonical transcript into one provider's request
//! schema, performs the HTTP call, and pulls the reply text out of that
//! provider's response envelope. The router picks an adapter by model id
//! through the [`ProviderRegistry`] lookup table.

mod anthropic;
mod compatible;
mod gemini;

pub use anthropic::AnthropicProvider;
pub use compatible::CompatibleProvider;
pub use gemini::GeminiProvider;

use crate::message::{Message, Role};
use async_trait::async_trait;
use relay_common::config::Config;
use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Upper bound for one upstream call, connect through last body byte.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Errors
// ============================================================================

/// Error from a provider adapter.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No API key configured; raised before any network call.
    #[error("{env_var} environment variable not set")]
    MissingApiKey { provider: String, env_var: String },

    /// The request never produced an HTTP response.
    #[error("error making {provider} API request: {message}")]
    Transport { provider: String, message: String },

    /// Non-success HTTP status. The body is kept for diagnostics.
    #[error("{provider} API returned status code {status}: {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },

    /// Success status but the envelope lacks the expected reply.
    #[error("unexpected {provider} response structure: {message}")]
    Parse { provider: String, message: String },
}

impl ProviderError {
    pub(crate) fn missing_key(provider: &str) -> Self {
        Self::MissingApiKey {
            provider: provider.to_string(),
            env_var: format!("{}_API_KEY", provider.to_ascii_uppercase()),
        }
    }

    pub(crate) fn parse(provider: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Provider id the error came from.
    pub fn provider(&self) -> &str {
        match self {
            Self::MissingApiKey { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Upstream { provider, .. }
            | Self::Parse { provider, .. } => provider,
        }
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// One upstream LLM API: translate, call, extract.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Model id clients select with `modelName`.
    fn id(&self) -> &str;

    /// Upstream model name sent to (or addressed on) the provider.
    fn model(&self) -> &str;

    /// Configured API key, if any.
    fn api_key(&self) -> Option<&str>;

    /// Provider role keyword for a canonical role; `None` drops the message.
    fn map_role(&self, role: &Role) -> Option<&'static str>;

    /// Build the provider request payload from the transcript.
    fn translate(&self, transcript: &[Message]) -> serde_json::Value;

    /// Endpoint and auth headers for one call.
    fn request(&self, api_key: &str, payload: &serde_json::Value) -> RequestBuilder;

    /// Pull the first candidate's text out of a success body.
    fn extract(&self, body: &[u8]) -> Result<String, ProviderError>;

    /// Send the transcript upstream and return the reply text.
    async fn chat(&self, transcript: &[Message]) -> Result<String, ProviderError> {
        let api_key = self
            .api_key()
            .ok_or_else(|| ProviderError::missing_key(self.id()))?;

        let payload = self.translate(transcript);
        let start = Instant::now();

        let response = self
            .request(api_key, &payload)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                provider: self.id().to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| ProviderError::Transport {
            provider: self.id().to_string(),
            message: format!("failed to read response body: {e}"),
        })?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            tracing::warn!(
                provider = %self.id(),
                status = status.as_u16(),
                latency_ms,
                "Provider returned error status"
            );
            return Err(ProviderError::Upstream {
                provider: self.id().to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let text = self.extract(&body)?;

        tracing::debug!(
            provider = %self.id(),
            model = %self.model(),
            latency_ms,
            reply_chars = text.len(),
            "Provider call completed"
        );

        Ok(text)
    }
}

/// Role mapping shared by every adapter: `system` is sent as a context-setting
/// `user` turn, `ai` becomes the provider's own keyword.
pub(crate) fn canonical_role(role: &Role, ai_keyword: &'static str) -> Option<&'static str> {
    match role {
        Role::User | Role::System => Some("user"),
        Role::Ai => Some(ai_keyword),
        Role::Other(_) => None,
    }
}

/// Pair each message with its provider role, skipping unmappable ones.
pub(crate) fn mapped_turns<'a, F>(
    provider: &str,
    transcript: &'a [Message],
    map_role: F,
) -> Vec<(&'static str, &'a str)>
where
    F: Fn(&Role) -> Option<&'static str>,
{
    transcript
        .iter()
        .filter_map(|msg| match map_role(&msg.role) {
            Some(role) => Some((role, msg.text.as_str())),
            None => {
                tracing::warn!(
                    provider = %provider,
                    role = %msg.role,
                    "Skipping message with invalid role"
                );
                None
            }
        })
        .collect()
}

/// Pooled HTTP client with the fixed provider timeout.
pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

// ============================================================================
// Provider Registry
// ============================================================================

/// Lookup table from model id to adapter.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under its id, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let id = provider.id().to_string();
        if self.providers.insert(id.clone(), provider).is_some() {
            tracing::warn!(provider = %id, "Replacing registered provider");
        }
    }

    /// Get a provider by model id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(id).cloned()
    }

    /// Registered model ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with all four providers.
///
/// Every provider is registered even without a key, so a missing credential
/// surfaces as a configuration error on use instead of an unknown model.
pub fn create_registry(config: &Config) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    registry.register(Arc::new(GeminiProvider::new(
        config.get_api_key("gemini"),
        config.provider_base_url("gemini"),
        config.provider_model("gemini"),
    )));
    registry.register(Arc::new(CompatibleProvider::llama(
        config.get_api_key("llama"),
        config.provider_base_url("llama"),
        config.provider_model("llama"),
    )));
    registry.register(Arc::new(AnthropicProvider::new(
        config.get_api_key("claude"),
        config.provider_base_url("claude"),
        config.provider_model("claude"),
    )));
    registry.register(Arc::new(CompatibleProvider::chatgpt(
        config.get_api_key("chatgpt"),
        config.provider_base_url("chatgpt"),
        config.provider_model("chatgpt"),
    )));

    for id in registry.ids() {
        if config.get_api_key(id).is_none() {
            tracing::warn!(
                provider = %id,
                "No API key configured; requests for this model will fail"
            );
        }
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_all_providers() {
        let registry = create_registry(&Config::default());
        assert_eq!(registry.ids(), vec!["chatgpt", "claude", "gemini", "llama"]);
        assert!(registry.get("gemini").is_some());
        assert!(registry.get("unknown").is_none());
        assert!(registry.get("Gemini").is_none());
    }

    #[test]
    fn test_canonical_role_is_total() {
        for keyword in ["model", "assistant"] {
            assert_eq!(canonical_role(&Role::User, keyword), Some("user"));
            assert_eq!(canonical_role(&Role::System, keyword), Some("user"));
            assert_eq!(canonical_role(&Role::Ai, keyword), Some(keyword));
            assert_eq!(canonical_role(&Role::Other("bot".into()), keyword), None);
        }
    }

    #[test]
    fn test_mapped_turns_skips_unknown_roles() {
        let transcript = vec![
            Message::system("sys"),
            Message::new(Role::Other("narrator".into()), "ignored"),
            Message::user("hi"),
            Message::ai("hello"),
        ];

        let turns = mapped_turns("test", &transcript, |r| canonical_role(r, "assistant"));
        assert_eq!(
            turns,
            vec![("user", "sys"), ("user", "hi"), ("assistant", "hello")]
        );
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        // Base URL points nowhere; reaching the network would yield Transport.
        let provider = GeminiProvider::new(None, Some("http://127.0.0.1:1".into()), None);
        let err = provider.chat(&[Message::user("hi")]).await.unwrap_err();

        assert!(matches!(err, ProviderError::MissingApiKey { .. }));
        assert_eq!(err.to_string(), "GEMINI_API_KEY environment variable not set");
        assert_eq!(err.provider(), "gemini");
    }

    #[test]
    fn test_upstream_error_keeps_body() {
        let err = ProviderError::Upstream {
            provider: "claude".into(),
            status: 529,
            body: r#"{"error":"overloaded"}"#.into(),
        };
        let text = err.to_string();
        assert!(text.contains("529"));
        assert!(text.contains("overloaded"));
    }
}
