//! Anthropic (Claude) provider.

use super::{canonical_role, http_client, mapped_turns, Provider, ProviderError};
use crate::message::{Message, Role};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    /// Create an Anthropic provider. `None` overrides use the public endpoint and model.
    pub fn new(api_key: Option<String>, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn id(&self) -> &str {
        "claude"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    fn map_role(&self, role: &Role) -> Option<&'static str> {
        canonical_role(role, "assistant")
    }

    fn translate(&self, transcript: &[Message]) -> serde_json::Value {
        let anthropic_request = AnthropicRequest {
            model: &self.model,
            messages: mapped_turns(self.id(), transcript, |r| self.map_role(r))
                .into_iter()
                .map(|(role, content)| AnthropicMessage { role, content })
                .collect(),
            max_tokens: MAX_TOKENS,
        };
        serde_json::to_value(anthropic_request).unwrap_or_default()
    }

    fn request(&self, api_key: &str, payload: &serde_json::Value) -> RequestBuilder {
        self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(payload)
    }

    fn extract(&self, body: &[u8]) -> Result<String, ProviderError> {
        let anthropic_response: AnthropicResponse = serde_json::from_slice(body).map_err(|e| {
            ProviderError::parse(self.id(), format!("error parsing Claude response: {e}"))
        })?;

        anthropic_response
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| ProviderError::parse(self.id(), "empty content array"))
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}
