//! OpenAI-compatible chat completions provider.
//!
//! Serves both `chatgpt` (OpenAI) and `llama` (Perplexity), which share the
//! `{model, messages}` request and `choices[0].message.content` response.

use super::{canonical_role, http_client, mapped_turns, Provider, ProviderError};
use crate::message::{Message, Role};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

/// A provider that speaks the OpenAI-compatible chat completions API.
pub struct CompatibleProvider {
    id: &'static str,
    label: &'static str,
    base_url: String,
    path: &'static str,
    model: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CompatibleRequest<'a> {
    model: &'a str,
    messages: Vec<CompatibleMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct CompatibleMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompatibleResponse {
    #[serde(default)]
    choices: Vec<CompatibleChoice>,
}

#[derive(Debug, Deserialize)]
struct CompatibleChoice {
    message: CompatibleResponseMessage,
}

#[derive(Debug, Deserialize)]
struct CompatibleResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CompatibleProvider {
    /// Perplexity-hosted Llama model.
    pub fn llama(api_key: Option<String>, base_url: Option<String>, model: Option<String>) -> Self {
        Self::build(
            "llama",
            "Llama",
            base_url.unwrap_or_else(|| "https://api.perplexity.ai".to_string()),
            "/chat/completions",
            model.unwrap_or_else(|| "llama-3-sonar-small-32k-online".to_string()),
            api_key,
        )
    }

    /// OpenAI chat completions.
    pub fn chatgpt(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Self {
        Self::build(
            "chatgpt",
            "ChatGPT",
            base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
            "/v1/chat/completions",
            model.unwrap_or_else(|| "gpt-4o".to_string()),
            api_key,
        )
    }

    fn build(
        id: &'static str,
        label: &'static str,
        base_url: String,
        path: &'static str,
        model: String,
        api_key: Option<String>,
    ) -> Self {
        Self {
            id,
            label,
            base_url,
            path,
            model,
            api_key: api_key.filter(|k| !k.is_empty()),
            client: http_client(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }
}

#[async_trait]
impl Provider for CompatibleProvider {
    fn id(&self) -> &str {
        self.id
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
        let request = CompatibleRequest {
            model: &self.model,
            messages: mapped_turns(self.id, transcript, |r| self.map_role(r))
                .into_iter()
                .map(|(role, content)| CompatibleMessage { role, content })
                .collect(),
        };
        serde_json::to_value(request).unwrap_or_default()
    }

    fn request(&self, api_key: &str, payload: &serde_json::Value) -> RequestBuilder {
        self.client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(payload)
    }

    fn extract(&self, body: &[u8]) -> Result<String, ProviderError> {
        let response: CompatibleResponse = serde_json::from_slice(body).map_err(|e| {
            ProviderError::parse(self.id, format!("error parsing {} response: {e}", self.label))
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::parse(self.id, "empty choices array"))
    }
}
