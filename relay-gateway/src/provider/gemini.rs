//! Google Gemini provider.
//!
//! The API key travels in the `key` query parameter. Messages are sent as
//! `contents[]` entries with nested `parts[]`.

use super::{canonical_role, http_client, mapped_turns, Provider, ProviderError};
use crate::message::{Message, Role};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    client: Client,
}

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "topP")]
    top_p: f64,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GeminiProvider {
    /// Create a Gemini provider. `None` overrides use the public endpoint and model.
    pub fn new(api_key: Option<String>, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client: http_client(),
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn id(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    fn map_role(&self, role: &Role) -> Option<&'static str> {
        canonical_role(role, "model")
    }

    fn translate(&self, transcript: &[Message]) -> serde_json::Value {
        let contents = mapped_turns(self.id(), transcript, |r| self.map_role(r))
            .into_iter()
            .map(|(role, text)| Content {
                role,
                parts: vec![Part { text }],
            })
            .collect();

        let request = GenerateContentRequest {
            contents,
            generation_config: GenerationConfig::default(),
        };
        serde_json::to_value(request).unwrap_or_default()
    }

    fn request(&self, api_key: &str, payload: &serde_json::Value) -> RequestBuilder {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        self.client
            .post(url)
            .query(&[("key", api_key)])
            .json(payload)
    }

    fn extract(&self, body: &[u8]) -> Result<String, ProviderError> {
        let response: GenerateContentResponse = serde_json::from_slice(body).map_err(|e| {
            ProviderError::parse(self.id(), format!("error parsing Gemini response: {e}"))
        })?;

        if let Some(err) = response.error {
            return Err(ProviderError::parse(self.id(), err.message));
        }

        response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| ProviderError::parse(self.id(), "no candidates with content parts"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(Some("key".into()), None, None)
    }

    #[test]
    fn test_defaults() {
        let provider = provider();
        assert_eq!(provider.id(), "gemini");
        assert_eq!(provider.model(), "gemini-2.0-flash");
        assert_eq!(provider.api_key(), Some("key"));
        assert!(GeminiProvider::new(Some(String::new()), None, None)
            .api_key()
            .is_none());
    }

    #[test]
    fn test_translate_nests_parts_and_maps_roles() {
        let payload = provider().translate(&[
            Message::system("be concise"),
            Message::user("hi"),
            Message::ai("hello"),
            Message::new(Role::Other("tool".into()), "skip me"),
        ]);

        assert_eq!(
            payload["contents"],
            json!([
                { "role": "user", "parts": [{ "text": "be concise" }] },
                { "role": "user", "parts": [{ "text": "hi" }] },
                { "role": "model", "parts": [{ "text": "hello" }] }
            ])
        );
        assert_eq!(
            payload["generationConfig"],
            json!({ "temperature": 0.7, "topP": 0.95, "topK": 40, "maxOutputTokens": 1024 })
        );
    }

    #[test]
    fn test_extract_first_candidate_part() {
        let body = json!({
            "candidates": [
                {
                    "content": {
                        "role": "model",
                        "parts": [{ "text": "first" }, { "text": "second" }]
                    }
                },
                { "content": { "role": "model", "parts": [{ "text": "other" }] } }
            ]
        });
        let text = provider().extract(body.to_string().as_bytes()).unwrap();
        assert_eq!(text, "first");
    }

    #[test]
    fn test_extract_without_candidates_is_parse_error() {
        let bodies = [
            json!({}),
            json!({ "candidates": [] }),
            json!({ "candidates": [{ "content": { "parts": [] } }] }),
        ];
        for body in bodies {
            let err = provider().extract(body.to_string().as_bytes()).unwrap_err();
            assert!(matches!(err, ProviderError::Parse { .. }), "body: {body}");
        }
    }

    #[test]
    fn test_extract_embedded_error() {
        let body = json!({ "error": { "message": "quota exhausted" } });
        let err = provider().extract(body.to_string().as_bytes()).unwrap_err();
        assert!(err.to_string().contains("quota exhausted"));
    }

    #[test]
    fn test_extract_non_json_is_parse_error() {
        let err = provider().extract(b"<html>").unwrap_err();
        assert!(matches!(err, ProviderError::Parse { .. }));
    }
}
