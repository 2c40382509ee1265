//! Route definitions for Relay Gateway.
//!
//! Provides the chat, history and health endpoints.

use crate::assembler::ConversationAssembler;
use crate::error::GatewayError;
use crate::message::{Message, Transcript};
use crate::provider::{create_registry, ProviderRegistry};
use crate::store::SessionStore;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    routing::post,
    Router,
};
use relay_common::config::Config;
use relay_common::logging::generate_trace_id;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub assembler: ConversationAssembler,
}

impl AppState {
    /// Build state from configuration and an already connected store.
    pub fn new(config: &Config, store: Arc<dyn SessionStore>) -> Self {
        Self {
            registry: Arc::new(create_registry(config)),
            assembler: ConversationAssembler::new(store, config.assistant.system_prompt.clone()),
        }
    }

    fn store(&self) -> &Arc<dyn SessionStore> {
        self.assembler.store()
    }
}

/// Chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    #[serde(rename = "sessionId", default)]
    pub session_id: String,
    #[serde(rename = "modelName", default)]
    pub model_name: String,
    #[serde(default)]
    pub contents: Vec<Message>,
}

impl ChatPayload {
    /// Decode a JSON body. The `Content-Type` header is not checked, so
    /// `text/plain` posts that skip the CORS preflight are accepted.
    pub fn from_body(body: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice(body)
            .map_err(|e| GatewayError::Validation(format!("Invalid request body: {e}")))
    }

    /// Check required fields and take the new message (`contents[0]`).
    pub fn into_turn(self) -> Result<(String, String, Message), GatewayError> {
        if self.session_id.trim().is_empty() {
            return Err(GatewayError::Validation("sessionId is required".into()));
        }

        let message = self
            .contents
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Validation("contents must contain a message".into()))?;

        if message.text.is_empty() {
            return Err(GatewayError::Validation("message text is required".into()));
        }

        Ok((self.session_id, self.model_name, message))
    }
}

/// Chat response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
}

/// Query for `GET /chat/history`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub store: String,
}

/// Build chat and history routes.
pub fn chat_routes(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler).options(preflight_handler))
        .route(
            "/chat/history",
            get(history_handler).options(preflight_handler),
        )
        .with_state(state)
}

/// Build health check routes.
pub fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatReply>, GatewayError> {
    let (session_id, model_name, message) = ChatPayload::from_body(&body)?.into_turn()?;

    let provider = state
        .registry
        .get(&model_name)
        .ok_or_else(|| GatewayError::UnknownModel(model_name.clone()))?;

    let span = tracing::info_span!(
        "chat",
        trace_id = %generate_trace_id(),
        session_id = %session_id,
        model = %model_name,
    );

    async move {
        tracing::info!("Received chat request");
        let text = state
            .assembler
            .converse(&session_id, provider.as_ref(), message)
            .await?;
        tracing::info!(reply_chars = text.len(), "Chat request completed");
        Ok::<_, GatewayError>(Json(ChatReply { text }))
    }
    .instrument(span)
    .await
}

async fn history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Transcript>, GatewayError> {
    let session_id = query
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| GatewayError::Validation("sessionId is required".into()))?;

    let transcript = state
        .store()
        .get(&session_id)
        .await
        .map_err(GatewayError::HistoryUnavailable)?;

    tracing::debug!(session_id = %session_id, messages = transcript.len(), "History read");
    Ok(Json(transcript))
}

async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.store();
    let store_status = if store.backend() == "stateless" {
        "stateless"
    } else if store.ping().await.is_ok() {
        "ok"
    } else {
        "unavailable"
    };

    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "relay-gateway".into(),
        store: store_status.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> ChatPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_into_turn_takes_first_message() {
        let (session_id, model, message) = payload(json!({
            "sessionId": "abc",
            "modelName": "gemini",
            "contents": [
                { "role": "user", "text": "first" },
                { "role": "user", "text": "ignored" }
            ]
        }))
        .into_turn()
        .unwrap();

        assert_eq!(session_id, "abc");
        assert_eq!(model, "gemini");
        assert_eq!(message, Message::user("first"));
    }

    #[test]
    fn test_from_body_rejects_malformed_json() {
        for body in [&b"{not json"[..], &b""[..], &b"[1, 2]"[..]] {
            let err = ChatPayload::from_body(body).unwrap_err();
            assert!(matches!(err, GatewayError::Validation(_)));
        }
        assert!(ChatPayload::from_body(br#"{"sessionId":"a"}"#).is_ok());
    }

    #[test]
    fn test_into_turn_rejects_missing_fields() {
        let cases = [
            json!({ "modelName": "gemini", "contents": [{ "role": "user", "text": "hi" }] }),
            json!({
                "sessionId": "  ",
                "modelName": "gemini",
                "contents": [{ "role": "user", "text": "hi" }]
            }),
            json!({ "sessionId": "abc", "modelName": "gemini" }),
            json!({ "sessionId": "abc", "modelName": "gemini", "contents": [] }),
            json!({
                "sessionId": "abc",
                "modelName": "gemini",
                "contents": [{ "role": "user", "text": "" }]
            }),
        ];

        for case in cases {
            let err = payload(case.clone()).into_turn().unwrap_err();
            assert!(matches!(err, GatewayError::Validation(_)), "case: {case}");
        }
    }
}
