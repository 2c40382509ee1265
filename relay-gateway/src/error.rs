//! Request-level errors and their HTTP rendering.

use crate::provider::ProviderError;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned by the chat and history handlers.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed or incomplete request.
    #[error("{0}")]
    Validation(String),

    /// `modelName` is not a registered provider id.
    #[error("Invalid model name: {0}")]
    UnknownModel(String),

    /// The session store could not be read.
    #[error("Failed to retrieve history: {0}")]
    HistoryUnavailable(#[source] StoreError),

    /// The provider call failed or was not configured.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Error body. `text` carries the detail so clients reading only `text` still
/// see the failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub text: String,
    pub code: String,
}

impl GatewayError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::UnknownModel(_) => StatusCode::BAD_REQUEST,
            Self::HistoryUnavailable(_) | Self::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::UnknownModel(_) => "UNKNOWN_MODEL",
            Self::HistoryUnavailable(_) => "HISTORY_UNAVAILABLE",
            Self::Provider(ProviderError::MissingApiKey { .. }) => "CONFIG_ERROR",
            Self::Provider(ProviderError::Upstream { .. }) => "UPSTREAM_ERROR",
            Self::Provider(ProviderError::Parse { .. }) => "UPSTREAM_PARSE_ERROR",
            Self::Provider(ProviderError::Transport { .. }) => "UPSTREAM_UNREACHABLE",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Provider(err) = &self {
            tracing::error!(
                code = self.code(),
                provider = %err.provider(),
                error = %self,
                "Provider call failed"
            );
        } else if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            text: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_client_errors_are_400() {
        let err = GatewayError::UnknownModel("unknown".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "UNKNOWN_MODEL");
        assert_eq!(err.to_string(), "Invalid model name: unknown");

        let err = GatewayError::Validation("sessionId is required".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test_case(ProviderError::missing_key("claude"), "CONFIG_ERROR" ; "missing key")]
    #[test_case(
        ProviderError::Upstream { provider: "gemini".into(), status: 503, body: "busy".into() },
        "UPSTREAM_ERROR" ; "upstream status"
    )]
    #[test_case(ProviderError::parse("llama", "empty"), "UPSTREAM_PARSE_ERROR" ; "bad envelope")]
    #[test_case(
        ProviderError::Transport {
            provider: "chatgpt".into(),
            message: "connection refused".into(),
        },
        "UPSTREAM_UNREACHABLE" ; "transport"
    )]
    fn test_provider_error_codes(provider_err: ProviderError, code: &str) {
        let err = GatewayError::from(provider_err);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), code);
    }

    #[test]
    fn test_upstream_detail_in_text() {
        let err = GatewayError::from(ProviderError::Upstream {
            provider: "gemini".into(),
            status: 500,
            body: "backend exploded".into(),
        });
        let text = err.to_string();
        assert!(text.contains("500"));
        assert!(text.contains("backend exploded"));
    }

    #[test]
    fn test_history_unavailable() {
        let err = GatewayError::HistoryUnavailable(StoreError::Unavailable("timeout".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "HISTORY_UNAVAILABLE");
        assert!(err.to_string().starts_with("Failed to retrieve history"));
    }
}
