//! Error types shared by Relay services.

use thiserror::Error;

/// Result type alias using the Relay error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for configuration and process setup.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::Config("bad port".into());
        let with_ctx = err.with_context("loading config");
        assert!(matches!(with_ctx, Error::WithContext { .. }));
        assert_eq!(
            with_ctx.to_string(),
            "loading config: Configuration error: bad port"
        );
    }

    #[test]
    fn test_result_ext_wraps_io_error() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = result.context("reading config.json").unwrap_err();
        assert!(err.to_string().starts_with("reading config.json"));
        assert!(matches!(
            err,
            Error::WithContext { ref source, .. } if matches!(**source, Error::Io(_))
        ));
    }
}
