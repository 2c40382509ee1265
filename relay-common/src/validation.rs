//! Configuration validation for Relay.
//!
//! Checks that required values are present and within valid ranges
//! before the gateway binds its listener.

use thiserror::Error;

use crate::config::{
    AssistantConfig, Config, ObservabilityConfig, ServerConfig, StoreBackend, StoreConfig,
};

/// Provider ids that accept endpoint overrides.
const KNOWN_PROVIDERS: &[&str] = &["gemini", "llama", "claude", "chatgpt"];

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.server.validate() {
            errors.push(e);
        }
        if let Err(e) = self.store.validate() {
            errors.push(e);
        }
        if let Err(e) = self.assistant.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        for id in self.providers.keys() {
            if !KNOWN_PROVIDERS.contains(&id.as_str()) {
                errors.push(ValidationError::InvalidValue {
                    field: format!("providers.{id}"),
                    reason: format!(
                        "unknown provider, expected one of: {}",
                        KNOWN_PROVIDERS.join(", ")
                    ),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load, apply environment overrides, and validate.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "server.port".into(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "server.host".into(),
            });
        }
        Ok(())
    }
}

impl Validate for StoreConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.backend.parse::<StoreBackend>().is_err() {
            return Err(ValidationError::InvalidValue {
                field: "store.backend".into(),
                reason: "must be one of: redis, memory".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "store.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for AssistantConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.system_prompt.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "assistant.system_prompt".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}
