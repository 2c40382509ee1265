//! Relay Common - Shared configuration, errors, and logging for the Relay chat gateway.
//!
//! This crate provides:
//! - Configuration types and loading (JSON file + environment overrides)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup with noise filtering

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    AssistantConfig, Config, ObservabilityConfig, ProviderOverride, SecretsConfig, ServerConfig,
    StoreBackend, StoreConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

