//! Canonical, provider-agnostic conversation types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Speaker of a message in the canonical form.
///
/// Roles outside `user`/`ai`/`system` are kept as [`Role::Other`] so a single
/// bad entry in a stored transcript never fails the whole request; provider
/// adapters drop them when building their payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Ai,
    System,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
            Self::System => "system",
            Self::Other(raw) => raw,
        }
    }

    /// Parse from the wire representation. Never fails.
    pub fn parse(s: &str) -> Self {
        match s {
            "user" => Self::User,
            "ai" => Self::Ai,
            "system" => Self::System,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(Role::Ai, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }
}

/// Ordered message history sent as context to a provider. Order is significant.
pub type Transcript = Vec<Message>;
