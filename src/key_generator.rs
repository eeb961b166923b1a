//! Counter key derivation for identities and windows.

use crate::error::LimiterError;

/// Separator between key components. Identities may not contain it.
pub const KEY_SEPARATOR: char = ':';

/// Builds `"{identity}:{window_start}"` store keys, optionally namespaced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyGenerator {
    prefix: Option<String>,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Namespace every key as `"{prefix}:{identity}:{window_start}"`.
    ///
    /// An empty prefix means no namespace.
    pub fn with_prefix(prefix: &str) -> Result<Self, LimiterError> {
        if prefix.is_empty() {
            return Ok(Self::new());
        }
        if prefix.contains(KEY_SEPARATOR) {
            return Err(LimiterError::Configuration(format!(
                "Key prefix '{}' must not contain '{}'",
                prefix, KEY_SEPARATOR
            )));
        }
        Ok(Self {
            prefix: Some(prefix.to_string()),
        })
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Counter key for `identity` in the window starting at `window_start`.
    pub fn window_key(&self, identity: &str, window_start: i64) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}:{}", prefix, identity, window_start),
            None => format!("{}:{}", identity, window_start),
        }
    }

    /// Check that an identity is usable as a key component.
    ///
    /// Rejecting the separator keeps keys of distinct identities from colliding.
    pub fn validate_identity(identity: &str) -> Result<(), LimiterError> {
        if identity.is_empty() {
            return Err(LimiterError::Validation(
                "Identity cannot be empty".to_string(),
            ));
        }
        if identity.contains(KEY_SEPARATOR) {
            return Err(LimiterError::Validation(format!(
                "Identity '{}' must not contain '{}'",
                identity, KEY_SEPARATOR
            )));
        }
        Ok(())
    }
}
