//! Error types for third-party API resolution.
//!
//! This module defines structured errors for provider resolution,
//! following the What/Why/Fix pattern used across the project. Guard denials
//! are reported separately from provider failures so operators can tell our
//! own rate limiting apart from a broken third-party API.

use thiserror::Error;

use super::guard::GuardError;

/// Errors that can occur while resolving media through third-party providers.
#[derive(Debug, Clone, Error)]
pub enum ThirdApiError {
    /// A provider is missing credentials or other required configuration
    #[error("provider '{provider}' is not configured: {reason}\n  Suggestion: {suggestion}")]
    Configuration {
        /// The provider that cannot run
        provider: String,
        /// What is missing
        reason: String,
        /// How to fix the issue
        suggestion: String,
    },

    /// The shared frequency guard denied the call
    #[error(
        "rate limited by local policy for '{key}': retry in {retry_in_secs}s\n  Suggestion: Wait for the cooldown window to expire"
    )]
    RateLimited {
        /// The guard key that was denied
        key: String,
        /// Seconds until the cooldown expires
        retry_in_secs: u64,
    },

    /// Third-party resolution is switched off
    #[error(
        "third-party API resolution is disabled\n  Suggestion: Unset `disable_third_api` to enable provider fallback"
    )]
    Disabled,

    /// A provider kept throttling until the retry budget ran out
    #[error("provider '{provider}' is throttling: {reason}\n  Suggestion: Try again later")]
    ProviderTransient {
        /// The throttling provider
        provider: String,
        /// Which retry budget was exhausted
        reason: String,
    },

    /// A provider returned an explicit error or an unusable result
    #[error("provider '{provider}' failed for '{input}': {reason}")]
    ProviderFatal {
        /// The failing provider
        provider: String,
        /// The input being resolved
        input: String,
        /// The provider's error message
        reason: String,
    },

    /// The selector names no registered provider
    #[error("unknown provider '{name}'\n  Suggestion: Use one of: {available}")]
    UnknownProvider {
        /// The requested provider name
        name: String,
        /// Comma-separated list of registered providers
        available: String,
    },

    /// Strict routing found no provider with affinity for the input
    #[error(
        "no provider supports '{input}'\n  Suggestion: Select a provider explicitly or use permissive routing"
    )]
    NoProvider {
        /// The unroutable input
        input: String,
    },

    /// The input cannot be resolved as given
    #[error("invalid input '{input}': {reason}")]
    InvalidInput {
        /// The rejected input
        input: String,
        /// Why it was rejected
        reason: String,
    },
}

impl ThirdApiError {
    /// Creates a `Configuration` error for a missing API key.
    #[must_use]
    pub fn missing_key(provider: &str, option: &str) -> Self {
        Self::Configuration {
            provider: provider.to_string(),
            reason: format!("no `{option}` configured"),
            suggestion: format!(
                "Pass `{option}` in the configuration or set the `{option}` environment variable"
            ),
        }
    }

    /// Creates a `Configuration` error with a custom reason.
    #[must_use]
    pub fn configuration(provider: &str, reason: &str) -> Self {
        Self::Configuration {
            provider: provider.to_string(),
            reason: reason.to_string(),
            suggestion: "Check the provider configuration".to_string(),
        }
    }

    /// Creates a `ProviderFatal` error.
    #[must_use]
    pub fn provider_fatal(provider: &str, input: &str, reason: &str) -> Self {
        Self::ProviderFatal {
            provider: provider.to_string(),
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a `ProviderTransient` error.
    #[must_use]
    pub fn provider_transient(provider: &str, reason: &str) -> Self {
        Self::ProviderTransient {
            provider: provider.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates an `UnknownProvider` error.
    #[must_use]
    pub fn unknown_provider(name: &str, available: &[&str]) -> Self {
        Self::UnknownProvider {
            name: name.to_string(),
            available: available.join(", "),
        }
    }

    /// Creates a `NoProvider` error.
    #[must_use]
    pub fn no_provider(input: &str) -> Self {
        Self::NoProvider {
            input: input.to_string(),
        }
    }

    /// Creates an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(input: &str, reason: &str) -> Self {
        Self::InvalidInput {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for errors raised by our own rate limiting policy.
    #[must_use]
    pub fn is_guard_denial(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Disabled)
    }

    /// Returns the provider name when the error came from a provider.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Configuration { provider, .. }
            | Self::ProviderTransient { provider, .. }
            | Self::ProviderFatal { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

impl From<GuardError> for ThirdApiError {
    fn from(error: GuardError) -> Self {
        match error {
            GuardError::TooFrequent { key, retry_in_secs } => {
                Self::RateLimited { key, retry_in_secs }
            }
            GuardError::Disabled => Self::Disabled,
        }
    }
}
