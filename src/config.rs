//! Resolution-layer configuration.
//!
//! [`ThirdApiConfig`] carries the recognized options. Values given explicitly
//! (CLI flags or the config file) win; credentials, the kill switch and the
//! external resolver address fall back to environment variables.

use std::path::PathBuf;

use thiserror::Error;

/// Environment fallback for RapidAPI credentials.
pub const RAPIDAPI_KEY_ENV: &str = "rapidapi_key";

/// Environment fallback for the HikerAPI credential.
pub const HIKERAPI_KEY_ENV: &str = "hikerapi_key";

/// Environment kill switch for all third-party calls.
pub const DISABLE_THIRD_API_ENV: &str = "disable_third_api";

/// Environment fallback for the external resolver address.
pub const EXTERNAL_IE_ENV: &str = "external_ie";

/// Default guard namespace.
pub const DEFAULT_GUARD_NAMESPACE: &str = "third_api";

/// Errors raised while interpreting configuration values.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// The external resolver address is unusable
    #[error("invalid external_ie address '{value}': {reason}")]
    InvalidExternalAddress {
        /// The rejected value
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Options recognized by the resolution layer.
#[derive(Debug, Clone)]
pub struct ThirdApiConfig {
    /// RapidAPI keys; the first non-empty one is used.
    pub rapidapi_keys: Vec<String>,
    /// HikerAPI keys for the Instagram provider.
    pub hikerapi_keys: Vec<String>,
    /// Kill switch for every third-party call.
    pub disable_third_api: bool,
    /// Media kinds to keep in playlist results (empty keeps everything).
    pub media_filter: Vec<String>,
    /// Try RapidAPI-hosted providers first.
    pub prefer_rapidapi: bool,
    /// Only try RapidAPI-hosted providers.
    pub only_rapidapi: bool,
    /// Address of an out-of-process resolver (`host:port`, URL or bare port).
    pub external_ie: Option<String>,
    /// Override for the guard state file.
    pub guard_path: Option<PathBuf>,
    /// Prefix of every guard key.
    pub guard_namespace: String,
}

impl Default for ThirdApiConfig {
    fn default() -> Self {
        Self {
            rapidapi_keys: Vec::new(),
            hikerapi_keys: Vec::new(),
            disable_third_api: false,
            media_filter: Vec::new(),
            prefer_rapidapi: false,
            only_rapidapi: false,
            external_ie: None,
            guard_path: None,
            guard_namespace: DEFAULT_GUARD_NAMESPACE.to_string(),
        }
    }
}

impl ThirdApiConfig {
    /// Returns the RapidAPI key: first non-empty configured key, else the environment.
    #[must_use]
    pub fn rapidapi_key(&self) -> Option<String> {
        first_non_empty(&self.rapidapi_keys).or_else(|| env_value(RAPIDAPI_KEY_ENV))
    }

    /// Returns the HikerAPI key: first non-empty configured key, else the environment.
    #[must_use]
    pub fn hikerapi_key(&self) -> Option<String> {
        first_non_empty(&self.hikerapi_keys).or_else(|| env_value(HIKERAPI_KEY_ENV))
    }

    /// Returns true if the kill switch is set here or in the environment.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disable_third_api || env_flag(DISABLE_THIRD_API_ENV)
    }

    /// Returns the normalized external resolver base URL, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidExternalAddress`] for port 0 or an empty value.
    pub fn external_address(&self) -> Result<Option<String>, ConfigError> {
        let raw = self
            .external_ie
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .or_else(|| env_value(EXTERNAL_IE_ENV));
        raw.map(|value| parse_external_address(&value)).transpose()
    }
}

/// Returns the first entry that is non-empty after trimming.
#[must_use]
pub fn first_non_empty(values: &[String]) -> Option<String> {
    values
        .iter()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Normalizes an external resolver address.
///
/// A bare port means loopback (`http://127.0.0.1:<port>`); `host:port` gets an
/// `http://` scheme; full URLs are kept. Trailing slashes are removed.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidExternalAddress`] for port 0 or an empty value.
pub fn parse_external_address(raw: &str) -> Result<String, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidExternalAddress {
            value: raw.to_string(),
            reason: "address is empty".to_string(),
        });
    }

    if let Ok(port) = value.parse::<u16>() {
        if port == 0 {
            return Err(ConfigError::InvalidExternalAddress {
                value: raw.to_string(),
                reason: "port is 0".to_string(),
            });
        }
        return Ok(format!("http://127.0.0.1:{port}"));
    }

    let with_scheme = if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else {
        format!("http://{value}")
    };
    Ok(with_scheme.trim_end_matches('/').to_string())
}

/// Reads an environment variable, also trying its uppercase spelling.
#[must_use]
pub fn env_value(name: &str) -> Option<String> {
    [name.to_string(), name.to_ascii_uppercase()]
        .iter()
        .find_map(|candidate| {
            std::env::var(candidate)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
}

/// Returns true if the environment variable holds a truthy value.
#[must_use]
pub fn env_flag(name: &str) -> bool {
    env_value(name).is_some_and(|value| is_truthy(&value))
}

/// Interprets `1`, `true`, `yes` and `on` (any case) as true.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
