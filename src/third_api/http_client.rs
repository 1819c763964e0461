//! Shared HTTP client construction for provider adapters.
//!
//! Every adapter builds its client here so timeout, user-agent, compression
//! and proxy handling stay consistent. Provider calls can take minutes on the
//! aggregator side, so requests carry [`PROVIDER_TIMEOUT`] as a per-request
//! override on top of the client default.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use crate::user_agent;

use super::ThirdApiError;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// Per-request timeout applied to provider calls.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);

/// Returns the shared provider User-Agent.
#[must_use]
pub fn standard_user_agent() -> String {
    user_agent::default_provider_user_agent()
}

/// Builds a provider HTTP client using shared project policy.
///
/// `provider` is used only for error messages and logging.
///
/// # Errors
///
/// Returns [`ThirdApiError::Configuration`] when client construction fails.
pub fn build_provider_http_client(provider: &str) -> Result<Client, ThirdApiError> {
    let user_agent = standard_user_agent();

    match try_build_client(&user_agent, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // System proxy lookup can panic in sandboxed environments; keep
            // env-proxy support while skipping the system lookup.
            warn!(
                provider,
                "provider client hit system proxy panic; using env-proxy fallback builder"
            );
            match try_build_client(&user_agent, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(ThirdApiError::configuration(
                    provider,
                    "HTTP client construction panicked",
                )),
                Err(BuildClientFailure::Build(error)) => Err(ThirdApiError::configuration(
                    provider,
                    &format!("HTTP client construction failed: {error}"),
                )),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(ThirdApiError::configuration(
            provider,
            &format!("HTTP client construction failed: {error}"),
        )),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    user_agent: &str,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let user_agent = user_agent.to_string();
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(user_agent);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(user_agent: String) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
        .user_agent(user_agent)
        .gzip(true)
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = find_first_env(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = find_first_env(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn find_first_env(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds() {
        assert!(build_provider_http_client("test").is_ok());
    }

    #[test]
    fn test_provider_timeout_exceeds_client_default() {
        assert!(PROVIDER_TIMEOUT > Duration::from_secs(READ_TIMEOUT_SECS));
    }

    #[test]
    fn test_user_agent_is_shared() {
        let ua = standard_user_agent();
        assert!(ua.starts_with("third-api/"));
    }
}
