//! Third-party API resolution for media the host extractor cannot reach.
//!
//! This module turns a page URL (or bare provider id) into canonical media
//! descriptions by calling paid aggregator APIs, one [`Provider`] per API.
//!
//! # Architecture
//!
//! - [`classify()`] - Maps a raw provider response onto a [`RetryVerdict`]
//! - [`FrequencyGuard`] - Cross-process cooldown gate backed by a locked JSON file
//! - [`RetryDriver`] - Bounded retry loop with random jitter
//! - [`Provider`] - Async trait each adapter implements
//! - [`Dispatcher`] - Routing, guard, ordered fallback
//!
//! Adapters: [`YoutubeRapidApi`], [`AllInOneRapidApi`], [`InstagramHikerApi`],
//! [`SnapRapidApi`], [`SocialRapidApi`] and [`ExternalResolver`].
//!
//! # Example
//!
//! ```no_run
//! use third_api_core::config::ThirdApiConfig;
//! use third_api_core::third_api::{ResolveInput, build_default_dispatcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ThirdApiConfig {
//!     rapidapi_keys: vec!["my-key".to_string()],
//!     ..ThirdApiConfig::default()
//! };
//! let dispatcher = build_default_dispatcher(&config)?;
//! let input = ResolveInput::parse("https://www.tiktok.com/@user/video/123");
//! let extraction = dispatcher.extract(&input, Some("auto")).await?;
//! println!("{}", serde_json::to_string_pretty(&extraction)?);
//! # Ok(())
//! # }
//! ```

mod allinone_rapidapi;
mod classify;
mod dispatcher;
mod error;
mod external;
mod guard;
mod http_client;
mod input;
mod instagram_hikerapi;
mod retry;
mod snap_rapidapi;
mod social_rapidapi;
mod utils;
mod youtube_rapidapi;

pub use allinone_rapidapi::AllInOneRapidApi;
pub use classify::{
    MediasShape, ResponseShape, RetryVerdict, classify, error_message_from_fields, is_non_empty,
};
pub use dispatcher::{
    ApiSelector, DispatchOptions, Dispatcher, MUTIL_PROVIDERS, RoutingPolicy, collect_entries,
};
pub use error::ThirdApiError;
pub use external::{ExternalResolver, SecretCache};
pub use guard::{
    FrequencyGuard, GUARD_FILE_NAME, GUARD_WINDOW, GuardError, MAX_GUARD_ENTRIES,
    default_guard_path, guard_key,
};
pub use http_client::{PROVIDER_TIMEOUT, build_provider_http_client};
pub use input::{
    API_PARAM, FORCE_PARAM, ResolveInput, VIDEO_ID_PARAM, is_youtube_url,
    remove_third_api_params, smuggle_url, supports_site, unsmuggle_url, youtube_video_id,
};
pub use instagram_hikerapi::{InstagramHikerApi, InstagramTarget};
pub use retry::{RetryDriver, RetryFailure};
pub use snap_rapidapi::SnapRapidApi;
pub use social_rapidapi::SocialRapidApi;
pub use youtube_rapidapi::YoutubeRapidApi;

/// Registry names of the built-in providers.
pub mod names {
    pub use super::allinone_rapidapi::NAME as ALLINONE_RAPIDAPI;
    pub use super::external::NAME as EXTERNAL;
    pub use super::instagram_hikerapi::NAME as INSTAGRAM_HIKERAPI;
    pub use super::snap_rapidapi::NAME as SNAP_RAPIDAPI;
    pub use super::social_rapidapi::NAME as SOCIAL_RAPIDAPI;
    pub use super::youtube_rapidapi::NAME as YOUTUBE_RAPIDAPI;
}

use async_trait::async_trait;
use tracing::warn;

use crate::config::ThirdApiConfig;
use crate::media::Extraction;

/// Builds the dispatcher used by the CLI.
///
/// Declaration order is the fallback order: YouTube details, the all-in-one
/// aggregator, HikerAPI, the snap aggregator, the social aggregator, then the
/// external resolver when `external_ie` is configured. Adapters whose HTTP
/// client cannot be built are skipped with a warning.
///
/// # Errors
///
/// Returns [`ThirdApiError::Configuration`] if `external_ie` is set but invalid.
pub fn build_default_dispatcher(config: &ThirdApiConfig) -> Result<Dispatcher, ThirdApiError> {
    let guard = config
        .guard_path
        .clone()
        .map_or_else(FrequencyGuard::default, FrequencyGuard::new)
        .with_disabled(config.disable_third_api);
    let mut dispatcher = Dispatcher::new(guard)
        .with_namespace(config.guard_namespace.clone())
        .with_options(DispatchOptions::from_config(config));

    let rapidapi_key = config.rapidapi_key();

    register_or_warn(&mut dispatcher, YoutubeRapidApi::new(rapidapi_key.clone()));
    register_or_warn(&mut dispatcher, AllInOneRapidApi::new(rapidapi_key.clone()));
    register_or_warn(&mut dispatcher, InstagramHikerApi::new(config.hikerapi_key()));
    register_or_warn(&mut dispatcher, SnapRapidApi::new(rapidapi_key.clone()));
    register_or_warn(&mut dispatcher, SocialRapidApi::new(rapidapi_key));

    let address = config
        .external_address()
        .map_err(|error| ThirdApiError::configuration(names::EXTERNAL, &error.to_string()))?;
    if let Some(address) = address {
        register_or_warn(
            &mut dispatcher,
            ExternalResolver::new(address).map(|resolver| {
                resolver.with_media_filter(config.media_filter.clone())
            }),
        );
    }

    Ok(dispatcher)
}

fn register_or_warn<P: Provider + 'static>(
    dispatcher: &mut Dispatcher,
    provider: Result<P, ThirdApiError>,
) {
    match provider {
        Ok(provider) => dispatcher.register(Box::new(provider)),
        Err(error) => warn!(
            error = %error,
            "provider unavailable; continuing with remaining providers"
        ),
    }
}

/// Static description of one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    /// Routing name, also part of guard keys.
    pub name: &'static str,
    /// Request URL (or base URL for multi-endpoint APIs).
    pub endpoint: String,
    /// Value of the `x-rapidapi-host` header, if the API is on RapidAPI.
    pub host_header: Option<&'static str>,
    /// Site labels this provider has affinity for; empty means none.
    pub supported_site_hints: &'static [&'static str],
}

impl ProviderIdentity {
    /// Returns true for providers hosted on RapidAPI.
    #[must_use]
    pub fn is_rapidapi(&self) -> bool {
        self.name.ends_with("rapidapi")
    }
}

/// Trait that all provider adapters implement.
///
/// Uses `async_trait` so adapters can live behind `Box<dyn Provider>` in the
/// dispatcher.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the provider's static identity.
    fn identity(&self) -> &ProviderIdentity;

    /// Returns true if this provider has affinity for `hint` (a URL or bare domain).
    fn supports(&self, hint: &str) -> bool {
        supports_site(hint, self.identity().supported_site_hints)
    }

    /// Resolves one input into canonical media.
    async fn resolve(&self, input: &ResolveInput) -> Result<Extraction, ThirdApiError>;
}
