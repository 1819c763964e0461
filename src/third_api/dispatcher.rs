//! Provider dispatcher with routing, guard and ordered fallback.
//!
//! The [`Dispatcher`] owns every registered [`Provider`] and the shared
//! [`FrequencyGuard`]. Each [`Dispatcher::extract`] call:
//!
//! 1. Picks candidates from the selector or from site affinity
//! 2. Checks the guard under `{namespace}-{api}-{input}`; a denial is final
//! 3. Tries candidates in order and returns the first success
//! 4. Raises the **first** error when every candidate fails

use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::config::ThirdApiConfig;
use crate::media::{CanonicalMedia, Extraction, MediaKind, Playlist};

use super::guard::{FrequencyGuard, guard_key};
use super::input::ResolveInput;
use super::utils::content_id;
use super::{Provider, ThirdApiError, names};

/// Providers tried, in order, by the multi-provider selectors.
pub const MUTIL_PROVIDERS: &[&str] = &[
    names::ALLINONE_RAPIDAPI,
    names::SNAP_RAPIDAPI,
    names::SOCIAL_RAPIDAPI,
];

/// Guard label used when no selector is given.
const DEFAULT_GUARD_API: &str = "default";

/// How the caller picked a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiSelector {
    /// YouTube details for YouTube inputs, the general aggregator otherwise.
    Auto,
    /// Fallback chain over the multi-site aggregators.
    Mutil,
    /// One provider by registry name.
    Named(String),
}

impl ApiSelector {
    /// Parses a selector; blank input means "no selector".
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        match value {
            "" => None,
            "auto" => Some(Self::Auto),
            "mutil_api" | "mutil_rapidapi" => Some(Self::Mutil),
            name => Some(Self::Named(name.to_string())),
        }
    }

    /// Label used in guard keys.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Auto => "auto",
            Self::Mutil => "mutil_api",
            Self::Named(name) => name,
        }
    }
}

/// What to do when no provider has affinity for an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingPolicy {
    /// Fail with [`ThirdApiError::NoProvider`].
    Strict,
    /// Try every provider in declaration order.
    #[default]
    Permissive,
}

/// Dispatcher-wide preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Default routing policy for calls that do not pass one.
    pub policy: RoutingPolicy,
    /// Move RapidAPI providers to the front of multi-candidate routes.
    pub prefer_rapidapi: bool,
    /// Drop non-RapidAPI providers from multi-candidate routes.
    pub only_rapidapi: bool,
    /// Media kinds kept in playlist results; empty keeps everything.
    pub media_filter: Vec<MediaKind>,
}

impl DispatchOptions {
    /// Reads preferences from the library configuration.
    ///
    /// Unknown `media_filter` entries are ignored with a warning.
    #[must_use]
    pub fn from_config(config: &ThirdApiConfig) -> Self {
        let media_filter = config
            .media_filter
            .iter()
            .filter_map(|value| match MediaKind::from_str(value) {
                Ok(kind) => Some(kind),
                Err(error) => {
                    warn!(value = %value, error = %error, "ignoring media filter entry");
                    None
                }
            })
            .collect();
        Self {
            policy: RoutingPolicy::default(),
            prefer_rapidapi: config.prefer_rapidapi,
            only_rapidapi: config.only_rapidapi,
            media_filter,
        }
    }
}

/// Ordered provider registry with guard and fallback.
pub struct Dispatcher {
    providers: Vec<Box<dyn Provider>>,
    guard: FrequencyGuard,
    namespace: String,
    options: DispatchOptions,
}

impl Dispatcher {
    /// Creates an empty dispatcher using `guard`.
    #[must_use]
    pub fn new(guard: FrequencyGuard) -> Self {
        Self {
            providers: Vec::new(),
            guard,
            namespace: crate::config::DEFAULT_GUARD_NAMESPACE.to_string(),
            options: DispatchOptions::default(),
        }
    }

    /// Sets the guard key namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replaces the dispatch preferences.
    #[must_use]
    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Registers a provider; registration order is fallback order.
    #[tracing::instrument(skip(self, provider), fields(provider_name))]
    pub fn register(&mut self, provider: Box<dyn Provider>) {
        tracing::Span::current().record("provider_name", provider.identity().name);
        debug!(name = provider.identity().name, "Registering provider");
        self.providers.push(provider);
    }

    /// Returns registered provider names in declaration order.
    #[must_use]
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.identity().name).collect()
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Returns the guard.
    #[must_use]
    pub fn guard(&self) -> &FrequencyGuard {
        &self.guard
    }

    /// Resolves one input using the dispatcher's default routing policy.
    ///
    /// `selector` overrides any selector embedded in the input.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::extract_with_policy`].
    pub async fn extract(
        &self,
        input: &ResolveInput,
        selector: Option<&str>,
    ) -> Result<Extraction, ThirdApiError> {
        self.extract_with_policy(input, selector, self.options.policy)
            .await
    }

    /// Resolves one input with an explicit routing policy.
    ///
    /// # Errors
    ///
    /// - [`ThirdApiError::RateLimited`] / [`ThirdApiError::Disabled`] from the guard
    /// - [`ThirdApiError::UnknownProvider`] for a selector naming no provider
    /// - [`ThirdApiError::NoProvider`] under strict routing without affinity
    /// - the first candidate's error when every candidate fails
    #[tracing::instrument(skip(self, input), fields(input = %input.url()))]
    pub async fn extract_with_policy(
        &self,
        input: &ResolveInput,
        selector: Option<&str>,
        policy: RoutingPolicy,
    ) -> Result<Extraction, ThirdApiError> {
        let selector = selector.or(input.api()).and_then(ApiSelector::parse);
        let api = selector.as_ref().map_or(DEFAULT_GUARD_API, ApiSelector::label);

        // Routing errors must not start a cooldown.
        let candidates = self.candidates(input, selector.as_ref(), policy)?;

        let key = guard_key(&self.namespace, api, input.url());
        self.guard.check_async(key).await?;
        debug!(
            candidates = ?candidates.iter().map(|p| p.identity().name).collect::<Vec<_>>(),
            "Dispatching"
        );

        let mut first_error: Option<ThirdApiError> = None;
        for provider in candidates {
            debug!(provider = provider.identity().name, "Trying provider");
            let outcome = provider
                .resolve(input)
                .await
                .and_then(|extraction| {
                    self.apply_media_filter(provider.identity().name, input, extraction)
                });
            match outcome {
                Ok(extraction) => {
                    info!(
                        provider = provider.identity().name,
                        items = extraction.items().len(),
                        "Resolution successful"
                    );
                    return Ok(extraction);
                }
                Err(error) => {
                    warn!(
                        provider = provider.identity().name,
                        error = %error,
                        "Provider failed, trying next"
                    );
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        Err(first_error.unwrap_or_else(|| ThirdApiError::no_provider(input.url())))
    }

    /// Resolves several inputs independently into one playlist.
    ///
    /// A failed item is skipped unless it is the last one and nothing resolved.
    /// Guard denials stop the whole batch.
    ///
    /// # Errors
    ///
    /// Returns a guard error as soon as one occurs, or the last item's error
    /// when no item resolved.
    pub async fn extract_all(
        &self,
        inputs: &[ResolveInput],
        selector: Option<&str>,
    ) -> Result<Playlist, ThirdApiError> {
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            match self.extract(input, selector).await {
                Ok(Extraction::Single(media)) => results.push(Ok(media)),
                Ok(Extraction::Playlist(playlist)) => {
                    results.extend(playlist.entries.into_iter().map(Ok));
                }
                Err(error) if error.is_guard_denial() => return Err(error),
                Err(error) => results.push(Err(error)),
            }
        }

        let seed: Vec<&str> = inputs.iter().map(ResolveInput::url).collect();
        Ok(Playlist {
            id: content_id(&seed.join("\n")),
            title: None,
            entries: collect_entries(results)?,
        })
    }

    fn candidates(
        &self,
        input: &ResolveInput,
        selector: Option<&ApiSelector>,
        policy: RoutingPolicy,
    ) -> Result<Vec<&dyn Provider>, ThirdApiError> {
        let candidates = match selector {
            Some(ApiSelector::Named(name)) => return Ok(vec![self.named(name)?]),
            Some(ApiSelector::Auto) => {
                let name = if input.is_youtube() {
                    names::YOUTUBE_RAPIDAPI
                } else {
                    names::ALLINONE_RAPIDAPI
                };
                return Ok(vec![self.named(name)?]);
            }
            Some(ApiSelector::Mutil) => {
                let chain: Vec<&dyn Provider> = self
                    .providers
                    .iter()
                    .map(AsRef::as_ref)
                    .filter(|p| MUTIL_PROVIDERS.contains(&p.identity().name))
                    .collect();
                let matching: Vec<&dyn Provider> = chain
                    .iter()
                    .copied()
                    .filter(|p| p.supports(input.url()))
                    .collect();
                if matching.is_empty() { chain } else { matching }
            }
            None => {
                let matching: Vec<&dyn Provider> = self
                    .providers
                    .iter()
                    .map(AsRef::as_ref)
                    .filter(|p| p.supports(input.url()))
                    .collect();
                if !matching.is_empty() {
                    matching
                } else if policy == RoutingPolicy::Strict {
                    return Err(ThirdApiError::no_provider(input.url()));
                } else {
                    self.providers.iter().map(AsRef::as_ref).collect()
                }
            }
        };

        let candidates = self.apply_preferences(candidates);
        if candidates.is_empty() {
            return Err(ThirdApiError::no_provider(input.url()));
        }
        Ok(candidates)
    }

    fn named(&self, name: &str) -> Result<&dyn Provider, ThirdApiError> {
        self.providers
            .iter()
            .map(AsRef::as_ref)
            .find(|p| p.identity().name == name)
            .ok_or_else(|| ThirdApiError::unknown_provider(name, &self.provider_names()))
    }

    fn apply_preferences<'a>(&self, mut candidates: Vec<&'a dyn Provider>) -> Vec<&'a dyn Provider> {
        if self.options.only_rapidapi {
            candidates.retain(|p| p.identity().is_rapidapi());
        } else if self.options.prefer_rapidapi {
            // sort_by_key is stable
            candidates.sort_by_key(|p| !p.identity().is_rapidapi());
        }
        candidates
    }

    fn apply_media_filter(
        &self,
        provider: &str,
        input: &ResolveInput,
        extraction: Extraction,
    ) -> Result<Extraction, ThirdApiError> {
        let filter = &self.options.media_filter;
        match extraction {
            Extraction::Playlist(mut playlist) if !filter.is_empty() => {
                playlist
                    .entries
                    .retain(|entry| filter.contains(&entry.media_kind));
                if playlist.entries.is_empty() {
                    return Err(ThirdApiError::provider_fatal(
                        provider,
                        input.url(),
                        "no entries match the media filter",
                    ));
                }
                Ok(Extraction::Playlist(playlist))
            }
            other => Ok(other),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("providers", &self.provider_names())
            .field("guard", &self.guard)
            .field("namespace", &self.namespace)
            .field("options", &self.options)
            .finish()
    }
}

/// Collects independently resolved playlist items.
///
/// Failed items are logged and skipped, except the last item when nothing
/// else resolved: its error is returned instead of an empty list.
///
/// # Errors
///
/// Returns the last item's error when every item failed.
pub fn collect_entries(
    results: Vec<Result<CanonicalMedia, ThirdApiError>>,
) -> Result<Vec<CanonicalMedia>, ThirdApiError> {
    let total = results.len();
    let mut entries = Vec::with_capacity(total);
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(media) => entries.push(media),
            Err(error) if index + 1 == total && entries.is_empty() => return Err(error),
            Err(error) => warn!(index, error = %error, "Skipping failed playlist item"),
        }
    }
    Ok(entries)
}
