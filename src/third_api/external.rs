//! Out-of-process resolver reached over loopback HTTP.
//!
//! The resolver process listens on the `external_ie` address and answers
//! `of/extract` with a list of media entries. Non-DRM entries need request
//! headers from `of/nondrmsecrets`; those are fetched once and kept in a
//! [`SecretCache`] until [`ExternalResolver::invalidate_secrets`] is called.

use std::collections::BTreeMap;
use std::future::Future;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::media::{
    CanonicalMedia, Codecs, Extraction, FormatDescriptor, NO_CODEC, Playlist,
};

use super::classify::{ResponseShape, is_non_empty};
use super::dispatcher::collect_entries;
use super::http_client::build_provider_http_client;
use super::input::ResolveInput;
use super::retry::RetryDriver;
use super::utils::{
    array_field, attempt, bool_field, content_id, retry_failure_to_error, str_field,
    url_extension,
};
use super::{Provider, ProviderIdentity, ThirdApiError};

/// Registry name of this provider.
pub const NAME: &str = "external";

const EXTRACT_PATH: &str = "of/extract";
const SECRETS_PATH: &str = "of/nondrmsecrets";

/// Count limit meaning "no limit".
pub const NO_COUNT_LIMIT: i64 = -1;

// ==================== Response shapes ====================

struct ExtractShape;

impl ResponseShape for ExtractShape {
    fn has_media(&self, payload: &Value) -> bool {
        payload.get("error").is_none()
            && is_non_empty(payload.pointer("/ExtractResult/Medias"))
    }

    fn error_message(&self, payload: &Value) -> Option<String> {
        error_field(payload)
    }
}

struct SecretsShape;

impl ResponseShape for SecretsShape {
    fn has_media(&self, payload: &Value) -> bool {
        payload.get("error").is_none() && payload.get("Headers").is_some_and(Value::is_object)
    }

    fn error_message(&self, payload: &Value) -> Option<String> {
        error_field(payload)
    }
}

fn error_field(payload: &Value) -> Option<String> {
    match payload.get("error")? {
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

// ==================== SecretCache ====================

/// Memoized request headers for non-DRM media.
///
/// Owned by the resolver; the first successful fetch is reused until
/// [`SecretCache::invalidate`].
#[derive(Debug, Default)]
pub struct SecretCache {
    headers: Mutex<Option<BTreeMap<String, String>>>,
}

impl SecretCache {
    /// Returns the cached headers, fetching them with `fetch` on a miss.
    ///
    /// Concurrent callers wait for the same fetch. A failed fetch leaves the
    /// cache empty.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `fetch`.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<BTreeMap<String, String>, ThirdApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<BTreeMap<String, String>, ThirdApiError>>,
    {
        let mut guard = self.headers.lock().await;
        if let Some(headers) = guard.as_ref() {
            return Ok(headers.clone());
        }
        let headers = fetch().await?;
        *guard = Some(headers.clone());
        Ok(headers)
    }

    /// Drops the cached headers.
    pub async fn invalidate(&self) {
        *self.headers.lock().await = None;
    }

    /// Returns true if headers are cached.
    pub async fn is_cached(&self) -> bool {
        self.headers.lock().await.is_some()
    }
}

// ==================== ExternalResolver ====================

/// Resolves inputs through the external resolver process.
pub struct ExternalResolver {
    client: Client,
    identity: ProviderIdentity,
    media_filter: Vec<String>,
    count_limit: i64,
    secrets: SecretCache,
    retry: RetryDriver,
}

impl ExternalResolver {
    /// Creates a resolver for the process listening at `address`
    /// (a normalized `http://host:port` URL).
    ///
    /// # Errors
    ///
    /// Returns [`ThirdApiError`] if HTTP client construction fails.
    pub fn new(address: impl Into<String>) -> Result<Self, ThirdApiError> {
        Ok(Self {
            client: build_provider_http_client(NAME)?,
            identity: ProviderIdentity {
                name: NAME,
                endpoint: address.into().trim_end_matches('/').to_string(),
                host_header: None,
                supported_site_hints: &["onlyfans"],
            },
            media_filter: Vec::new(),
            count_limit: NO_COUNT_LIMIT,
            secrets: SecretCache::default(),
            retry: RetryDriver::default(),
        })
    }

    /// Media kinds the resolver should keep.
    #[must_use]
    pub fn with_media_filter(mut self, media_filter: Vec<String>) -> Self {
        self.media_filter = media_filter;
        self
    }

    /// Caps the number of entries the resolver returns.
    #[must_use]
    pub fn with_count_limit(mut self, count_limit: i64) -> Self {
        self.count_limit = count_limit;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryDriver) -> Self {
        self.retry = retry;
        self
    }

    /// Forgets the memoized non-DRM headers.
    pub async fn invalidate_secrets(&self) {
        self.secrets.invalidate().await;
    }

    /// Returns the secret cache.
    #[must_use]
    pub fn secrets(&self) -> &SecretCache {
        &self.secrets
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{path}", self.identity.endpoint)
    }

    async fn fetch_secrets(&self, input: &str) -> Result<BTreeMap<String, String>, ThirdApiError> {
        let url = self.url_for(SECRETS_PATH);
        debug!(%url, "fetching non-DRM secrets");
        let payload = self
            .retry
            .run(|| attempt(NAME, self.client.get(&url), &SecretsShape))
            .await
            .map_err(|failure| retry_failure_to_error(NAME, input, failure))?;

        Ok(payload
            .get("Headers")
            .and_then(Value::as_object)
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|(name, value)| {
                        value.as_str().map(|value| (name.clone(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn media_entry(
        &self,
        media: &Value,
        input: &str,
    ) -> Result<CanonicalMedia, ThirdApiError> {
        let id = format!(
            "{}_{}",
            str_field(media, "PostID").unwrap_or_default(),
            str_field(media, "MediaID").unwrap_or_default()
        );
        if bool_field(media, "IsDrm") {
            return Err(ThirdApiError::provider_fatal(
                NAME,
                input,
                &format!("media {id} is DRM-protected"),
            ));
        }
        let Some(uri) = str_field(media, "MediaURI") else {
            return Err(ThirdApiError::provider_fatal(
                NAME,
                input,
                &format!("media {id} has no URI"),
            ));
        };

        let headers = self
            .secrets
            .get_or_fetch(|| self.fetch_secrets(input))
            .await?;

        let kind = media_type(media);
        let format = match kind.as_str() {
            "photo" => FormatDescriptor::image(uri.clone()),
            "audio" => FormatDescriptor::new(
                uri.clone(),
                Codecs {
                    video: Some(NO_CODEC.to_string()),
                    audio: None,
                },
            ),
            _ => FormatDescriptor::new(uri.clone(), Codecs::default()),
        }
        .with_ext(url_extension(&uri))
        .with_quality(Some("none-drm".to_string()));

        let mut entry = CanonicalMedia::new(id, NAME)
            .with_title(str_field(media, "Title"))
            .with_formats(vec![format]);
        entry.webpage_url = Some(input.to_string());
        entry.http_headers = headers;
        Ok(entry)
    }
}

/// Lowercased entry type with image aliases folded into `photo`.
fn media_type(media: &Value) -> String {
    let kind = str_field(media, "Type").unwrap_or_default().to_ascii_lowercase();
    match kind.as_str() {
        "gif" | "image" | "img" => "photo".to_string(),
        _ => kind,
    }
}

impl std::fmt::Debug for ExternalResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalResolver")
            .field("endpoint", &self.identity.endpoint)
            .field("media_filter", &self.media_filter)
            .field("count_limit", &self.count_limit)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Provider for ExternalResolver {
    fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    #[tracing::instrument(skip(self, input), fields(provider = NAME, input = %input.url()))]
    async fn resolve(&self, input: &ResolveInput) -> Result<Extraction, ThirdApiError> {
        let url = self.url_for(EXTRACT_PATH);
        let body = json!({
            "URL": input.url(),
            "DisableCache": false,
            "MediaFilter": self.media_filter,
            "CountLimit": self.count_limit,
        });
        debug!(%url, "requesting external extraction");

        let payload = self
            .retry
            .run(|| attempt(NAME, self.client.post(&url).json(&body), &ExtractShape))
            .await
            .map_err(|failure| retry_failure_to_error(NAME, input.url(), failure))?;

        let result = payload.get("ExtractResult").unwrap_or(&Value::Null);
        if bool_field(result, "IsFromCache") {
            debug!("external result served from cache");
        }
        if let Some(proxy) = str_field(&payload, "Proxy") {
            debug!(%proxy, "external resolver reported a proxy");
        }
        let medias = array_field(result, "Medias");

        let mut results = Vec::with_capacity(medias.len());
        for media in medias {
            results.push(self.media_entry(media, input.url()).await);
        }
        if results.len() == 1
            && results[0].is_ok()
            && let Some(Ok(entry)) = results.pop()
        {
            info!(id = %entry.id, "resolved single external media");
            return Ok(Extraction::Single(entry));
        }

        let entries = collect_entries(results)?;
        info!(entries = entries.len(), "resolved external playlist");

        Ok(Extraction::Playlist(Playlist {
            id: content_id(input.url()),
            title: str_field(result, "Title"),
            entries,
        }))
    }
}
