//! Universal fallback aggregator on RapidAPI ("Snap Video").
//!
//! Takes a form-encoded `url` and flags each media entry with
//! `videoAvailable` / `audioAvailable`. It declares no site affinity, so it
//! only runs when selected explicitly or through permissive fallback.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::media::{CanonicalMedia, CodecAssignment, Extraction, FormatDescriptor, normalize_mime};

use super::classify::MediasShape;
use super::http_client::build_provider_http_client;
use super::input::ResolveInput;
use super::retry::RetryDriver;
use super::utils::{
    array_field, attempt, bool_field, content_id, parse_duration, retry_failure_to_error,
    str_field,
};
use super::{Provider, ProviderIdentity, ThirdApiError};

/// Registry name of this provider.
pub const NAME: &str = "snap_mutil_rapidapi";

const DEFAULT_BASE_URL: &str = "https://snap-video3.p.rapidapi.com";
const API_HOST: &str = "snap-video3.p.rapidapi.com";
const DOWNLOAD_PATH: &str = "/download";

/// Resolves page URLs through the snap-video aggregator.
pub struct SnapRapidApi {
    client: Client,
    identity: ProviderIdentity,
    api_key: Option<String>,
    retry: RetryDriver,
}

impl SnapRapidApi {
    /// Creates the adapter against the production endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ThirdApiError`] if HTTP client construction fails.
    pub fn new(api_key: Option<String>) -> Result<Self, ThirdApiError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Creates the adapter with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ThirdApiError`] if HTTP client construction fails.
    pub fn with_base_url(
        api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ThirdApiError> {
        let base_url = base_url.into();
        Ok(Self {
            client: build_provider_http_client(NAME)?,
            identity: ProviderIdentity {
                name: NAME,
                endpoint: format!("{}{DOWNLOAD_PATH}", base_url.trim_end_matches('/')),
                host_header: Some(API_HOST),
                supported_site_hints: &[],
            },
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            retry: RetryDriver::default(),
        })
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryDriver) -> Self {
        self.retry = retry;
        self
    }
}

impl std::fmt::Debug for SnapRapidApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapRapidApi")
            .field("endpoint", &self.identity.endpoint)
            .field("has_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Provider for SnapRapidApi {
    fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    #[tracing::instrument(skip(self, input), fields(provider = NAME, input = %input.url()))]
    async fn resolve(&self, input: &ResolveInput) -> Result<Extraction, ThirdApiError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ThirdApiError::missing_key(NAME, "rapidapi_key"));
        };
        let form = format!("url={}", urlencoding::encode(input.url()));
        debug!(endpoint = %self.identity.endpoint, "requesting download links");

        let payload = self
            .retry
            .run(|| {
                let request = self
                    .client
                    .post(&self.identity.endpoint)
                    .header("x-rapidapi-key", api_key)
                    .header("x-rapidapi-host", API_HOST)
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(form.clone());
                attempt(NAME, request, &MediasShape)
            })
            .await
            .map_err(|failure| retry_failure_to_error(NAME, input.url(), failure))?;

        let media = parse_download(&payload, input.url());
        if !media.has_formats() {
            return Err(ThirdApiError::provider_fatal(NAME, input.url(), "no formats found"));
        }
        info!(id = %media.id, formats = media.formats.len(), "resolved download links");
        Ok(Extraction::Single(media))
    }
}

fn parse_download(info: &Value, url: &str) -> CanonicalMedia {
    let title = str_field(info, "title");
    let id = content_id(title.as_deref().unwrap_or(url));

    let formats = array_field(info, "medias")
        .iter()
        .filter_map(media_format)
        .collect();

    let mut media = CanonicalMedia::new(id, NAME)
        .with_title(title)
        .with_duration(parse_duration(info.get("duration")))
        .with_thumbnail(str_field(info, "thumbnail"))
        .with_formats(formats);
    media.webpage_url = Some(url.to_string());
    media
}

/// Maps one entry using its availability flags. The container extension
/// stands in for unknown codecs.
fn media_format(media: &Value) -> Option<FormatDescriptor> {
    let url = str_field(media, "url")?;
    let ext = str_field(media, "extension");
    let quality = str_field(media, "quality");
    let (mode, label) = match (
        bool_field(media, "videoAvailable"),
        bool_field(media, "audioAvailable"),
    ) {
        (true, true) => (CodecAssignment::Both, quality),
        (true, false) => (
            CodecAssignment::VideoOnly,
            Some(format!("{}(video only)", quality.unwrap_or_default())),
        ),
        (false, true) => (CodecAssignment::AudioOnly, Some("audio only".to_string())),
        (false, false) => {
            return Some(
                FormatDescriptor::image(url)
                    .with_ext(ext)
                    .with_quality(Some("image".to_string())),
            );
        }
    };
    let codecs = normalize_mime(None, mode, ext.as_deref(), ext.as_deref());

    Some(FormatDescriptor::new(url, codecs).with_ext(ext).with_quality(label))
}
