//! Social-media aggregator on RapidAPI ("Auto Download All In One Big").
//!
//! Same request layout as the lite aggregator but reports `duration` in
//! milliseconds and carries an `author`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::media::{CanonicalMedia, CodecAssignment, Extraction, FormatDescriptor, normalize_mime};

use super::classify::MediasShape;
use super::http_client::build_provider_http_client;
use super::input::ResolveInput;
use super::retry::RetryDriver;
use super::utils::{
    array_field, attempt, content_id, f64_field, retry_failure_to_error, str_field,
};
use super::{Provider, ProviderIdentity, ThirdApiError};

/// Registry name of this provider.
pub const NAME: &str = "social_rapidapi";

const DEFAULT_BASE_URL: &str = "https://auto-download-all-in-one-big.p.rapidapi.com";
const API_HOST: &str = "auto-download-all-in-one-big.p.rapidapi.com";
const AUTOLINK_PATH: &str = "/v1/social/autolink";

/// Resolves social-media URLs through the big all-in-one aggregator.
pub struct SocialRapidApi {
    client: Client,
    identity: ProviderIdentity,
    api_key: Option<String>,
    retry: RetryDriver,
}

impl SocialRapidApi {
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
                endpoint: format!("{}{AUTOLINK_PATH}", base_url.trim_end_matches('/')),
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

impl std::fmt::Debug for SocialRapidApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocialRapidApi")
            .field("endpoint", &self.identity.endpoint)
            .field("has_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Provider for SocialRapidApi {
    fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    #[tracing::instrument(skip(self, input), fields(provider = NAME, input = %input.url()))]
    async fn resolve(&self, input: &ResolveInput) -> Result<Extraction, ThirdApiError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ThirdApiError::missing_key(NAME, "rapidapi_key"));
        };
        let body = json!({ "url": input.url() });
        debug!(endpoint = %self.identity.endpoint, "requesting social autolink");

        let payload = self
            .retry
            .run(|| {
                let request = self
                    .client
                    .post(&self.identity.endpoint)
                    .header("x-rapidapi-key", api_key)
                    .header("x-rapidapi-host", API_HOST)
                    .json(&body);
                attempt(NAME, request, &MediasShape)
            })
            .await
            .map_err(|failure| retry_failure_to_error(NAME, input.url(), failure))?;

        let media = parse_social(&payload, input.url());
        if !media.has_formats() {
            return Err(ThirdApiError::provider_fatal(NAME, input.url(), "no formats found"));
        }
        info!(id = %media.id, formats = media.formats.len(), "resolved social autolink");
        Ok(Extraction::Single(media))
    }
}

fn parse_social(info: &Value, url: &str) -> CanonicalMedia {
    let title = str_field(info, "title");
    let id = content_id(title.as_deref().unwrap_or(url));

    let formats = array_field(info, "medias")
        .iter()
        .filter_map(|media| {
            let media_url = str_field(media, "url")?;
            let ext = str_field(media, "extension");
            let (mode, quality) = match str_field(media, "type").as_deref() {
                Some("video") => (CodecAssignment::Both, str_field(media, "quality")),
                Some("audio") => (CodecAssignment::AudioOnly, Some("audio only".to_string())),
                _ => return None,
            };
            let codecs = normalize_mime(None, mode, ext.as_deref(), ext.as_deref());
            Some(
                FormatDescriptor::new(media_url, codecs)
                    .with_ext(ext)
                    .with_quality(quality),
            )
        })
        .collect();

    let mut media = CanonicalMedia::new(id, NAME)
        .with_title(title)
        .with_duration(f64_field(info, "duration").map(|ms| ms / 1000.0))
        .with_thumbnail(str_field(info, "thumbnail"))
        .with_formats(formats);
    media.uploader = str_field(info, "author");
    media.webpage_url = Some(url.to_string());
    media
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::media::FormatRole;
    use crate::third_api::classify::{RetryVerdict, classify};

    #[test]
    fn test_duration_is_milliseconds_and_author_is_uploader() {
        let info = json!({
            "title": "dance",
            "author": "someone",
            "duration": 15_500,
            "thumbnail": "https://cdn.example.com/t.jpg",
            "medias": [
                {"type": "video", "url": "https://cdn.example.com/v.mp4", "extension": "mp4", "quality": "hd_no_watermark"},
                {"type": "audio", "url": "https://cdn.example.com/a.mp3", "extension": "mp3"}
            ]
        });
        let media = parse_social(&info, "https://www.tiktok.com/@someone/video/1");
        assert_eq!(media.duration, Some(15.5));
        assert_eq!(media.uploader.as_deref(), Some("someone"));
        assert_eq!(media.thumbnails.len(), 1);
        assert_eq!(media.formats[0].role, FormatRole::Combined);
        assert_eq!(media.formats[1].role, FormatRole::AudioOnly);
        assert_eq!(media.formats[1].audio_codec.as_deref(), Some("mp3"));
    }

    #[test]
    fn test_video_codecs_fall_back_to_extension() {
        let info = json!({
            "medias": [{"type": "video", "url": "https://cdn.example.com/v.mp4", "extension": "mp4"}]
        });
        let media = parse_social(&info, "https://www.tiktok.com/@someone/video/2");
        let format = &media.formats[0];
        assert_eq!(format.video_codec.as_deref(), Some("mp4"));
        assert_eq!(format.audio_codec.as_deref(), Some("mp4"));
        assert_eq!(format.role, FormatRole::Combined);
    }

    #[test]
    fn test_error_without_message() {
        let payload = json!({"error": "bad link"});
        assert_eq!(
            classify(Some(&payload), &MediasShape),
            RetryVerdict::Fatal("bad link".to_string())
        );
    }
}
