//! General-purpose aggregator on RapidAPI ("Download All-in-One Lite").
//!
//! The [`AllInOneRapidApi`] adapter accepts any page URL and returns a flat
//! `medias` list of video, audio and image variants. It is the default target
//! of the `auto` selector for non-YouTube inputs.

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
    array_field, attempt, bool_field, content_id, f64_field, parse_duration,
    retry_failure_to_error, str_field, u32_field, u64_field,
};
use super::{Provider, ProviderIdentity, ThirdApiError};

/// Registry name of this provider.
pub const NAME: &str = "allinone_mutil_rapidapi";

const DEFAULT_BASE_URL: &str = "https://download-all-in-one-lite.p.rapidapi.com";
const API_HOST: &str = "download-all-in-one-lite.p.rapidapi.com";
const AUTOLINK_PATH: &str = "/autolink";

/// Sites the aggregator is known to handle.
pub const SUPPORTED_SITES: &[&str] = &[
    "Tiktok", "Douyin", "Capcut", "Threads", "Instagram", "Facebook", "Kuaishou", "Espn",
    "Pinterest", "imdb", "imgur", "ifunny", "Izlesene", "Reddit", "Youtube", "Twitter", "Vimeo",
    "Snapchat", "Bilibili", "Dailymotion", "Sharechat", "Likee", "Linkedin", "Tumblr", "Hipi",
    "Telegram", "Getstickerpack", "Bitchute", "Febspot", "9GAG", "okeru", "Rumble",
    "Streamable", "Ted", "SohuTv", "Pornbox", "Xvideos", "Xnxx", "Xiaohongshu", "Ixigua",
    "Weibo", "Miaopai", "Meipai", "Xiaoying", "Yingke", "Sina", "Bluesky", "Soundcloud",
    "Mixcloud", "Spotify", "Zingmp3", "Bandcamp", "X", "akillitv",
];

/// Resolves arbitrary page URLs through the all-in-one aggregator.
pub struct AllInOneRapidApi {
    client: Client,
    identity: ProviderIdentity,
    api_key: Option<String>,
    retry: RetryDriver,
}

impl AllInOneRapidApi {
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
                supported_site_hints: SUPPORTED_SITES,
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

impl std::fmt::Debug for AllInOneRapidApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllInOneRapidApi")
            .field("endpoint", &self.identity.endpoint)
            .field("has_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Provider for AllInOneRapidApi {
    fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    #[tracing::instrument(skip(self, input), fields(provider = NAME, input = %input.url()))]
    async fn resolve(&self, input: &ResolveInput) -> Result<Extraction, ThirdApiError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ThirdApiError::missing_key(NAME, "rapidapi_key"));
        };
        let body = json!({ "url": input.url() });
        debug!(endpoint = %self.identity.endpoint, "requesting autolink");

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

        let media = parse_autolink(&payload, input.url());
        if !media.has_formats() {
            return Err(ThirdApiError::provider_fatal(NAME, input.url(), "no formats found"));
        }
        info!(id = %media.id, formats = media.formats.len(), kind = media.media_kind.as_str(), "resolved autolink");
        Ok(Extraction::Single(media))
    }
}

fn parse_autolink(info: &Value, url: &str) -> CanonicalMedia {
    let title = str_field(info, "title");
    let id = str_field(info, "id")
        .unwrap_or_else(|| content_id(title.as_deref().unwrap_or(url)));

    let medias = array_field(info, "medias");
    let has_is_audio_field = medias.iter().any(|media| media.get("is_audio").is_some());
    let formats = medias
        .iter()
        .filter_map(|media| media_format(media, has_is_audio_field))
        .collect();

    let mut media = CanonicalMedia::new(id, NAME)
        .with_title(title)
        .with_duration(parse_duration(info.get("duration")))
        .with_thumbnail(str_field(info, "thumbnail"))
        .with_formats(formats);
    media.uploader = str_field(info, "author");
    media.webpage_url = Some(url.to_string());
    media
}

/// Maps one `medias` entry; `is_audio` separates combined from video-only
/// streams only when some entry in the response carries it.
fn media_format(media: &Value, has_is_audio_field: bool) -> Option<FormatDescriptor> {
    let url = str_field(media, "url")?;
    let ext = str_field(media, "extension");
    let mime = str_field(media, "mimeType");
    let quality = str_field(media, "quality");
    let bitrate_kbps = f64_field(media, "bitrate").map(|bps| bps / 1000.0);

    let format = match str_field(media, "type").as_deref() {
        Some("video") if !has_is_audio_field || bool_field(media, "is_audio") => {
            let codecs = normalize_mime(
                mime.as_deref(),
                CodecAssignment::Both,
                ext.as_deref(),
                ext.as_deref(),
            );
            FormatDescriptor::new(url, codecs).with_quality(quality)
        }
        Some("video") => {
            let codecs = normalize_mime(
                mime.as_deref(),
                CodecAssignment::VideoOnly,
                ext.as_deref(),
                None,
            );
            FormatDescriptor::new(url, codecs)
                .with_quality(Some(format!("{}(video only)", quality.unwrap_or_default())))
        }
        Some("audio") => {
            let codecs = normalize_mime(
                mime.as_deref(),
                CodecAssignment::AudioOnly,
                None,
                ext.as_deref(),
            );
            FormatDescriptor::new(url, codecs).with_quality(Some("audio only".to_string()))
        }
        Some("image") => FormatDescriptor::image(url).with_quality(Some("image".to_string())),
        _ => return None,
    };

    Some(
        format
            .with_ext(ext)
            .with_filesize(u64_field(media, "data_size"))
            .with_dimensions(u32_field(media, "width"), u32_field(media, "height"))
            .with_fps(f64_field(media, "fps"))
            .with_bitrate_kbps(bitrate_kbps),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::media::{FormatRole, MediaKind};
    use crate::third_api::classify::{RetryVerdict, classify};

    #[test]
    fn test_supports_known_sites_only() {
        let provider = AllInOneRapidApi::new(Some("k".to_string())).unwrap();
        assert!(provider.supports("https://www.tiktok.com/@u/video/1"));
        assert!(provider.supports("https://x.com/u/status/1"));
        assert!(provider.supports("9gag.com"));
        assert!(!provider.supports("https://unknown-site.example/v"));
    }

    #[test]
    fn test_is_audio_field_splits_combined_and_video_only() {
        let info = json!({
            "title": "clip",
            "duration": 12,
            "medias": [
                {"type": "video", "is_audio": true, "url": "https://cdn.example.com/av.mp4",
                 "extension": "mp4", "quality": "hd", "bitrate": 2_000_000, "data_size": 42},
                {"type": "video", "is_audio": false, "url": "https://cdn.example.com/v.mp4",
                 "extension": "mp4", "quality": "1080p"},
                {"type": "audio", "url": "https://cdn.example.com/a.m4a", "extension": "m4a"}
            ]
        });
        let media = parse_autolink(&info, "https://www.tiktok.com/@u/video/1");

        let roles: Vec<FormatRole> = media.formats.iter().map(|f| f.role).collect();
        assert_eq!(
            roles,
            vec![FormatRole::Combined, FormatRole::VideoOnly, FormatRole::AudioOnly]
        );
        assert_eq!(media.formats[0].bitrate_kbps, Some(2000.0));
        assert_eq!(media.formats[0].filesize_bytes, Some(42));
        assert_eq!(media.formats[0].video_codec.as_deref(), Some("mp4"));
        assert_eq!(media.formats[1].quality_label.as_deref(), Some("1080p(video only)"));
        assert_eq!(media.formats[2].audio_codec.as_deref(), Some("m4a"));
        assert_eq!(media.duration, Some(12.0));
    }

    #[test]
    fn test_without_is_audio_field_video_is_combined() {
        let info = json!({"medias": [{"type": "video", "url": "https://cdn.example.com/v.mp4"}]});
        let media = parse_autolink(&info, "https://vimeo.com/1");
        assert_eq!(media.formats[0].role, FormatRole::Combined);
    }

    #[test]
    fn test_images_only_is_photo() {
        let info = json!({
            "title": "gallery",
            "medias": [
                {"type": "image", "url": "https://cdn.example.com/1.jpg", "extension": "jpg"},
                {"type": "image", "url": "https://cdn.example.com/2.jpg", "extension": "jpg"}
            ]
        });
        let media = parse_autolink(&info, "https://www.instagram.com/p/x");
        assert_eq!(media.media_kind, MediaKind::Photo);
        assert_eq!(media.formats.len(), 2);
    }

    #[test]
    fn test_id_falls_back_to_title_digest() {
        let info = json!({"title": "same", "medias": []});
        let a = parse_autolink(&info, "https://a.example/1");
        let b = parse_autolink(&info, "https://a.example/2");
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 32);

        let with_id = parse_autolink(&json!({"id": 7, "medias": []}), "u");
        assert_eq!(with_id.id, "7");
    }

    #[test]
    fn test_unknown_media_types_are_skipped() {
        let info = json!({"medias": [{"type": "document", "url": "https://cdn.example.com/a.pdf"}]});
        assert!(!parse_autolink(&info, "u").has_formats());
    }

    #[test]
    fn test_shape_error_message() {
        let payload = json!({"error": true, "message": "Link not supported", "status": 404});
        assert_eq!(
            classify(Some(&payload), &MediasShape),
            RetryVerdict::Fatal("Link not supported, status: 404".to_string())
        );
    }
}
