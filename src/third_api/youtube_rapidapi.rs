//! YouTube details provider on RapidAPI ("YouTube Media Downloader").
//!
//! The [`YoutubeRapidApi`] adapter looks a video up by id and maps the video,
//! audio, subtitle and channel details into [`CanonicalMedia`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::media::{
    CanonicalMedia, CodecAssignment, Extraction, FormatDescriptor, SubtitleTrack, Thumbnail,
    normalize_mime,
};

use super::classify::{ResponseShape, is_non_empty};
use super::http_client::build_provider_http_client;
use super::input::ResolveInput;
use super::retry::RetryDriver;
use super::utils::{
    array_field, attempt, bool_field, f64_field, retry_failure_to_error, str_field, u32_field,
    u64_field,
};
use super::{Provider, ProviderIdentity, ThirdApiError};

/// Registry name of this provider.
pub const NAME: &str = "youtube_rapidapi";

const DEFAULT_BASE_URL: &str = "https://youtube-media-downloader.p.rapidapi.com";
const API_HOST: &str = "youtube-media-downloader.p.rapidapi.com";
const DETAILS_PATH: &str = "/v2/video/details";

/// Subtitle serializations offered for every caption track.
const SUBTITLE_EXTS: [&str; 6] = ["json3", "srv1", "srv2", "srv3", "ttml", "vtt"];

static BARE_VIDEO_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Za-z_-]{11}$")
        .unwrap_or_else(|e| panic!("invalid static regex for bare video ids: {e}"))
});

// ==================== Response shape ====================

struct DetailsShape;

impl ResponseShape for DetailsShape {
    fn has_media(&self, payload: &Value) -> bool {
        is_non_empty(payload.pointer("/videos/items"))
            || is_non_empty(payload.pointer("/audios/items"))
    }

    fn error_message(&self, payload: &Value) -> Option<String> {
        let root = node_error(Some(payload));
        let videos = node_error(payload.get("videos"));
        if let Some(error) = root.or(videos) {
            return Some(error);
        }
        if is_non_empty(payload.get("videos")) {
            return None;
        }
        node_error(payload.get("audios"))
    }
}

/// Reads `errorId`/`reason` from one response node; `Success` is not an error.
fn node_error(node: Option<&Value>) -> Option<String> {
    let node = node?;
    let error_id = str_field(node, "errorId")?;
    if error_id.eq_ignore_ascii_case("success") {
        return None;
    }
    let reason = str_field(node, "reason").unwrap_or_else(|| "error".to_string());
    Some(format!("{error_id}, {reason}"))
}

// ==================== YoutubeRapidApi ====================

/// Resolves YouTube video ids through the RapidAPI details endpoint.
pub struct YoutubeRapidApi {
    client: Client,
    identity: ProviderIdentity,
    api_key: Option<String>,
    retry: RetryDriver,
}

impl YoutubeRapidApi {
    /// Creates the adapter against the production endpoint.
    ///
    /// A missing key is reported when resolving, not here.
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
                endpoint: format!("{}{DETAILS_PATH}", base_url.trim_end_matches('/')),
                host_header: Some(API_HOST),
                supported_site_hints: &["youtube", "youtu"],
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

    fn details_url(&self, video_id: &str) -> Result<Url, ThirdApiError> {
        let mut url = Url::parse(&self.identity.endpoint).map_err(|error| {
            ThirdApiError::configuration(NAME, &format!("invalid endpoint: {error}"))
        })?;
        url.query_pairs_mut()
            .append_pair("videoId", video_id)
            .append_pair("urlAccess", "normal")
            .append_pair("videos", "auto")
            .append_pair("audios", "auto");
        Ok(url)
    }
}

impl std::fmt::Debug for YoutubeRapidApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoutubeRapidApi")
            .field("endpoint", &self.identity.endpoint)
            .field("has_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Provider for YoutubeRapidApi {
    fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    #[tracing::instrument(skip(self, input), fields(provider = NAME, input = %input.url()))]
    async fn resolve(&self, input: &ResolveInput) -> Result<Extraction, ThirdApiError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ThirdApiError::missing_key(NAME, "rapidapi_key"));
        };
        let video_id = input
            .video_id()
            .or_else(|| {
                BARE_VIDEO_ID_RE
                    .is_match(input.url())
                    .then(|| input.url().to_string())
            })
            .ok_or_else(|| ThirdApiError::invalid_input(input.url(), "no YouTube video id"))?;

        let url = self.details_url(&video_id)?;
        debug!(%video_id, "requesting video details");

        let payload = self
            .retry
            .run(|| {
                let request = self
                    .client
                    .get(url.clone())
                    .header("x-rapidapi-key", api_key)
                    .header("x-rapidapi-host", API_HOST);
                attempt(NAME, request, &DetailsShape)
            })
            .await
            .map_err(|failure| retry_failure_to_error(NAME, input.url(), failure))?;

        let media = parse_details(&payload, &video_id);
        if !media.has_formats() {
            return Err(ThirdApiError::provider_fatal(NAME, input.url(), "no formats found"));
        }
        info!(id = %media.id, formats = media.formats.len(), "resolved video details");
        Ok(Extraction::Single(media))
    }
}

// ==================== Mapping ====================

fn parse_details(info: &Value, video_id: &str) -> CanonicalMedia {
    let id = str_field(info, "id").unwrap_or_else(|| video_id.to_string());
    let channel = info.get("channel").cloned().unwrap_or(Value::Null);

    let mut formats: Vec<FormatDescriptor> = Vec::new();
    for audio in array_field(info.get("audios").unwrap_or(&Value::Null), "items") {
        if let Some(format) = audio_format(audio) {
            formats.push(format);
        }
    }
    for video in array_field(info.get("videos").unwrap_or(&Value::Null), "items") {
        if let Some(format) = video_format(video) {
            formats.push(format);
        }
    }

    let mut media = CanonicalMedia::new(id.clone(), NAME)
        .with_title(str_field(info, "title"))
        .with_duration(f64_field(info, "lengthSeconds"))
        .with_formats(formats);
    media.description = str_field(info, "description");
    media.view_count = u64_field(info, "viewCount");
    media.like_count = u64_field(info, "likeCount");
    media.channel_id = str_field(&channel, "id");
    media.uploader = str_field(&channel, "name").or_else(|| media.channel_id.clone());
    media.upload_date = str_field(info, "publishedTime").and_then(|t| iso_to_yyyymmdd(&t));
    media.is_live = info.get("isLiveNow").and_then(Value::as_bool);
    media.webpage_url = Some(format!("https://www.youtube.com/watch?v={id}"));
    media.thumbnails = array_field(info, "thumbnails")
        .iter()
        .filter_map(|thumb| {
            str_field(thumb, "url").map(|url| Thumbnail {
                url,
                width: u32_field(thumb, "width"),
                height: u32_field(thumb, "height"),
            })
        })
        .collect();
    media.subtitles = parse_subtitles(info);
    media
}

fn audio_format(audio: &Value) -> Option<FormatDescriptor> {
    let url = str_field(audio, "url")?;
    let mime = str_field(audio, "mimeType");
    let codecs = normalize_mime(mime.as_deref(), CodecAssignment::AudioOnly, None, None);
    Some(
        FormatDescriptor::new(url, codecs)
            .with_ext(str_field(audio, "extension"))
            .with_filesize(u64_field(audio, "size"))
            .with_quality(Some("audio only".to_string())),
    )
}

fn video_format(video: &Value) -> Option<FormatDescriptor> {
    let url = str_field(video, "url")?;
    let mime = str_field(video, "mimeType");
    let mode = if bool_field(video, "hasAudio") {
        CodecAssignment::Both
    } else {
        CodecAssignment::VideoOnly
    };
    let codecs = normalize_mime(mime.as_deref(), mode, None, None);
    Some(
        FormatDescriptor::new(url, codecs)
            .with_ext(str_field(video, "extension"))
            .with_filesize(u64_field(video, "size"))
            .with_dimensions(u32_field(video, "width"), u32_field(video, "height"))
            .with_quality(str_field(video, "quality")),
    )
}

fn parse_subtitles(info: &Value) -> BTreeMap<String, Vec<SubtitleTrack>> {
    let mut subtitles = BTreeMap::new();
    let Some(items) = info.pointer("/subtitles/items").and_then(Value::as_array) else {
        return subtitles;
    };
    for item in items {
        let (Some(code), Some(url)) = (str_field(item, "code"), str_field(item, "url")) else {
            continue;
        };
        let name = str_field(item, "text");
        let tracks = SUBTITLE_EXTS
            .iter()
            .map(|ext| SubtitleTrack {
                url: format!("{url}&fmt={ext}"),
                ext: (*ext).to_string(),
                name: name.clone(),
            })
            .collect();
        subtitles.insert(code, tracks);
    }
    subtitles
}

/// Converts an ISO-8601 timestamp (`2024-03-01T10:00:00Z`) into `YYYYMMDD`.
fn iso_to_yyyymmdd(timestamp: &str) -> Option<String> {
    let date = timestamp.trim().get(..10)?;
    let mut parts = date.split('-');
    let (year, month, day) = (parts.next()?, parts.next()?, parts.next()?);
    let valid = year.len() == 4
        && month.len() == 2
        && day.len() == 2
        && [year, month, day]
            .iter()
            .all(|part| part.chars().all(|c| c.is_ascii_digit()));
    valid.then(|| format!("{year}{month}{day}"))
}
