//! Instagram provider backed by HikerAPI.
//!
//! Posts are looked up by shortcode (from `/p/`, `/reel/` and `/tv/` URLs) or
//! by numeric media id; stories by username. Photos, videos and carousels map
//! to single items or playlists.
//!
//! HikerAPI uses its own credential (`hikerapi_key`) rather than the shared
//! RapidAPI key.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::media::{
    CanonicalMedia, Codecs, Extraction, FormatDescriptor, MediaKind, Playlist, Thumbnail,
};

use super::classify::{ResponseShape, is_non_empty};
use super::dispatcher::collect_entries;
use super::http_client::build_provider_http_client;
use super::input::ResolveInput;
use super::retry::RetryDriver;
use super::utils::{
    array_field, attempt, f64_field, retry_failure_to_error, str_field, u32_field, u64_field,
    url_extension,
};
use super::{Provider, ProviderIdentity, ThirdApiError};

/// Registry name of this provider.
pub const NAME: &str = "instagram_hikerapi";

const DEFAULT_BASE_URL: &str = "https://api.hikerapi.com";

const MEDIA_TYPE_PHOTO: u64 = 1;
const MEDIA_TYPE_VIDEO: u64 = 2;
const MEDIA_TYPE_CAROUSEL: u64 = 8;

static POST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)instagram\.com/(?:[^/?#]+/)?(?:p|reels?|tv)/([A-Za-z0-9_-]+)")
        .unwrap_or_else(|e| panic!("invalid static regex for instagram posts: {e}"))
});

static STORIES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)instagram\.com/stories/([A-Za-z0-9._]+)")
        .unwrap_or_else(|e| panic!("invalid static regex for instagram stories: {e}"))
});

// ==================== Input classification ====================

/// What an Instagram input points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstagramTarget {
    /// A post addressed by shortcode.
    PostCode(String),
    /// A post addressed by numeric media id.
    PostId(String),
    /// The current stories of a user.
    Stories(String),
}

impl InstagramTarget {
    /// Classifies a URL or bare media id.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
            return Some(Self::PostId(input.to_string()));
        }
        if let Some(caps) = STORIES_RE.captures(input)
            && let Some(username) = caps.get(1)
            && !username.as_str().eq_ignore_ascii_case("highlights")
        {
            return Some(Self::Stories(username.as_str().to_string()));
        }
        POST_RE
            .captures(input)
            .and_then(|caps| caps.get(1))
            .map(|code| Self::PostCode(code.as_str().to_string()))
    }
}

// ==================== Response shapes ====================

struct PostShape;

impl ResponseShape for PostShape {
    fn has_media(&self, payload: &Value) -> bool {
        status_ok(payload) && is_non_empty(payload.get("media_or_ad"))
    }

    fn error_message(&self, payload: &Value) -> Option<String> {
        Some(describe_error(payload))
    }
}

struct StoriesShape;

impl ResponseShape for StoriesShape {
    fn has_media(&self, payload: &Value) -> bool {
        is_non_empty(payload.get("reel"))
    }

    fn error_message(&self, payload: &Value) -> Option<String> {
        Some(describe_error(payload))
    }
}

fn status_ok(payload: &Value) -> bool {
    str_field(payload, "status").is_some_and(|status| status.eq_ignore_ascii_case("ok"))
}

fn describe_error(payload: &Value) -> String {
    str_field(payload, "detail")
        .or_else(|| str_field(payload, "error"))
        .or_else(|| str_field(payload, "message"))
        .unwrap_or_else(|| payload.to_string())
}

// ==================== InstagramHikerApi ====================

/// Resolves Instagram posts and stories through HikerAPI.
pub struct InstagramHikerApi {
    client: Client,
    identity: ProviderIdentity,
    api_key: Option<String>,
    prefer_video: bool,
    retry: RetryDriver,
}

impl InstagramHikerApi {
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
        Ok(Self {
            client: build_provider_http_client(NAME)?,
            identity: ProviderIdentity {
                name: NAME,
                endpoint: base_url.into().trim_end_matches('/').to_string(),
                host_header: None,
                supported_site_hints: &["instagram", "instagr"],
            },
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            prefer_video: true,
            retry: RetryDriver::default(),
        })
    }

    /// Keeps only video entries in story playlists when any exist (default on).
    #[must_use]
    pub fn with_prefer_video(mut self, prefer_video: bool) -> Self {
        self.prefer_video = prefer_video;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryDriver) -> Self {
        self.retry = retry;
        self
    }

    async fn call_api(
        &self,
        api_key: &str,
        path: &str,
        params: &[(&str, &str)],
        shape: &dyn ResponseShape,
        input: &str,
    ) -> Result<Value, ThirdApiError> {
        let mut url = Url::parse(&format!("{}{path}", self.identity.endpoint)).map_err(|error| {
            ThirdApiError::configuration(NAME, &format!("invalid endpoint: {error}"))
        })?;
        url.query_pairs_mut().extend_pairs(params.iter());
        debug!(%url, "calling hikerapi");

        self.retry
            .run(|| {
                let request = self
                    .client
                    .get(url.clone())
                    .header("x-access-key", api_key)
                    .header("accept", "application/json");
                attempt(NAME, request, shape)
            })
            .await
            .map_err(|failure| retry_failure_to_error(NAME, input, failure))
    }

    async fn post(
        &self,
        api_key: &str,
        path: &str,
        param: (&str, &str),
        input: &str,
    ) -> Result<Extraction, ThirdApiError> {
        let payload = self
            .call_api(api_key, path, &[param], &PostShape, input)
            .await?;
        let item = payload.get("media_or_ad").unwrap_or(&Value::Null);

        match parse_item(item, None) {
            ParsedItem::Media(media) if media.has_formats() => Ok(Extraction::Single(media)),
            ParsedItem::Media(_) => {
                Err(ThirdApiError::provider_fatal(NAME, input, "no formats found"))
            }
            carousel @ ParsedItem::Carousel { .. } => {
                let (id, title) = carousel.header();
                let entries = collect_entries(carousel.flatten(input))?;
                if entries.is_empty() {
                    return Err(ThirdApiError::provider_fatal(NAME, input, "no formats found"));
                }
                Ok(Extraction::Playlist(Playlist { id, title, entries }))
            }
        }
    }

    async fn stories(
        &self,
        api_key: &str,
        username: &str,
        input: &str,
    ) -> Result<Extraction, ThirdApiError> {
        let payload = self
            .call_api(
                api_key,
                "/v2/user/stories/by/username",
                &[("username", username)],
                &StoriesShape,
                input,
            )
            .await?;
        let reel = payload.get("reel").unwrap_or(&Value::Null);
        let user = reel.get("user").unwrap_or(&Value::Null);

        let results = array_field(reel, "items")
            .iter()
            .flat_map(|item| parse_item(item, None).flatten(input))
            .collect();
        let mut entries = collect_entries(results)?;
        if entries.is_empty() {
            return Err(ThirdApiError::provider_fatal(NAME, input, "no stories found"));
        }
        if self.prefer_video {
            entries = prefer_videos(entries);
        }

        let username = str_field(user, "username").unwrap_or_else(|| username.to_string());
        Ok(Extraction::Playlist(Playlist {
            id: str_field(user, "pk_id")
                .or_else(|| str_field(user, "pk"))
                .unwrap_or_else(|| username.clone()),
            title: Some(format!("{username} Story")),
            entries,
        }))
    }
}

impl std::fmt::Debug for InstagramHikerApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstagramHikerApi")
            .field("endpoint", &self.identity.endpoint)
            .field("has_key", &self.api_key.is_some())
            .field("prefer_video", &self.prefer_video)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Provider for InstagramHikerApi {
    fn identity(&self) -> &ProviderIdentity {
        &self.identity
    }

    #[tracing::instrument(skip(self, input), fields(provider = NAME, input = %input.url()))]
    async fn resolve(&self, input: &ResolveInput) -> Result<Extraction, ThirdApiError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ThirdApiError::missing_key(NAME, "hikerapi_key"));
        };
        let target = InstagramTarget::parse(input.url()).ok_or_else(|| {
            ThirdApiError::invalid_input(input.url(), "not an Instagram post or stories URL")
        })?;
        debug!(?target, "resolving instagram target");

        let extraction = match &target {
            InstagramTarget::PostCode(code) => {
                self.post(api_key, "/v2/media/info/by/code", ("code", code), input.url())
                    .await?
            }
            InstagramTarget::PostId(id) => {
                self.post(api_key, "/v2/media/info/by/id", ("id", id), input.url())
                    .await?
            }
            InstagramTarget::Stories(username) => {
                self.stories(api_key, username, input.url()).await?
            }
        };
        info!(items = extraction.items().len(), "resolved instagram target");
        Ok(extraction)
    }
}

// ==================== Mapping ====================

enum ParsedItem {
    Media(CanonicalMedia),
    Carousel {
        id: String,
        title: Option<String>,
        children: Vec<ParsedItem>,
    },
}

impl ParsedItem {
    fn header(&self) -> (String, Option<String>) {
        match self {
            Self::Media(media) => (media.id.clone(), media.title.clone()),
            Self::Carousel { id, title, .. } => (id.clone(), title.clone()),
        }
    }

    /// Flattens nested carousels; items without formats become errors.
    fn flatten(self, input: &str) -> Vec<Result<CanonicalMedia, ThirdApiError>> {
        match self {
            Self::Media(media) if media.has_formats() => vec![Ok(media)],
            Self::Media(media) => vec![Err(ThirdApiError::provider_fatal(
                NAME,
                input,
                &format!("no formats found for item {}", media.id),
            ))],
            Self::Carousel { children, .. } => children
                .into_iter()
                .flat_map(|child| child.flatten(input))
                .collect(),
        }
    }
}

fn parse_item(item: &Value, parent_url: Option<&str>) -> ParsedItem {
    let username = item
        .pointer("/user/username")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let id = str_field(item, "pk")
        .or_else(|| str_field(item, "id"))
        .unwrap_or_default();
    let title = item
        .pointer("/caption/text")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map_or_else(|| format!("Post by {username}"), str::to_string);
    let thumbnail = str_field(item, "thumbnail_url").or_else(|| {
        item.pointer("/image_versions2/candidates/0/url")
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    let webpage_url = if let Some(code) = str_field(item, "code") {
        Some(format!("https://www.instagram.com/p/{code}"))
    } else if str_field(item, "product_type").as_deref() == Some("story") {
        Some(format!("https://www.instagram.com/stories/{username}/{id}"))
    } else {
        parent_url.map(str::to_string)
    };

    let media_type = u64_field(item, "media_type").unwrap_or_default();
    if media_type == MEDIA_TYPE_CAROUSEL {
        let children = array_field(item, "carousel_media")
            .iter()
            .map(|child| parse_item(child, webpage_url.as_deref()))
            .collect();
        return ParsedItem::Carousel {
            id,
            title: Some(title),
            children,
        };
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut formats = Vec::new();
    let mut duration = None;
    match media_type {
        MEDIA_TYPE_PHOTO => {
            for candidate in item
                .pointer("/image_versions2/candidates")
                .and_then(Value::as_array)
                .map_or(&[][..], Vec::as_slice)
            {
                let Some(url) = str_field(candidate, "url") else {
                    continue;
                };
                if !seen.insert(url.clone()) {
                    continue;
                }
                formats.push(
                    FormatDescriptor::image(url.clone())
                        .with_ext(url_extension(&url))
                        .with_dimensions(u32_field(candidate, "width"), u32_field(candidate, "height")),
                );
            }
        }
        MEDIA_TYPE_VIDEO => {
            duration = f64_field(item, "video_duration");
            for version in array_field(item, "video_versions") {
                let Some(url) = str_field(version, "url") else {
                    continue;
                };
                if !seen.insert(url.clone()) {
                    continue;
                }
                formats.push(
                    FormatDescriptor::new(url.clone(), Codecs::default())
                        .with_ext(url_extension(&url))
                        .with_dimensions(u32_field(version, "width"), u32_field(version, "height")),
                );
            }
        }
        other => debug!(media_type = other, "unsupported instagram media type"),
    }

    let mut media = CanonicalMedia::new(id, NAME)
        .with_title(Some(title))
        .with_duration(duration)
        .with_formats(formats);
    if let Some(url) = thumbnail {
        media.thumbnails.push(Thumbnail::new(url));
    }
    media.uploader = Some(username).filter(|name| !name.is_empty());
    media.webpage_url = webpage_url;
    ParsedItem::Media(media)
}

/// Keeps only video entries when at least one exists.
fn prefer_videos(entries: Vec<CanonicalMedia>) -> Vec<CanonicalMedia> {
    if entries.iter().any(|entry| entry.media_kind == MediaKind::Video) {
        entries
            .into_iter()
            .filter(|entry| entry.media_kind == MediaKind::Video)
            .collect()
    } else {
        entries
    }
}
