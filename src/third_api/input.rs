//! Input parsing: routing hints carried inside the URL and site affinity.
//!
//! Callers may attach a provider selector and a pre-extracted video id to the
//! input URL, either as `__third_api__` / `__video_id__` query parameters or in
//! a smuggled fragment (`#__youtubedl_smuggle=<urlencoded JSON>`). The
//! routing parameters are stripped before the URL reaches any provider.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use url::Url;

/// Query/smuggle key carrying the provider selector.
pub const API_PARAM: &str = "__third_api__";

/// Query/smuggle key carrying a pre-extracted video id.
pub const VIDEO_ID_PARAM: &str = "__video_id__";

/// Query key forcing third-party resolution upstream; stripped like [`API_PARAM`].
pub const FORCE_PARAM: &str = "__force_third_api__";

const SMUGGLE_KEY: &str = "__youtubedl_smuggle";

static YOUTUBE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)^(?:https?://)?(?:[a-z0-9-]+\.)*(?:youtube\.com|youtube-nocookie\.com|youtu\.be)/
        (?:watch\?(?:.*&)?v=|shorts/|embed/|live/|v/)?([0-9A-Za-z_-]{11})(?:[^0-9A-Za-z_-]|$)",
    )
    .unwrap_or_else(|e| panic!("invalid static regex for youtube ids: {e}"))
});

/// One input to resolve, with its routing hints separated out.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveInput {
    raw: String,
    url: String,
    api: Option<String>,
    video_id: Option<String>,
    smuggled: Map<String, Value>,
}

impl ResolveInput {
    /// Parses a raw input, extracting smuggled data and routing parameters.
    ///
    /// Smuggled values win over query parameters.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (unsmuggled, smuggled) = unsmuggle_url(raw);

        let api = smuggled_str(&smuggled, API_PARAM).or_else(|| query_param(&unsmuggled, API_PARAM));
        let video_id = smuggled_str(&smuggled, VIDEO_ID_PARAM)
            .or_else(|| query_param(&unsmuggled, VIDEO_ID_PARAM));

        Self {
            raw: raw.to_string(),
            url: remove_third_api_params(&unsmuggled),
            api,
            video_id,
            smuggled,
        }
    }

    /// Overrides the provider selector.
    #[must_use]
    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        self.api = Some(api.into()).filter(|value| !value.is_empty());
        self
    }

    /// Overrides the video id.
    #[must_use]
    pub fn with_video_id(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into()).filter(|value| !value.is_empty());
        self
    }

    /// The input exactly as given.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The cleaned URL sent to providers.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The embedded provider selector, if any.
    #[must_use]
    pub fn api(&self) -> Option<&str> {
        self.api.as_deref()
    }

    /// The explicit video id, else one derived from a YouTube URL.
    #[must_use]
    pub fn video_id(&self) -> Option<String> {
        self.video_id
            .clone()
            .or_else(|| youtube_video_id(&self.url))
    }

    /// The remaining smuggled data.
    #[must_use]
    pub fn smuggled(&self) -> &Map<String, Value> {
        &self.smuggled
    }

    /// Returns true if the cleaned URL points at YouTube.
    #[must_use]
    pub fn is_youtube(&self) -> bool {
        is_youtube_url(&self.url)
    }
}

/// Appends `data` to `url` as a smuggled fragment, merging any existing data.
#[must_use]
pub fn smuggle_url(url: &str, data: &Map<String, Value>) -> String {
    let (base, mut merged) = unsmuggle_url(url);
    for (key, value) in data {
        merged.insert(key.clone(), value.clone());
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(SMUGGLE_KEY, &Value::Object(merged).to_string())
        .finish();
    format!("{base}#{encoded}")
}

/// Splits smuggled data off `url`.
///
/// Returns the URL without the fragment and the decoded data; an absent or
/// undecodable fragment yields an empty map.
#[must_use]
pub fn unsmuggle_url(url: &str) -> (String, Map<String, Value>) {
    let marker = format!("#{SMUGGLE_KEY}");
    if !url.contains(&marker) {
        return (url.to_string(), Map::new());
    }
    let Some((base, fragment)) = url.rsplit_once('#') else {
        return (url.to_string(), Map::new());
    };

    let data = url::form_urlencoded::parse(fragment.as_bytes())
        .find(|(key, _)| key == SMUGGLE_KEY)
        .and_then(|(_, json)| serde_json::from_str::<Value>(&json).ok())
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();
    (base.to_string(), data)
}

/// Removes the routing parameters (`__third_api__`, `__force_third_api__`
/// and `__video_id__`).
///
/// Unparseable inputs are returned unchanged.
#[must_use]
pub fn remove_third_api_params(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.query().is_none() {
        return url.to_string();
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| key != API_PARAM && key != FORCE_PARAM && key != VIDEO_ID_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    parsed.to_string()
}

/// Extracts the 11-character video id from a YouTube URL.
#[must_use]
pub fn youtube_video_id(url: &str) -> Option<String> {
    YOUTUBE_ID_RE
        .captures(url.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Returns true if `url` is a YouTube URL.
#[must_use]
pub fn is_youtube_url(url: &str) -> bool {
    host_of(url).is_some_and(|host| {
        let host = host.trim_start_matches("www.").trim_start_matches("m.");
        host == "youtu.be"
            || host == "youtube.com"
            || host.ends_with(".youtube.com")
            || host == "youtube-nocookie.com"
    })
}

/// Checks a URL or bare domain against a site list.
///
/// The host is lowercased, `www.` and any port are stripped, and each of
/// the first two labels is matched case-insensitively against `sites`.
/// An empty site list never matches.
#[must_use]
pub fn supports_site(hint: &str, sites: &[&str]) -> bool {
    if sites.is_empty() {
        return false;
    }
    let Some(host) = host_of(hint) else {
        return false;
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let host = host.split(':').next().unwrap_or_default();

    host.split('.')
        .take(2)
        .filter(|label| !label.is_empty())
        .any(|label| sites.iter().any(|site| site.eq_ignore_ascii_case(label)))
}

/// Returns the lowercased host (with port, if any) of a URL or bare domain.
fn host_of(hint: &str) -> Option<String> {
    let hint = hint.trim();
    if hint.is_empty() {
        return None;
    }
    if let Ok(parsed) = Url::parse(hint)
        && let Some(host) = parsed.host_str()
    {
        return Some(match parsed.port() {
            Some(port) => format!("{host}:{port}").to_ascii_lowercase(),
            None => host.to_ascii_lowercase(),
        });
    }
    let without_scheme = hint.split_once("://").map_or(hint, |(_, rest)| rest);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .rsplit('@')
        .next()
        .unwrap_or_default();
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

fn smuggled_str(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn query_param(url: &str, key: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    // ==================== Site affinity ====================

    #[test]
    fn test_supports_site_url_and_bare_domain() {
        let sites = ["Tiktok", "Instagram", "X"];
        assert!(supports_site("https://www.tiktok.com/@a/video/1", &sites));
        assert!(supports_site("instagram.com", &sites));
        assert!(supports_site("https://x.com/a/status/1", &sites));
        assert!(supports_site("https://m.tiktok.com:8443/v/1", &sites));
        assert!(!supports_site("https://vimeo.com/1", &sites));
    }

    #[test]
    fn test_supports_site_only_first_two_labels() {
        let sites = ["com"];
        assert!(!supports_site("https://a.b.com/x", &sites));
        assert!(supports_site("https://a.com/x", &sites));
    }

    #[test]
    fn test_supports_site_empty_list_never_matches() {
        assert!(!supports_site("https://tiktok.com", &[]));
        assert!(!supports_site("", &["tiktok"]));
    }

    // ==================== Smuggling ====================

    #[test]
    fn test_smuggle_and_unsmuggle() {
        let mut data = Map::new();
        data.insert(API_PARAM.to_string(), json!("youtube_rapidapi"));
        data.insert(VIDEO_ID_PARAM.to_string(), json!("dQw4w9WgXcQ"));

        let smuggled = smuggle_url("https://example.com/v?a=1", &data);
        assert!(smuggled.contains("#__youtubedl_smuggle="));

        let (url, decoded) = unsmuggle_url(&smuggled);
        assert_eq!(url, "https://example.com/v?a=1");
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_unsmuggle_without_fragment() {
        let (url, data) = unsmuggle_url("https://example.com/v#t=10");
        assert_eq!(url, "https://example.com/v#t=10");
        assert!(data.is_empty());
    }

    #[test]
    fn test_unsmuggle_corrupt_data_is_empty() {
        let (url, data) = unsmuggle_url("https://example.com/v#__youtubedl_smuggle=%7Bnope");
        assert_eq!(url, "https://example.com/v");
        assert!(data.is_empty());
    }

    // ==================== ResolveInput ====================

    #[test]
    fn test_parse_query_selector_is_stripped() {
        let input = ResolveInput::parse(
            "https://www.tiktok.com/v/1?lang=en&__third_api__=snap_mutil_rapidapi&__force_third_api__=1",
        );
        assert_eq!(input.api(), Some("snap_mutil_rapidapi"));
        assert_eq!(input.url(), "https://www.tiktok.com/v/1?lang=en");
    }

    #[test]
    fn test_parse_smuggled_selector_wins() {
        let mut data = Map::new();
        data.insert(API_PARAM.to_string(), json!("youtube_rapidapi"));
        data.insert(VIDEO_ID_PARAM.to_string(), json!("abcdefghijk"));
        let raw = smuggle_url(
            "https://example.com/v?__third_api__=allinone_mutil_rapidapi",
            &data,
        );

        let input = ResolveInput::parse(&raw);
        assert_eq!(input.api(), Some("youtube_rapidapi"));
        assert_eq!(input.video_id().as_deref(), Some("abcdefghijk"));
        assert_eq!(input.url(), "https://example.com/v");
    }

    #[test]
    fn test_parse_plain_input_unchanged() {
        let input = ResolveInput::parse("  https://vimeo.com/123  ");
        assert_eq!(input.url(), "https://vimeo.com/123");
        assert_eq!(input.api(), None);
        assert!(!input.is_youtube());
    }

    #[test]
    fn test_with_api_override() {
        let input = ResolveInput::parse("https://vimeo.com/1").with_api("mutil_api");
        assert_eq!(input.api(), Some("mutil_api"));
        assert_eq!(ResolveInput::parse("x").with_api("").api(), None);
    }

    // ==================== YouTube ====================

    #[test]
    fn test_youtube_video_id_variants() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?t=3",
            "https://m.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
        ] {
            assert_eq!(youtube_video_id(url).as_deref(), Some("dQw4w9WgXcQ"), "{url}");
            assert!(is_youtube_url(url), "{url}");
        }
        assert_eq!(youtube_video_id("https://vimeo.com/dQw4w9WgXcQ"), None);
    }

    #[test]
    fn test_remove_params_keeps_other_query() {
        assert_eq!(
            remove_third_api_params("https://a.com/p?__third_api__=x"),
            "https://a.com/p"
        );
        assert_eq!(remove_third_api_params("not a url"), "not a url");
    }
}
