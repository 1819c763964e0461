//! Canonical media description shared by every provider adapter.
//!
//! Provider responses differ wildly in shape; adapters map them into
//! [`CanonicalMedia`] and [`FormatDescriptor`] so the rest of the host system
//! only ever sees one schema.
//!
//! # Overview
//!
//! - [`CanonicalMedia`] - One resolved media item with its formats
//! - [`FormatDescriptor`] - One playable variant (video, audio or image)
//! - [`FormatRole`] - What a format carries, derived from its codecs
//! - [`MediaKind`] - What an item is, derived from its formats
//! - [`Extraction`] - A single item or a playlist of items
//! - [`normalize_mime`] - MIME type to codec pair normalization

mod codecs;

pub use codecs::{CodecAssignment, Codecs, normalize_mime};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sentinel codec value meaning "this stream is absent".
pub const NO_CODEC: &str = "none";

/// Overall kind of a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaKind {
    Video,
    Audio,
    Photo,
    Mixed,
}

impl MediaKind {
    /// Derives the kind of an item from the roles of its formats.
    ///
    /// Images mixed with any playable stream give [`MediaKind::Mixed`]. An item
    /// without formats is reported as [`MediaKind::Video`].
    #[must_use]
    pub fn from_formats(formats: &[FormatDescriptor]) -> Self {
        let has_image = formats.iter().any(|f| f.role == FormatRole::Image);
        let has_video = formats
            .iter()
            .any(|f| matches!(f.role, FormatRole::Combined | FormatRole::VideoOnly));
        let has_audio = formats.iter().any(|f| f.role == FormatRole::AudioOnly);

        match (has_image, has_video, has_audio) {
            (true, false, false) => Self::Photo,
            (true, _, _) => Self::Mixed,
            (false, false, true) => Self::Audio,
            _ => Self::Video,
        }
    }

    /// Returns the stable uppercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "VIDEO",
            Self::Audio => "AUDIO",
            Self::Photo => "PHOTO",
            Self::Mixed => "MIXED",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "VIDEO" => Ok(Self::Video),
            "AUDIO" => Ok(Self::Audio),
            "PHOTO" | "IMAGE" => Ok(Self::Photo),
            "MIXED" => Ok(Self::Mixed),
            other => Err(format!("unknown media kind '{other}'")),
        }
    }
}

/// What a single format carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatRole {
    Combined,
    VideoOnly,
    AudioOnly,
    Image,
}

impl FormatRole {
    /// Derives the role from a codec pair, using the `"none"` sentinels.
    #[must_use]
    pub fn from_codecs(video_codec: Option<&str>, audio_codec: Option<&str>) -> Self {
        match (video_codec, audio_codec) {
            (Some(NO_CODEC), Some(NO_CODEC)) => Self::Image,
            (Some(NO_CODEC), _) => Self::AudioOnly,
            (_, Some(NO_CODEC)) => Self::VideoOnly,
            _ => Self::Combined,
        }
    }
}

/// A thumbnail image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Thumbnail {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: None,
            height: None,
        }
    }
}

/// One subtitle track in one serialization format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub url: String,
    pub ext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One playable (or viewable) variant of a media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub url: String,
    pub ext: Option<String>,
    /// `"none"` means the format has no video stream.
    pub video_codec: Option<String>,
    /// `"none"` means the format has no audio stream.
    pub audio_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    pub filesize_bytes: Option<u64>,
    pub quality_label: Option<String>,
    pub role: FormatRole,
}

impl FormatDescriptor {
    /// Creates a format whose role is derived from the given codecs.
    #[must_use]
    pub fn new(url: impl Into<String>, codecs: Codecs) -> Self {
        let role = FormatRole::from_codecs(codecs.video.as_deref(), codecs.audio.as_deref());
        Self {
            url: url.into(),
            ext: None,
            video_codec: codecs.video,
            audio_codec: codecs.audio,
            width: None,
            height: None,
            fps: None,
            bitrate_kbps: None,
            filesize_bytes: None,
            quality_label: None,
            role,
        }
    }

    /// Creates an image format (both codecs set to the `"none"` sentinel).
    #[must_use]
    pub fn image(url: impl Into<String>) -> Self {
        Self::new(
            url,
            Codecs {
                video: Some(NO_CODEC.to_string()),
                audio: Some(NO_CODEC.to_string()),
            },
        )
    }

    #[must_use]
    pub fn with_ext(mut self, ext: Option<String>) -> Self {
        self.ext = ext.filter(|value| !value.is_empty());
        self
    }

    #[must_use]
    pub fn with_dimensions(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_quality(mut self, label: Option<String>) -> Self {
        self.quality_label = label.filter(|value| !value.is_empty());
        self
    }

    #[must_use]
    pub fn with_filesize(mut self, bytes: Option<u64>) -> Self {
        self.filesize_bytes = bytes.filter(|value| *value > 0);
        self
    }

    #[must_use]
    pub fn with_bitrate_kbps(mut self, kbps: Option<f64>) -> Self {
        self.bitrate_kbps = kbps.filter(|value| *value > 0.0);
        self
    }

    #[must_use]
    pub fn with_fps(mut self, fps: Option<f64>) -> Self {
        self.fps = fps.filter(|value| *value > 0.0);
        self
    }
}

/// The normalized, provider-agnostic description of one media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMedia {
    pub id: String,
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Duration in seconds.
    pub duration: Option<f64>,
    pub thumbnails: Vec<Thumbnail>,
    pub formats: Vec<FormatDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subtitles: BTreeMap<String, Vec<SubtitleTrack>>,
    pub media_kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webpage_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    /// Upload date as `YYYYMMDD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_live: Option<bool>,
    /// Request headers needed to fetch the format URLs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub http_headers: BTreeMap<String, String>,
    /// Name of the provider that produced this item.
    pub provider: String,
}

impl CanonicalMedia {
    /// Creates an item with no formats; `media_kind` is recomputed by
    /// [`CanonicalMedia::with_formats`].
    #[must_use]
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            duration: None,
            thumbnails: Vec::new(),
            formats: Vec::new(),
            subtitles: BTreeMap::new(),
            media_kind: MediaKind::Video,
            uploader: None,
            channel_id: None,
            webpage_url: None,
            view_count: None,
            like_count: None,
            upload_date: None,
            is_live: None,
            http_headers: BTreeMap::new(),
            provider: provider.into(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title.filter(|value| !value.is_empty());
        self
    }

    #[must_use]
    pub fn with_duration(mut self, seconds: Option<f64>) -> Self {
        self.duration = seconds.filter(|value| value.is_finite() && *value > 0.0);
        self
    }

    /// Adds a thumbnail unless the URL is empty.
    #[must_use]
    pub fn with_thumbnail(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|value| !value.is_empty()) {
            self.thumbnails.push(Thumbnail::new(url));
        }
        self
    }

    /// Replaces the formats and recomputes the media kind.
    #[must_use]
    pub fn with_formats(mut self, formats: Vec<FormatDescriptor>) -> Self {
        self.media_kind = MediaKind::from_formats(&formats);
        self.formats = formats;
        self
    }

    /// Returns true when the item has at least one format.
    #[must_use]
    pub fn has_formats(&self) -> bool {
        !self.formats.is_empty()
    }
}

/// Result of resolving one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Extraction {
    /// The input resolved to one media item.
    Single(CanonicalMedia),
    /// The input resolved to several independent items.
    Playlist(Playlist),
}

impl Extraction {
    /// Returns every media item in this extraction.
    #[must_use]
    pub fn items(&self) -> Vec<&CanonicalMedia> {
        match self {
            Self::Single(media) => vec![media],
            Self::Playlist(playlist) => playlist.entries.iter().collect(),
        }
    }

    /// Returns the single media item, if this is not a playlist.
    #[must_use]
    pub fn as_single(&self) -> Option<&CanonicalMedia> {
        match self {
            Self::Single(media) => Some(media),
            Self::Playlist(_) => None,
        }
    }
}

/// A collection of independently resolved media items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub title: Option<String>,
    pub entries: Vec<CanonicalMedia>,
}
