//! MIME type to codec normalization.
//!
//! Providers describe formats with a MIME type such as
//! `video/mp4; codecs="avc1.64001F, mp4a.40.2"`, a bare `audio/webm`, or
//! nothing at all. [`normalize_mime`] turns that into the canonical
//! `{video_codec, audio_codec}` pair. Downstream consumers decide mux/demux
//! behavior from these fields, so the normalizer prefers a caller-supplied
//! default (usually the container extension) over leaving them empty.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::NO_CODEC;

static CODECS_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)codecs\s*=\s*"?([^";]+)"?"#)
        .unwrap_or_else(|e| panic!("invalid static regex for codecs parameter: {e}"))
});

const VIDEO_CODEC_PREFIXES: &[&str] = &[
    "avc1", "avc3", "h264", "hev1", "hvc1", "h265", "dvh1", "dvhe", "vp8", "vp9", "vp09", "av01",
    "mp4v", "theora",
];

const AUDIO_CODEC_PREFIXES: &[&str] = &[
    "mp4a", "aac", "opus", "vorbis", "ac-3", "ec-3", "flac", "mp3", "alac", "pcm",
];

/// Which codec fields the caller wants assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecAssignment {
    /// Assign both video and audio codecs.
    Both,
    /// Assign the video codec; audio is forced to `"none"`.
    VideoOnly,
    /// Assign the audio codec; video is forced to `"none"`.
    AudioOnly,
    /// Infer from the MIME major type.
    Infer,
}

/// A normalized codec pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Codecs {
    pub video: Option<String>,
    pub audio: Option<String>,
}

impl Codecs {
    fn pair(video: Option<String>, audio: Option<String>) -> Self {
        Self { video, audio }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MajorType {
    Video,
    Audio,
    Image,
}

#[derive(Debug)]
struct ParsedMime {
    major: MajorType,
    subtype: String,
    video_codec: Option<String>,
    audio_codec: Option<String>,
}

/// Normalizes a MIME type into a codec pair.
///
/// When `mime_type` is absent or not a video/audio/image type, the supplied
/// defaults are used. Explicit `codecs` parameters win over codecs implied by
/// the container subtype, which win over the defaults.
#[must_use]
pub fn normalize_mime(
    mime_type: Option<&str>,
    mode: CodecAssignment,
    default_video: Option<&str>,
    default_audio: Option<&str>,
) -> Codecs {
    let none = || Some(NO_CODEC.to_string());
    let default_video = default_video.filter(|v| !v.is_empty()).map(str::to_string);
    let default_audio = default_audio.filter(|v| !v.is_empty()).map(str::to_string);

    let Some(parsed) = mime_type.and_then(parse_mime) else {
        return match mode {
            CodecAssignment::Both | CodecAssignment::Infer => {
                Codecs::pair(default_video, default_audio)
            }
            CodecAssignment::VideoOnly => Codecs::pair(default_video, none()),
            CodecAssignment::AudioOnly => Codecs::pair(none(), default_audio),
        };
    };

    if parsed.major == MajorType::Image {
        return Codecs::pair(none(), none());
    }

    let mode = match (mode, parsed.major) {
        (CodecAssignment::Infer, MajorType::Audio) => CodecAssignment::AudioOnly,
        (CodecAssignment::Infer, _) => CodecAssignment::Both,
        (explicit, _) => explicit,
    };

    let (implied_video, implied_audio) = implied_codecs(parsed.major, &parsed.subtype);
    let video = parsed
        .video_codec
        .or_else(|| implied_video.map(str::to_string))
        .or(default_video);
    let audio = parsed
        .audio_codec
        .or_else(|| implied_audio.map(str::to_string))
        .or(default_audio);

    match mode {
        CodecAssignment::VideoOnly => Codecs::pair(video, none()),
        CodecAssignment::AudioOnly => Codecs::pair(none(), audio),
        CodecAssignment::Both | CodecAssignment::Infer => Codecs::pair(video, audio),
    }
}

fn parse_mime(raw: &str) -> Option<ParsedMime> {
    let essence = raw.split(';').next()?.trim().to_ascii_lowercase();
    let (major, subtype) = essence.split_once('/')?;
    let major = match major {
        "video" => MajorType::Video,
        "audio" => MajorType::Audio,
        "image" => MajorType::Image,
        _ => return None,
    };

    let mut video_codec = None;
    let mut audio_codec = None;
    if let Some(caps) = CODECS_PARAM_RE.captures(raw)
        && let Some(list) = caps.get(1)
    {
        for codec in list.as_str().split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let lower = codec.to_ascii_lowercase();
            if video_codec.is_none() && has_prefix(&lower, VIDEO_CODEC_PREFIXES) {
                video_codec = Some(codec.to_string());
            } else if audio_codec.is_none() && has_prefix(&lower, AUDIO_CODEC_PREFIXES) {
                audio_codec = Some(codec.to_string());
            } else if major == MajorType::Audio && audio_codec.is_none() {
                audio_codec = Some(codec.to_string());
            } else if major == MajorType::Video && video_codec.is_none() {
                video_codec = Some(codec.to_string());
            }
        }
    }

    Some(ParsedMime {
        major,
        subtype: subtype.trim().to_string(),
        video_codec,
        audio_codec,
    })
}

fn has_prefix(codec: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| codec.starts_with(prefix))
}

/// Codecs conventionally carried by a container when no `codecs` parameter is given.
fn implied_codecs(major: MajorType, subtype: &str) -> (Option<&'static str>, Option<&'static str>) {
    match (major, subtype) {
        (MajorType::Video, "mp4" | "quicktime" | "3gpp") => (Some("avc1"), Some("mp4a")),
        (MajorType::Video, "webm") => (Some("vp9"), Some("opus")),
        (MajorType::Video, "x-flv") => (Some("h264"), Some("aac")),
        (MajorType::Audio, "mp4" | "m4a" | "x-m4a" | "aac") => (None, Some("mp4a")),
        (MajorType::Audio, "webm" | "ogg" | "opus") => (None, Some("opus")),
        (MajorType::Audio, "mpeg" | "mp3") => (None, Some("mp3")),
        (MajorType::Audio, "flac" | "x-flac") => (None, Some("flac")),
        _ => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_mp4_both_assigns_video_and_audio() {
        let codecs = normalize_mime(Some("video/mp4"), CodecAssignment::Both, None, None);
        assert_eq!(codecs.video.as_deref(), Some("avc1"));
        assert_eq!(codecs.audio.as_deref(), Some("mp4a"));
    }

    #[test]
    fn test_audio_mp4_audio_only_marks_video_none() {
        let codecs = normalize_mime(Some("audio/mp4"), CodecAssignment::AudioOnly, None, None);
        assert_eq!(codecs.video.as_deref(), Some("none"));
        assert_eq!(codecs.audio.as_deref(), Some("mp4a"));
    }

    #[test]
    fn test_explicit_codecs_parameter_wins() {
        let codecs = normalize_mime(
            Some(r#"video/mp4; codecs="avc1.64001F, mp4a.40.2""#),
            CodecAssignment::Both,
            Some("mp4"),
            Some("mp4"),
        );
        assert_eq!(codecs.video.as_deref(), Some("avc1.64001F"));
        assert_eq!(codecs.audio.as_deref(), Some("mp4a.40.2"));
    }

    #[test]
    fn test_video_only_forces_audio_none() {
        let codecs = normalize_mime(
            Some(r#"video/webm; codecs="vp9""#),
            CodecAssignment::VideoOnly,
            None,
            None,
        );
        assert_eq!(codecs.video.as_deref(), Some("vp9"));
        assert_eq!(codecs.audio.as_deref(), Some("none"));
    }

    #[test]
    fn test_infer_uses_major_type() {
        let audio = normalize_mime(
            Some(r#"audio/webm; codecs="opus""#),
            CodecAssignment::Infer,
            None,
            None,
        );
        assert_eq!(audio.video.as_deref(), Some("none"));
        assert_eq!(audio.audio.as_deref(), Some("opus"));

        let video = normalize_mime(Some("video/webm"), CodecAssignment::Infer, None, None);
        assert_eq!(video.video.as_deref(), Some("vp9"));
        assert_eq!(video.audio.as_deref(), Some("opus"));
    }

    #[test]
    fn test_image_mime_has_no_streams() {
        let codecs = normalize_mime(Some("image/jpeg"), CodecAssignment::Infer, None, None);
        assert_eq!(codecs.video.as_deref(), Some("none"));
        assert_eq!(codecs.audio.as_deref(), Some("none"));
    }

    #[test]
    fn test_absent_mime_falls_back_to_defaults() {
        let codecs = normalize_mime(None, CodecAssignment::Both, Some("mp4"), Some("mp4"));
        assert_eq!(codecs.video.as_deref(), Some("mp4"));
        assert_eq!(codecs.audio.as_deref(), Some("mp4"));

        let codecs = normalize_mime(None, CodecAssignment::AudioOnly, None, Some("m4a"));
        assert_eq!(codecs.video.as_deref(), Some("none"));
        assert_eq!(codecs.audio.as_deref(), Some("m4a"));
    }

    #[test]
    fn test_unrecognized_mime_falls_back_to_defaults() {
        let codecs = normalize_mime(
            Some("application/octet-stream"),
            CodecAssignment::Infer,
            Some("mkv"),
            Some("mkv"),
        );
        assert_eq!(codecs.video.as_deref(), Some("mkv"));
        assert_eq!(codecs.audio.as_deref(), Some("mkv"));
    }

    #[test]
    fn test_unknown_subtype_uses_defaults_for_missing_codecs() {
        let codecs = normalize_mime(
            Some("video/x-custom"),
            CodecAssignment::Both,
            Some("custom"),
            None,
        );
        assert_eq!(codecs.video.as_deref(), Some("custom"));
        assert_eq!(codecs.audio, None);
    }

    #[test]
    fn test_empty_defaults_are_ignored() {
        let codecs = normalize_mime(None, CodecAssignment::Both, Some(""), Some(""));
        assert_eq!(codecs, Codecs::default());
    }
}
