//! Technical media metadata and source classification.
//!
//! `MediaInfo` is produced once per source (by the prober in the engine
//! crate) and cached on the owning background or foreground. When probing
//! fails, [`MediaInfo::fallback`] guesses from the path alone so that
//! composition building never stops on a probe error.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Pixel formats that carry an alpha plane.
pub const ALPHA_PIXEL_FORMATS: [&str; 7] = [
    "yuva420p", "yuva422p", "yuva444p", "rgba", "bgra", "argb", "abgr",
];

/// Whether a pixel format name implies an alpha channel.
pub fn pix_fmt_has_alpha(pix_fmt: &str) -> bool {
    ALPHA_PIXEL_FORMATS.contains(&pix_fmt)
}

/// Where a media source lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Url,
    Stream,
}

impl SourceKind {
    /// Classify a source string by its scheme.
    ///
    /// `http`/`https`/`ftp` are URLs; `rtsp`/`rtmp`/`udp`/`tcp` and any
    /// other multi-letter scheme are streams. No scheme, `file://`, or a
    /// single-letter scheme (a Windows drive) is a local file.
    pub fn detect(source: &str) -> Self {
        let Ok(parsed) = url::Url::parse(source) else {
            return Self::File;
        };
        match parsed.scheme() {
            "http" | "https" | "ftp" => Self::Url,
            "rtsp" | "rtmp" | "udp" | "tcp" => Self::Stream,
            "file" => Self::File,
            scheme if scheme.len() > 1 => Self::Stream,
            _ => Self::File,
        }
    }

    /// Whether the source must be reached over the network.
    pub fn is_remote(self) -> bool {
        !matches!(self, Self::File)
    }
}

/// Stream type as reported by the prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Video,
    Audio,
    Subtitle,
    Data,
    #[serde(other)]
    Other,
}

/// One elementary stream inside a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub codec_type: StreamType,
    pub codec_name: Option<String>,
    pub pix_fmt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Stream-level duration in seconds.
    pub duration: Option<f64>,
}

/// Essential technical metadata for a media source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// The path or URL that was inspected.
    pub source: String,

    pub source_kind: SourceKind,

    /// Codec of the first video stream, `None` when unknown.
    pub codec_name: Option<String>,

    /// Pixel format of the first video stream, `None` when unknown.
    pub pix_fmt: Option<String>,

    /// Whether the video carries (or is guessed to carry) alpha.
    pub has_alpha: bool,

    pub width: Option<u32>,
    pub height: Option<u32>,

    /// Duration in seconds (stream-level, else container-level).
    pub duration: Option<f64>,

    /// VP9 with an alpha pixel format; needs the libvpx decoder to keep alpha.
    pub needs_vp9_decoder: bool,

    /// Every stream found. Empty for fallback metadata.
    #[serde(default)]
    pub streams: Vec<StreamInfo>,

    /// `false` when this is a path-based guess rather than real probe output.
    pub probed: bool,
}

impl MediaInfo {
    /// Build metadata from probed streams.
    ///
    /// Returns `None` when there is no video stream, in which case the
    /// caller should fall back.
    pub fn from_streams(
        source: &str,
        streams: Vec<StreamInfo>,
        format_duration: Option<f64>,
    ) -> Option<Self> {
        let video = streams
            .iter()
            .find(|s| s.codec_type == StreamType::Video)?
            .clone();

        let has_alpha = video.pix_fmt.as_deref().is_some_and(pix_fmt_has_alpha);
        let needs_vp9_decoder = has_alpha && video.codec_name.as_deref() == Some("vp9");
        let duration = video.duration.or(format_duration);

        Some(Self {
            source: source.to_string(),
            source_kind: SourceKind::detect(source),
            codec_name: video.codec_name,
            pix_fmt: video.pix_fmt,
            has_alpha,
            width: video.width,
            height: video.height,
            duration,
            needs_vp9_decoder,
            streams,
            probed: true,
        })
    }

    /// Best-guess metadata from the source string alone. Always succeeds.
    pub fn fallback(source: &str) -> Self {
        let source_kind = SourceKind::detect(source);
        let extension = match source_kind {
            SourceKind::File => lowercase_extension(source),
            SourceKind::Url => url::Url::parse(source)
                .ok()
                .and_then(|u| lowercase_extension(u.path())),
            SourceKind::Stream => None,
        };

        let (has_alpha, needs_vp9_decoder) = match (source_kind, extension.as_deref()) {
            (SourceKind::Stream, _) => {
                let webm = source.to_ascii_lowercase().contains(".webm");
                (webm, webm)
            }
            (_, Some("webm")) => (true, true),
            (_, Some("mov")) => (true, false),
            _ => (false, false),
        };

        Self {
            source: source.to_string(),
            source_kind,
            codec_name: None,
            pix_fmt: None,
            has_alpha,
            width: None,
            height: None,
            duration: None,
            needs_vp9_decoder,
            streams: Vec::new(),
            probed: false,
        }
    }

    /// Duration when known and positive.
    pub fn positive_duration(&self) -> Option<f64> {
        self.duration.filter(|d| *d > 0.0)
    }

    /// Audio presence. `None` when the streams were never inspected.
    pub fn has_audio_stream(&self) -> Option<bool> {
        self.probed.then(|| {
            self.streams
                .iter()
                .any(|s| s.codec_type == StreamType::Audio)
        })
    }
}

/// Lower-cased file extension without the dot.
pub fn lowercase_extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Output canvas geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl Canvas {
    pub fn new(width: u32, height: u32, fps: f64) -> Result<Self, ModelError> {
        let canvas = Self { width, height, fps };
        if !canvas.is_valid() {
            return Err(ModelError::InvalidCanvas { width, height, fps });
        }
        Ok(canvas)
    }

    /// All three values positive.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.fps > 0.0
    }
}

/// A `(start, end)` window into the source media, in source seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceTrim {
    pub start: f64,
    /// Open-ended when `None`.
    pub end: Option<f64>,
}

impl SourceTrim {
    pub fn new(start: f64, end: Option<f64>) -> Result<Self, ModelError> {
        let valid = start >= 0.0 && end.map_or(true, |e| e > start);
        if !valid {
            return Err(ModelError::InvalidTrim { start, end });
        }
        Ok(Self { start, end })
    }

    /// Length of the window, when bounded.
    pub fn length(&self) -> Option<f64> {
        self.end.map(|e| e - self.start)
    }
}

/// Audio policy shared by backgrounds and layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub enabled: bool,
    /// Linear gain in `[0.0, 1.0]`.
    pub volume: f64,
}

impl AudioSettings {
    /// Volume is clamped into `[0.0, 1.0]`.
    pub fn new(enabled: bool, volume: f64) -> Self {
        Self {
            enabled,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    pub fn muted() -> Self {
        Self::new(false, 1.0)
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self::new(true, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(codec_type: StreamType, codec: &str, pix_fmt: Option<&str>) -> StreamInfo {
        StreamInfo {
            codec_type,
            codec_name: Some(codec.to_string()),
            pix_fmt: pix_fmt.map(str::to_string),
            width: Some(1280),
            height: Some(720),
            duration: None,
        }
    }

    #[test]
    fn test_detect_source_kind() {
        assert_eq!(SourceKind::detect("/tmp/clip.webm"), SourceKind::File);
        assert_eq!(SourceKind::detect("clip.webm"), SourceKind::File);
        assert_eq!(SourceKind::detect("C:\\videos\\clip.webm"), SourceKind::File);
        assert_eq!(SourceKind::detect("file:///tmp/clip.mov"), SourceKind::File);
        assert_eq!(SourceKind::detect("https://cdn.example.com/a.mp4"), SourceKind::Url);
        assert_eq!(SourceKind::detect("ftp://host/a.mp4"), SourceKind::Url);
        assert_eq!(SourceKind::detect("rtmp://live/stream"), SourceKind::Stream);
        assert_eq!(SourceKind::detect("srt://host:9000"), SourceKind::Stream);
    }

    #[test]
    fn test_alpha_pixel_formats() {
        assert!(pix_fmt_has_alpha("yuva420p"));
        assert!(pix_fmt_has_alpha("bgra"));
        assert!(!pix_fmt_has_alpha("yuv420p"));
        assert!(!pix_fmt_has_alpha("yuva444p10le"));
    }

    #[test]
    fn test_from_streams_picks_first_video() {
        let mut video = stream(StreamType::Video, "vp9", Some("yuva420p"));
        video.duration = None;
        let streams = vec![
            stream(StreamType::Audio, "opus", None),
            video,
            stream(StreamType::Video, "h264", Some("yuv420p")),
        ];

        let info = MediaInfo::from_streams("fg.webm", streams, Some(8.5)).unwrap();
        assert_eq!(info.codec_name.as_deref(), Some("vp9"));
        assert!(info.has_alpha);
        assert!(info.needs_vp9_decoder);
        assert_eq!(info.duration, Some(8.5));
        assert_eq!(info.has_audio_stream(), Some(true));
        assert!(info.probed);
    }

    #[test]
    fn test_from_streams_prefers_stream_duration() {
        let mut video = stream(StreamType::Video, "prores", Some("yuva444p"));
        video.duration = Some(4.0);
        let info = MediaInfo::from_streams("fg.mov", vec![video], Some(9.0)).unwrap();
        assert_eq!(info.duration, Some(4.0));
        assert!(!info.needs_vp9_decoder);
        assert_eq!(info.has_audio_stream(), Some(false));
    }

    #[test]
    fn test_from_streams_without_video() {
        let streams = vec![stream(StreamType::Audio, "aac", None)];
        assert!(MediaInfo::from_streams("a.m4a", streams, Some(3.0)).is_none());
    }

    #[test]
    fn test_fallback_by_extension() {
        let webm = MediaInfo::fallback("/data/Person.WEBM");
        assert!(webm.has_alpha && webm.needs_vp9_decoder);
        assert!(!webm.probed);
        assert_eq!(webm.has_audio_stream(), None);

        let mov = MediaInfo::fallback("person.mov");
        assert!(mov.has_alpha && !mov.needs_vp9_decoder);

        let mp4 = MediaInfo::fallback("person.mp4");
        assert!(!mp4.has_alpha && !mp4.needs_vp9_decoder);
    }

    #[test]
    fn test_fallback_url_uses_path_extension() {
        let info = MediaInfo::fallback("https://cdn.example.com/out/fg.webm?sig=abc.mp4");
        assert_eq!(info.source_kind, SourceKind::Url);
        assert!(info.has_alpha && info.needs_vp9_decoder);
    }

    #[test]
    fn test_fallback_stream_substring() {
        let info = MediaInfo::fallback("rtmp://live/channel.webm/feed");
        assert_eq!(info.source_kind, SourceKind::Stream);
        assert!(info.has_alpha);
    }

    #[test]
    fn test_source_trim_validation() {
        assert!(SourceTrim::new(2.0, Some(5.0)).is_ok());
        assert!(SourceTrim::new(2.0, None).is_ok());
        assert!(SourceTrim::new(5.0, Some(2.0)).is_err());
        assert!(SourceTrim::new(-1.0, None).is_err());
        assert_eq!(SourceTrim::new(1.5, Some(4.0)).unwrap().length(), Some(2.5));
    }

    #[test]
    fn test_canvas_validation() {
        assert!(Canvas::new(1920, 1080, 30.0).is_ok());
        assert!(Canvas::new(0, 1080, 30.0).is_err());
        assert!(Canvas::new(1920, 1080, 0.0).is_err());
    }

    mod props {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn volume_always_clamped(volume in -10.0f64..10.0, enabled in any::<bool>()) {
                let audio = AudioSettings::new(enabled, volume);
                prop_assert!((0.0..=1.0).contains(&audio.volume));
                prop_assert_eq!(audio.enabled, enabled);
            }

            #[test]
            fn fallback_never_fails(source in "\\PC{0,40}") {
                let info = MediaInfo::fallback(&source);
                prop_assert!(!info.probed);
                prop_assert!(info.streams.is_empty());
            }
        }
    }
}
