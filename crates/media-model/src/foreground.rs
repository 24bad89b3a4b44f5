//! Alpha-matted foreground clips.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::media::{lowercase_extension, MediaInfo, SourceTrim};

/// Format tag of a foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForegroundFormat {
    /// VP9 with an alpha plane in a WebM container.
    WebmVp9,
    /// ProRes 4444 with an alpha plane in a QuickTime container.
    MovProres,
    /// Separate color clip and grayscale mask clip, optionally separate audio.
    MaskBundle,
    /// Color on the top half, mask on the bottom half of one frame.
    Stacked,
    /// A not-yet-unpacked zip holding a mask bundle.
    Archive,
}

/// Where the media for each format lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ForegroundKind {
    WebmVp9 {
        path: String,
    },
    MovProres {
        path: String,
    },
    MaskBundle {
        color: String,
        mask: String,
        audio: Option<String>,
    },
    Stacked {
        path: String,
    },
    Archive {
        path: String,
    },
}

/// An alpha-matted clip that layers place onto the canvas.
///
/// Immutable and cheap to share between layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Foreground {
    kind: ForegroundKind,
    trim: Option<SourceTrim>,
    info: Option<MediaInfo>,
}

impl Foreground {
    pub fn new(kind: ForegroundKind, info: Option<MediaInfo>) -> Self {
        Self {
            kind,
            trim: None,
            info,
        }
    }

    pub fn webm_vp9(path: impl Into<String>, info: MediaInfo) -> Self {
        Self::new(ForegroundKind::WebmVp9 { path: path.into() }, Some(info))
    }

    pub fn mov_prores(path: impl Into<String>, info: MediaInfo) -> Self {
        Self::new(ForegroundKind::MovProres { path: path.into() }, Some(info))
    }

    /// Color clip plus mask clip. `info` describes the color clip.
    pub fn video_and_mask(
        color: impl Into<String>,
        mask: impl Into<String>,
        audio: Option<String>,
        info: MediaInfo,
    ) -> Self {
        Self::new(
            ForegroundKind::MaskBundle {
                color: color.into(),
                mask: mask.into(),
                audio,
            },
            Some(info),
        )
    }

    pub fn stacked(path: impl Into<String>, info: MediaInfo) -> Self {
        Self::new(ForegroundKind::Stacked { path: path.into() }, Some(info))
    }

    /// Archive foreground; unpacked later, so nothing is probed yet.
    pub fn archive(path: impl Into<String>) -> Self {
        Self::new(ForegroundKind::Archive { path: path.into() }, None)
    }

    /// Pick the format from the file extension.
    ///
    /// `.webm` is VP9 alpha, `.mov` is ProRes alpha, `.zip` is an archive,
    /// `.mp4` is a stacked color-over-mask video.
    pub fn format_for_path(path: &str) -> Result<ForegroundFormat, ModelError> {
        let extension = lowercase_extension(path).unwrap_or_default();
        match extension.as_str() {
            "webm" => Ok(ForegroundFormat::WebmVp9),
            "mov" => Ok(ForegroundFormat::MovProres),
            "zip" => Ok(ForegroundFormat::Archive),
            "mp4" => Ok(ForegroundFormat::Stacked),
            _ => Err(ModelError::UnsupportedExtension {
                path: path.to_string(),
                extension,
            }),
        }
    }

    pub fn kind(&self) -> &ForegroundKind {
        &self.kind
    }

    pub fn format(&self) -> ForegroundFormat {
        match self.kind {
            ForegroundKind::WebmVp9 { .. } => ForegroundFormat::WebmVp9,
            ForegroundKind::MovProres { .. } => ForegroundFormat::MovProres,
            ForegroundKind::MaskBundle { .. } => ForegroundFormat::MaskBundle,
            ForegroundKind::Stacked { .. } => ForegroundFormat::Stacked,
            ForegroundKind::Archive { .. } => ForegroundFormat::Archive,
        }
    }

    /// The main media file (the color clip for bundles).
    pub fn primary_path(&self) -> &str {
        match &self.kind {
            ForegroundKind::WebmVp9 { path }
            | ForegroundKind::MovProres { path }
            | ForegroundKind::Stacked { path }
            | ForegroundKind::Archive { path } => path,
            ForegroundKind::MaskBundle { color, .. } => color,
        }
    }

    pub fn mask_path(&self) -> Option<&str> {
        match &self.kind {
            ForegroundKind::MaskBundle { mask, .. } => Some(mask),
            _ => None,
        }
    }

    pub fn audio_path(&self) -> Option<&str> {
        match &self.kind {
            ForegroundKind::MaskBundle { audio, .. } => audio.as_deref(),
            _ => None,
        }
    }

    pub fn trim(&self) -> Option<SourceTrim> {
        self.trim
    }

    pub fn info(&self) -> Option<&MediaInfo> {
        self.info.as_ref()
    }

    pub fn is_archive(&self) -> bool {
        matches!(self.kind, ForegroundKind::Archive { .. })
    }

    /// Playable length: the trimmed window when bounded, else the probe.
    pub fn duration(&self) -> Option<f64> {
        let probed = self.info.as_ref().and_then(MediaInfo::positive_duration);
        match self.trim {
            Some(t) => t
                .length()
                .or_else(|| probed.map(|d| (d - t.start).max(0.0))),
            None => probed,
        }
    }

    /// Audio presence. `None` when unknown (fallback metadata).
    pub fn has_audio(&self) -> Option<bool> {
        if self.audio_path().is_some() {
            return Some(true);
        }
        self.info.as_ref().and_then(MediaInfo::has_audio_stream)
    }

    /// New foreground reading only `[start, end)` of the source.
    /// Probed metadata carries over.
    pub fn subclip(&self, start: f64, end: Option<f64>) -> Result<Self, ModelError> {
        Ok(Self {
            trim: Some(SourceTrim::new(start, end)?),
            ..self.clone()
        })
    }

    /// Same foreground with a different trim (used when unpacking archives).
    pub fn with_trim(mut self, trim: Option<SourceTrim>) -> Self {
        self.trim = trim;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{StreamInfo, StreamType};

    fn probed(source: &str, duration: f64, audio: bool) -> MediaInfo {
        let mut streams = vec![StreamInfo {
            codec_type: StreamType::Video,
            codec_name: Some("vp9".into()),
            pix_fmt: Some("yuva420p".into()),
            width: Some(1280),
            height: Some(720),
            duration: Some(duration),
        }];
        if audio {
            streams.push(StreamInfo {
                codec_type: StreamType::Audio,
                codec_name: Some("opus".into()),
                pix_fmt: None,
                width: None,
                height: None,
                duration: None,
            });
        }
        MediaInfo::from_streams(source, streams, None).unwrap()
    }

    #[test]
    fn test_format_for_path() {
        assert_eq!(
            Foreground::format_for_path("a/b/person.webm").unwrap(),
            ForegroundFormat::WebmVp9
        );
        assert_eq!(
            Foreground::format_for_path("PERSON.MOV").unwrap(),
            ForegroundFormat::MovProres
        );
        assert_eq!(
            Foreground::format_for_path("bundle.zip").unwrap(),
            ForegroundFormat::Archive
        );
        assert_eq!(
            Foreground::format_for_path("stacked.mp4").unwrap(),
            ForegroundFormat::Stacked
        );
        assert!(matches!(
            Foreground::format_for_path("clip.avi"),
            Err(ModelError::UnsupportedExtension { .. })
        ));
    }

    #[test]
    fn test_bundle_paths() {
        let fg = Foreground::video_and_mask(
            "color.mp4",
            "alpha.mp4",
            Some("audio.m4a".to_string()),
            probed("color.mp4", 6.0, false),
        );
        assert_eq!(fg.format(), ForegroundFormat::MaskBundle);
        assert_eq!(fg.primary_path(), "color.mp4");
        assert_eq!(fg.mask_path(), Some("alpha.mp4"));
        assert_eq!(fg.audio_path(), Some("audio.m4a"));
        assert_eq!(fg.has_audio(), Some(true));
    }

    #[test]
    fn test_mask_only_on_bundle() {
        let fg = Foreground::webm_vp9("fg.webm", probed("fg.webm", 6.0, false));
        assert_eq!(fg.mask_path(), None);
        assert_eq!(fg.has_audio(), Some(false));
    }

    #[test]
    fn test_subclip_copies_metadata() {
        let fg = Foreground::webm_vp9("fg.webm", probed("fg.webm", 10.0, true));
        let clipped = fg.subclip(2.0, Some(5.0)).unwrap();
        assert_eq!(clipped.duration(), Some(3.0));
        assert_eq!(clipped.has_audio(), Some(true));
        assert_eq!(clipped.info(), fg.info());

        let tail = fg.subclip(4.0, None).unwrap();
        assert_eq!(tail.duration(), Some(6.0));
    }

    #[test]
    fn test_fallback_audio_unknown() {
        let fg = Foreground::stacked("s.mp4", MediaInfo::fallback("s.mp4"));
        assert_eq!(fg.has_audio(), None);
        assert_eq!(fg.duration(), None);
    }

    #[test]
    fn test_archive_is_unprobed() {
        let fg = Foreground::archive("result.zip");
        assert!(fg.is_archive());
        assert!(fg.info().is_none());
    }
}
