//! Composition backgrounds.
//!
//! A background fixes the canvas geometry and sits on input slot 0.
//! Only the video variant is authoritative for output duration.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::media::{AudioSettings, Canvas, MediaInfo, SourceTrim};

/// Variant-specific payload of a background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackgroundKind {
    /// Flat color, any color string the transcoder understands (`"#00FF00"`, `"black"`).
    Color { color: String },

    /// Still image looped for the whole output. Always a local path by the
    /// time it is stored here.
    Image { source: String },

    /// Video clip with its probed metadata.
    Video {
        source: String,
        info: MediaInfo,
        trim: Option<SourceTrim>,
    },

    /// Fully transparent canvas.
    Empty,
}

/// A background with known canvas geometry and audio policy.
///
/// Immutable: `audio` and `subclip` return new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Background {
    kind: BackgroundKind,
    canvas: Canvas,
    audio: AudioSettings,
}

impl Background {
    pub fn color(color: impl Into<String>, canvas: Canvas) -> Self {
        Self {
            kind: BackgroundKind::Color {
                color: color.into(),
            },
            canvas,
            audio: AudioSettings::muted(),
        }
    }

    /// Local image with dimensions already probed.
    pub fn image(source: impl Into<String>, canvas: Canvas) -> Self {
        Self {
            kind: BackgroundKind::Image {
                source: source.into(),
            },
            canvas,
            audio: AudioSettings::muted(),
        }
    }

    /// Video with geometry and metadata already probed. Audio starts enabled.
    pub fn video(source: impl Into<String>, canvas: Canvas, info: MediaInfo) -> Self {
        Self {
            kind: BackgroundKind::Video {
                source: source.into(),
                info,
                trim: None,
            },
            canvas,
            audio: AudioSettings::default(),
        }
    }

    pub fn empty(canvas: Canvas) -> Self {
        Self {
            kind: BackgroundKind::Empty,
            canvas,
            audio: AudioSettings::muted(),
        }
    }

    pub fn kind(&self) -> &BackgroundKind {
        &self.kind
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn width(&self) -> u32 {
        self.canvas.width
    }

    pub fn height(&self) -> u32 {
        self.canvas.height
    }

    pub fn fps(&self) -> f64 {
        self.canvas.fps
    }

    pub fn audio_settings(&self) -> AudioSettings {
        self.audio
    }

    /// Whether this background dictates output length.
    pub fn is_duration_authority(&self) -> bool {
        matches!(self.kind, BackgroundKind::Video { .. })
    }

    /// Effective duration: the trimmed window when bounded, else the probe.
    pub fn duration(&self) -> Option<f64> {
        match &self.kind {
            BackgroundKind::Video { info, trim, .. } => {
                let probed = info.positive_duration();
                match trim {
                    Some(t) => t
                        .length()
                        .or_else(|| probed.map(|d| (d - t.start).max(0.0))),
                    None => probed,
                }
            }
            _ => None,
        }
    }

    /// Actual audio-stream presence. Only video backgrounds can have audio.
    pub fn has_audio(&self) -> bool {
        match &self.kind {
            BackgroundKind::Video { info, .. } => info.has_audio_stream().unwrap_or(false),
            _ => false,
        }
    }

    /// Probed metadata, for video backgrounds.
    pub fn info(&self) -> Option<&MediaInfo> {
        match &self.kind {
            BackgroundKind::Video { info, .. } => Some(info),
            _ => None,
        }
    }

    /// New background with different audio settings. Volume is clamped.
    /// Probed metadata is carried along with the clone.
    pub fn audio(&self, enabled: bool, volume: f64) -> Self {
        Self {
            audio: AudioSettings::new(enabled, volume),
            ..self.clone()
        }
    }

    /// New video background reading only `[start, end)` of the source.
    pub fn subclip(&self, start: f64, end: Option<f64>) -> Result<Self, ModelError> {
        let trim = SourceTrim::new(start, end)?;
        match &self.kind {
            BackgroundKind::Video { source, info, .. } => Ok(Self {
                kind: BackgroundKind::Video {
                    source: source.clone(),
                    info: info.clone(),
                    trim: Some(trim),
                },
                ..self.clone()
            }),
            _ => Err(ModelError::NotTrimmable),
        }
    }
}
