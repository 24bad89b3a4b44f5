//! Layer placement: position, size, effects, timing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::foreground::Foreground;
use crate::media::{AudioSettings, Canvas, SourceTrim};

/// Horizontal alignment named by an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

/// Vertical alignment named by an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    Top,
    Center,
    Bottom,
}

/// Nine-point anchor on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    #[default]
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Anchor {
    pub const ALL: [Anchor; 9] = [
        Anchor::TopLeft,
        Anchor::TopCenter,
        Anchor::TopRight,
        Anchor::CenterLeft,
        Anchor::Center,
        Anchor::CenterRight,
        Anchor::BottomLeft,
        Anchor::BottomCenter,
        Anchor::BottomRight,
    ];

    pub fn horizontal(self) -> HAlign {
        match self {
            Self::TopLeft | Self::CenterLeft | Self::BottomLeft => HAlign::Left,
            Self::TopCenter | Self::Center | Self::BottomCenter => HAlign::Center,
            Self::TopRight | Self::CenterRight | Self::BottomRight => HAlign::Right,
        }
    }

    pub fn vertical(self) -> VAlign {
        match self {
            Self::TopLeft | Self::TopCenter | Self::TopRight => VAlign::Top,
            Self::CenterLeft | Self::Center | Self::CenterRight => VAlign::Center,
            Self::BottomLeft | Self::BottomCenter | Self::BottomRight => VAlign::Bottom,
        }
    }
}

/// Where the layer's top-left corner lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Position {
    /// Anchor plus pixel offset.
    Anchored { anchor: Anchor, dx: i32, dy: i32 },
    /// Raw overlay expressions, e.g. `"W-w-20"`. Replaces the anchor.
    Expr { x: String, y: String },
}

impl Default for Position {
    fn default() -> Self {
        Self::Anchored {
            anchor: Anchor::Center,
            dx: 0,
            dy: 0,
        }
    }
}

/// Aspect-ratio handling of a scale operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectConstraint {
    /// Shrink to fit inside the target box.
    Decrease,
    /// Grow to cover the target box.
    Increase,
    /// Use the target dimensions as given.
    None,
}

/// How a layer is sized relative to the canvas or its own frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Size {
    /// Fit inside the canvas, preserving aspect ratio.
    #[default]
    Contain,
    /// Fill the canvas, preserving aspect ratio; overflow is clipped.
    Cover,
    /// Exact pixel dimensions (stretches).
    Pixels { width: u32, height: u32 },
    /// A box sized as a percentage of the canvas; the clip fits inside it.
    ///
    /// `width`/`height` set each axis; `percent` fills whichever is missing
    /// (or both). Everything unset means 100%.
    CanvasPercent {
        width: Option<f64>,
        height: Option<f64>,
        percent: Option<f64>,
    },
    /// Multiply the clip's own dimensions. A missing axis mirrors the other.
    Scale { x: Option<f64>, y: Option<f64> },
    /// Canvas width, height follows the aspect ratio.
    FitWidth,
    /// Canvas height, width follows the aspect ratio.
    FitHeight,
}

impl Size {
    pub fn percent(percent: f64) -> Self {
        Self::CanvasPercent {
            width: None,
            height: None,
            percent: Some(percent),
        }
    }

    pub fn scale(factor: f64) -> Self {
        Self::Scale {
            x: Some(factor),
            y: Some(factor),
        }
    }

    pub fn aspect_constraint(&self) -> AspectConstraint {
        match self {
            Self::Contain | Self::CanvasPercent { .. } => AspectConstraint::Decrease,
            Self::Cover => AspectConstraint::Increase,
            Self::Pixels { .. } | Self::Scale { .. } | Self::FitWidth | Self::FitHeight => {
                AspectConstraint::None
            }
        }
    }

    /// Pixel box for canvas-percent sizing, truncated toward zero.
    pub fn target_box(&self, canvas: Canvas) -> Option<(u32, u32)> {
        let Self::CanvasPercent {
            width,
            height,
            percent,
        } = *self
        else {
            return None;
        };

        let fill = percent.unwrap_or(100.0);
        let (pw, ph) = match (width, height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, fill),
            (None, Some(h)) => (fill, h),
            (None, None) => (fill, fill),
        };
        let scale = |extent: u32, pct: f64| (extent as f64 * pct / 100.0).max(0.0) as u32;
        Some((scale(canvas.width, pw), scale(canvas.height, ph)))
    }

    /// Per-axis factors for scale mode, mirroring a missing axis.
    pub fn scale_factors(&self) -> Option<(f64, f64)> {
        match *self {
            Self::Scale { x, y } => Some(match (x, y) {
                (Some(x), Some(y)) => (x, y),
                (Some(f), None) | (None, Some(f)) => (f, f),
                (None, None) => (1.0, 1.0),
            }),
            _ => None,
        }
    }
}

/// Crop rectangle in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// When the layer is visible on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LayerTiming {
    /// Output time the layer appears, seconds.
    pub start: f64,
    /// Output time the layer disappears.
    pub end: Option<f64>,
    /// Visible duration from `start`.
    pub duration: Option<f64>,
}

impl LayerTiming {
    /// Resolve the end time. `end` wins; otherwise `start + duration`.
    /// Both set and disagreeing is an error.
    pub fn resolved_end(&self, layer: &str) -> Result<Option<f64>, ModelError> {
        match (self.end, self.duration) {
            (Some(end), Some(duration)) => {
                if (self.start + duration - end).abs() > 1e-6 {
                    return Err(ModelError::ConflictingTiming {
                        layer: layer.to_string(),
                        start: self.start,
                        end,
                        duration,
                    });
                }
                Ok(Some(end))
            }
            (Some(end), None) => Ok(Some(end)),
            (None, Some(duration)) => Ok(Some(self.start + duration)),
            (None, None) => Ok(None),
        }
    }

    pub fn is_shifted(&self) -> bool {
        self.start > 0.0
    }
}

/// One placement of a foreground in a composition.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub foreground: Arc<Foreground>,
    pub position: Position,
    pub size: Size,
    /// Clockwise rotation in degrees.
    pub rotation: f64,
    pub crop: Option<Crop>,
    /// In `[0.0, 1.0]`.
    pub opacity: f64,
    pub timing: LayerTiming,
    /// Overrides the foreground's own trim when set.
    pub source_trim: Option<SourceTrim>,
    pub audio: AudioSettings,
    pub alpha: bool,
    /// Stacking order, lower is further back. Defaults to insertion index.
    pub z: i32,
}

impl Layer {
    pub fn new(name: impl Into<String>, foreground: Arc<Foreground>, z: i32) -> Self {
        Self {
            name: name.into(),
            foreground,
            position: Position::default(),
            size: Size::default(),
            rotation: 0.0,
            crop: None,
            opacity: 1.0,
            timing: LayerTiming::default(),
            source_trim: None,
            audio: AudioSettings::default(),
            alpha: true,
            z,
        }
    }

    /// The trim actually applied at the input: layer override, else the foreground's.
    pub fn effective_trim(&self) -> Option<SourceTrim> {
        self.source_trim.or_else(|| self.foreground.trim())
    }

    /// Playable source length after the effective trim.
    pub fn source_duration(&self) -> Option<f64> {
        match self.source_trim {
            Some(trim) => self.foreground.as_ref().clone().with_trim(Some(trim)).duration(),
            None => self.foreground.duration(),
        }
    }

    /// Opacity differs from fully opaque.
    pub fn needs_opacity(&self) -> bool {
        self.opacity < 1.0
    }

    pub fn needs_rotation(&self) -> bool {
        self.rotation != 0.0
    }
}
