//! JSON composition manifests.
//!
//! ```json
//! {
//!   "background": { "type": "video", "source": "beach.mp4", "audio": { "volume": 0.4 } },
//!   "layers": [
//!     { "source": "speaker.webm", "anchor": "bottom-right", "dx": -40, "dy": -40,
//!       "size": { "mode": "canvas_percent", "percent": 35 }, "start": 1.5 }
//!   ]
//! }
//! ```
//!
//! Relative file paths resolve against the manifest's directory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use vbr_compose_engine::sources::DEFAULT_IMAGE_FPS;
use vbr_compose_engine::MediaContext;
use vbr_media_model::{
    Anchor, Background, Canvas, Composition, Crop, Foreground, Size, SourceKind,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub background: Option<BackgroundSpec>,
    /// Canvas used when there is no background.
    pub canvas: Option<CanvasSpec>,
    pub duration: Option<f64>,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CanvasSpec {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackgroundSpec {
    Color {
        color: String,
        #[serde(flatten)]
        canvas: CanvasSpec,
    },
    Image {
        source: String,
        #[serde(default = "default_fps")]
        fps: f64,
    },
    Video {
        source: String,
        audio: Option<AudioSpec>,
        subclip: Option<SubclipSpec>,
    },
    Empty {
        #[serde(flatten)]
        canvas: CanvasSpec,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AudioSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_volume")]
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SubclipSpec {
    pub start: f64,
    pub end: Option<f64>,
}

/// One layer. `source` alone picks the format by extension; `mask` makes
/// `source` the color clip of a mask bundle.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerSpec {
    pub source: String,
    pub mask: Option<String>,
    /// Separate audio track for a mask bundle.
    pub audio_file: Option<String>,
    pub name: Option<String>,
    pub anchor: Option<Anchor>,
    #[serde(default)]
    pub dx: i32,
    #[serde(default)]
    pub dy: i32,
    /// Raw overlay expressions; both must be set.
    pub x: Option<String>,
    pub y: Option<String>,
    pub size: Option<Size>,
    pub opacity: Option<f64>,
    pub rotate: Option<f64>,
    pub crop: Option<Crop>,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub duration: Option<f64>,
    pub subclip: Option<SubclipSpec>,
    pub audio: Option<AudioSpec>,
    pub z: Option<i32>,
    pub alpha: Option<bool>,
}

fn default_fps() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

fn default_volume() -> f64 {
    1.0
}

impl Manifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Probe every source and assemble the composition.
    pub fn build(&self, ctx: &MediaContext, base: &Path) -> anyhow::Result<Composition> {
        let mut comp = match &self.background {
            Some(spec) => Composition::new(spec.build(ctx, base)?),
            None => Composition::default(),
        };
        if let Some(canvas) = self.canvas {
            comp.set_canvas(canvas.width, canvas.height, canvas.fps)?;
        }
        if let Some(duration) = self.duration {
            comp.set_duration(duration);
        }

        for (index, spec) in self.layers.iter().enumerate() {
            let fg = spec
                .foreground(ctx, base)
                .with_context(|| format!("Layer {index} ({})", spec.source))?;
            spec.apply(&mut comp, fg)
                .with_context(|| format!("Layer {index} ({})", spec.source))?;
        }
        Ok(comp)
    }
}

impl BackgroundSpec {
    fn build(&self, ctx: &MediaContext, base: &Path) -> anyhow::Result<Background> {
        let background = match self {
            Self::Color { color, canvas } => {
                Background::color(color.clone(), Canvas::new(canvas.width, canvas.height, canvas.fps)?)
            }
            Self::Image { source, fps } => {
                let fps = if *fps > 0.0 { *fps } else { DEFAULT_IMAGE_FPS };
                ctx.image_background(&resolve(base, source), fps)?
            }
            Self::Video {
                source,
                audio,
                subclip,
            } => {
                let mut bg = ctx.video_background(&resolve(base, source))?;
                if let Some(audio) = audio {
                    bg = bg.audio(audio.enabled, audio.volume);
                }
                if let Some(clip) = subclip {
                    bg = bg.subclip(clip.start, clip.end)?;
                }
                bg
            }
            Self::Empty { canvas } => {
                Background::empty(Canvas::new(canvas.width, canvas.height, canvas.fps)?)
            }
        };
        Ok(background)
    }
}

impl LayerSpec {
    fn foreground(&self, ctx: &MediaContext, base: &Path) -> anyhow::Result<Foreground> {
        let source = resolve(base, &self.source);
        match &self.mask {
            Some(mask) => {
                let audio = self.audio_file.as_deref().map(|a| resolve(base, a));
                Ok(ctx.mask_foreground(&source, &resolve(base, mask), audio.as_deref()))
            }
            None => Ok(ctx.foreground_from_file(&source)?),
        }
    }

    fn apply(&self, comp: &mut Composition, fg: Foreground) -> anyhow::Result<()> {
        let mut layer = match &self.name {
            Some(name) => comp.add_named(fg, name.clone()),
            None => comp.add(fg),
        };

        match (&self.x, &self.y, self.anchor) {
            (Some(x), Some(y), _) => layer = layer.xy(x.clone(), y.clone()),
            (None, None, Some(anchor)) => layer = layer.at(anchor, self.dx, self.dy),
            (None, None, None) if self.dx != 0 || self.dy != 0 => {
                layer = layer.at(Anchor::default(), self.dx, self.dy)
            }
            (None, None, None) => {}
            _ => anyhow::bail!("x and y must be given together"),
        }

        if let Some(size) = &self.size {
            layer = layer.size(size.clone());
        }
        if let Some(opacity) = self.opacity {
            layer = layer.opacity(opacity);
        }
        if let Some(degrees) = self.rotate {
            layer = layer.rotate(degrees);
        }
        if let Some(crop) = self.crop {
            layer = layer.crop(crop.x, crop.y, crop.width, crop.height);
        }
        if let Some(start) = self.start {
            layer = layer.start(start);
        }
        if let Some(end) = self.end {
            layer = layer.end(end);
        }
        if let Some(duration) = self.duration {
            layer = layer.duration(duration);
        }
        if let Some(clip) = self.subclip {
            layer = layer.subclip(clip.start, clip.end)?;
        }
        if let Some(audio) = self.audio {
            layer = layer.audio(audio.enabled, audio.volume);
        }
        if let Some(z) = self.z {
            layer = layer.z(z);
        }
        if let Some(alpha) = self.alpha {
            layer.alpha(alpha);
        }
        Ok(())
    }
}

/// Local relative paths join onto `base`; URLs and absolute paths pass through.
pub fn resolve(base: &Path, source: &str) -> String {
    if SourceKind::detect(source) != SourceKind::File {
        return source.to_string();
    }
    let path = PathBuf::from(source);
    if path.is_absolute() || base.as_os_str().is_empty() {
        source.to_string()
    } else {
        base.join(path).display().to_string()
    }
}
