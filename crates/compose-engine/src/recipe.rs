//! Per-variant input and normalization recipes.
//!
//! Backgrounds always land on input slot 0. Each layer's foreground adds
//! one to three slots, recorded in an [`InputMap`] under synthetic keys
//! such as `layer_2_rgb` and `layer_2_mask`.

use std::collections::BTreeMap;

use vbr_common::error::{VbrError, VbrResult};
use vbr_media_model::{Background, BackgroundKind, Canvas, Foreground, ForegroundKind, SourceTrim};

use crate::graph::{format_number, Filter, FilterNode, Pad, Stage};

/// Input key of the background slot.
pub const BACKGROUND_KEY: &str = "background";

/// Luminance at or above which a mask pixel becomes fully opaque.
pub const MASK_THRESHOLD: u8 = 128;

/// Hard mask threshold: `0` below [`MASK_THRESHOLD`], `255` at or above.
pub fn binarize(luma: u8) -> u8 {
    if luma >= MASK_THRESHOLD {
        255
    } else {
        0
    }
}

/// The `geq` luminance expression equivalent to [`binarize`].
pub fn binarize_expr() -> String {
    format!("if(gte(lum(X,Y),{MASK_THRESHOLD}),255,0)")
}

/// What the runtime transcoder can do, queried once per context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// `libvpx-vp9` decoder is available (keeps VP9 alpha planes).
    pub vp9_alpha_decoder: bool,
}

impl Capabilities {
    fn vp9_decoder_args(self) -> Vec<String> {
        if self.vp9_alpha_decoder {
            vec!["-c:v".into(), "libvpx-vp9".into()]
        } else {
            Vec::new()
        }
    }
}

/// One external input: a key and the arguments ending in `-i <src>`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub key: String,
    pub args: Vec<String>,
}

/// Inputs a foreground needs, plus the key whose audio it contributes.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRecipe {
    pub inputs: Vec<InputSpec>,
    pub audio_key: String,
}

/// Slot allocation, in the order inputs appear on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputMap {
    slots: BTreeMap<String, usize>,
    args: Vec<String>,
    count: usize,
}

impl InputMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an input and return its slot index.
    pub fn push(&mut self, spec: InputSpec) -> usize {
        let index = self.count;
        self.count += 1;
        self.slots.insert(spec.key, index);
        self.args.extend(spec.args);
        index
    }

    pub fn get(&self, key: &str) -> Option<usize> {
        self.slots.get(key).copied()
    }

    /// Slot for a key that must have been allocated.
    pub fn slot(&self, key: &str) -> VbrResult<usize> {
        self.get(key)
            .ok_or_else(|| VbrError::config(format!("input '{key}' was never allocated")))
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// All input arguments in slot order.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Input for slot 0. Without a background, a transparent canvas is synthesized.
pub fn background_input(
    background: Option<&Background>,
    canvas: Canvas,
    caps: Capabilities,
) -> InputSpec {
    let lavfi = |color: &str| {
        vec![
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!(
                "color=c={color}:size={}x{}:rate={}",
                canvas.width,
                canvas.height,
                format_number(canvas.fps)
            ),
        ]
    };

    let args = match background.map(Background::kind) {
        Some(BackgroundKind::Color { color }) => lavfi(color),
        Some(BackgroundKind::Image { source }) => {
            vec!["-loop".into(), "1".into(), "-i".into(), source.clone()]
        }
        Some(BackgroundKind::Video { source, info, trim }) => {
            let mut args = Vec::new();
            if info.needs_vp9_decoder {
                args.extend(caps.vp9_decoder_args());
            }
            args.extend(trim_args(*trim));
            args.push("-i".into());
            args.push(source.clone());
            args
        }
        Some(BackgroundKind::Empty) | None => lavfi("black@0.0"),
    };

    InputSpec {
        key: BACKGROUND_KEY.to_string(),
        args,
    }
}

/// Input recipe for the foreground of layer `layer`.
///
/// Archives must be unpacked first; they have no recipe.
pub fn foreground_inputs(
    layer: usize,
    foreground: &Foreground,
    trim: Option<SourceTrim>,
    caps: Capabilities,
) -> VbrResult<InputRecipe> {
    let input = |key: String, decoder: Vec<String>, path: &str| {
        let mut args = decoder;
        args.extend(trim_args(trim));
        args.push("-i".into());
        args.push(path.to_string());
        InputSpec { key, args }
    };

    let recipe = match foreground.kind() {
        ForegroundKind::WebmVp9 { path } => {
            let key = format!("layer_{layer}");
            InputRecipe {
                inputs: vec![input(key.clone(), caps.vp9_decoder_args(), path)],
                audio_key: key,
            }
        }
        ForegroundKind::MovProres { path } => {
            let key = format!("layer_{layer}");
            InputRecipe {
                inputs: vec![input(key.clone(), Vec::new(), path)],
                audio_key: key,
            }
        }
        ForegroundKind::MaskBundle { color, mask, audio } => {
            let rgb_key = format!("layer_{layer}_rgb");
            let decoder = if color.to_ascii_lowercase().ends_with(".webm") {
                caps.vp9_decoder_args()
            } else {
                Vec::new()
            };
            let mut inputs = vec![
                input(rgb_key.clone(), decoder, color),
                input(format!("layer_{layer}_mask"), Vec::new(), mask),
            ];
            let audio_key = match audio {
                Some(audio) => {
                    let key = format!("layer_{layer}_audio");
                    inputs.push(input(key.clone(), Vec::new(), audio));
                    key
                }
                None => rgb_key,
            };
            InputRecipe { inputs, audio_key }
        }
        ForegroundKind::Stacked { path } => {
            let key = format!("layer_{layer}_stacked");
            InputRecipe {
                inputs: vec![input(key.clone(), Vec::new(), path)],
                audio_key: key,
            }
        }
        ForegroundKind::Archive { path } => {
            return Err(VbrError::config(format!(
                "archive foreground {path} must be unpacked before compiling"
            )));
        }
    };
    Ok(recipe)
}

/// Nodes that normalize layer `layer`'s foreground into one RGBA (or RGB
/// when `alpha` is off) pad. Returns the nodes and that pad.
pub fn foreground_filters(
    layer: usize,
    foreground: &Foreground,
    inputs: &InputMap,
    alpha: bool,
) -> VbrResult<(Vec<FilterNode>, Pad)> {
    let label = |suffix: &str| Pad::label(format!("layer_{layer}_{suffix}"));
    let merged = label("merged");

    let nodes = match foreground.kind() {
        ForegroundKind::WebmVp9 { .. } | ForegroundKind::MovProres { .. } => {
            let source = Pad::video(inputs.slot(&format!("layer_{layer}"))?);
            if alpha {
                return Ok((Vec::new(), source));
            }
            vec![FilterNode::new(
                Stage::Normalize,
                vec![source],
                Filter::new("format").arg("rgb24"),
                merged.clone(),
            )]
        }
        ForegroundKind::MaskBundle { .. } => {
            let rgb = Pad::video(inputs.slot(&format!("layer_{layer}_rgb"))?);
            if !alpha {
                vec![FilterNode::new(
                    Stage::Normalize,
                    vec![rgb],
                    Filter::new("format").arg("rgb24"),
                    merged.clone(),
                )]
            } else {
                let mask = Pad::video(inputs.slot(&format!("layer_{layer}_mask"))?);
                let mut nodes = vec![FilterNode::new(
                    Stage::Normalize,
                    vec![rgb],
                    Filter::new("format").arg("rgba"),
                    label("rgba"),
                )];
                nodes.extend(mask_merge(layer, label("rgba"), mask, merged.clone()));
                nodes
            }
        }
        ForegroundKind::Stacked { .. } => {
            let stacked = Pad::video(inputs.slot(&format!("layer_{layer}_stacked"))?);
            let top = FilterNode::new(
                Stage::Normalize,
                vec![stacked.clone()],
                Filter::new("crop").arg("iw").arg("ih/2").arg(0).arg(0),
                label("top"),
            );
            if !alpha {
                vec![
                    top,
                    FilterNode::new(
                        Stage::Normalize,
                        vec![label("top")],
                        Filter::new("format").arg("rgb24"),
                        merged.clone(),
                    ),
                ]
            } else {
                let mut nodes = vec![
                    top,
                    FilterNode::new(
                        Stage::Normalize,
                        vec![label("top")],
                        Filter::new("format").arg("rgba"),
                        label("top_rgba"),
                    ),
                    FilterNode::new(
                        Stage::Normalize,
                        vec![stacked],
                        Filter::new("crop").arg("iw").arg("ih/2").arg(0).arg("ih/2"),
                        label("bottom"),
                    ),
                ];
                nodes.extend(mask_merge(
                    layer,
                    label("top_rgba"),
                    label("bottom"),
                    merged.clone(),
                ));
                nodes
            }
        }
        ForegroundKind::Archive { path } => {
            return Err(VbrError::config(format!(
                "archive foreground {path} must be unpacked before compiling"
            )));
        }
    };

    Ok((nodes, merged))
}

/// Grayscale the mask, binarize it, and merge it as alpha onto `rgba`.
fn mask_merge(layer: usize, rgba: Pad, mask: Pad, output: Pad) -> Vec<FilterNode> {
    let gray = Pad::label(format!("layer_{layer}_mask_gray"));
    let binary = Pad::label(format!("layer_{layer}_binary_mask"));
    vec![
        FilterNode::new(
            Stage::Normalize,
            vec![mask],
            Filter::new("format").arg("gray"),
            gray.clone(),
        ),
        FilterNode::new(
            Stage::Normalize,
            vec![gray],
            Filter::new("geq").arg_expr(binarize_expr()),
            binary.clone(),
        ),
        FilterNode::new(
            Stage::Normalize,
            vec![rgba, binary],
            Filter::new("alphamerge"),
            output,
        ),
    ]
}

/// `-ss start [-t length]`, placed before `-i`.
pub fn trim_args(trim: Option<SourceTrim>) -> Vec<String> {
    let Some(trim) = trim else {
        return Vec::new();
    };
    let mut args = vec!["-ss".to_string(), format_number(trim.start)];
    if let Some(length) = trim.length() {
        args.push("-t".into());
        args.push(format_number(length));
    }
    args
}
