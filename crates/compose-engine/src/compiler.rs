//! Composition compiler.
//!
//! [`Compiler::plan`] resolves canvas, duration, input slots and the video
//! and audio graphs as data. [`Compiler::compile`] serializes a plan into
//! the ffmpeg argument vector. Both are pure reads of the composition.

use std::fmt;
use std::path::{Path, PathBuf};

use vbr_common::error::{VbrError, VbrResult};
use vbr_media_model::{Canvas, Composition, Layer};

use crate::audio::{AudioOrigin, AudioPlan, AudioSource};
use crate::context::MediaContext;
use crate::encoder::{EncoderProfile, StreamFormat};
use crate::graph::{format_number, Filter, FilterGraph, FilterNode, Pad, Stage};
use crate::layout::{overlay_position, scale_filter};
use crate::recipe::{
    background_input, foreground_filters, foreground_inputs, Capabilities, InputMap,
    BACKGROUND_KEY,
};

/// Output name used by [`Compiler::dry_run`].
pub const DRY_RUN_OUTPUT: &str = "OUT.mp4";

/// A complete ffmpeg invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Value following the first occurrence of `flag`.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for FfmpegCommand {
    /// Shell-quoted command line, suitable for copy and paste.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let program = self.program.to_string_lossy();
        let words = std::iter::once(program.as_ref()).chain(self.args.iter().map(String::as_str));
        f.write_str(&shell_words::join(words))
    }
}

/// Everything the compiler resolved, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledGraph {
    pub canvas: Canvas,
    pub duration: Option<f64>,
    pub inputs: InputMap,
    pub video: FilterGraph,
    /// Pad mapped as the output video stream.
    pub video_out: Pad,
    pub audio: AudioPlan,
}

impl CompiledGraph {
    /// The `-filter_complex` value: video nodes then audio nodes.
    pub fn filter_complex(&self) -> Option<String> {
        let mut graph = self.video.clone();
        graph.extend(self.audio.nodes().iter().cloned());
        (!graph.is_empty()).then(|| graph.render())
    }

    pub fn overlay_count(&self) -> usize {
        self.video.stage(Stage::Overlay).count()
    }
}

/// Compiles compositions for one ffmpeg binary and its capabilities.
#[derive(Debug, Clone)]
pub struct Compiler {
    program: PathBuf,
    caps: Capabilities,
}

impl Compiler {
    pub fn new(program: impl Into<PathBuf>, caps: Capabilities) -> Self {
        Self {
            program: program.into(),
            caps,
        }
    }

    /// Compiler using the context's ffmpeg and its decoder support.
    pub fn for_context(ctx: &MediaContext) -> Self {
        Self::new(ctx.ffmpeg(), ctx.capabilities())
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Resolve the composition into inputs and filter graphs.
    pub fn plan(&self, comp: &Composition) -> VbrResult<CompiledGraph> {
        let canvas = resolve_canvas(comp)?;
        let duration = resolve_duration(comp);

        let mut inputs = InputMap::new();
        inputs.push(background_input(comp.background(), canvas, self.caps));

        let mut audio_sources = Vec::new();
        for (index, layer) in comp.layers().iter().enumerate() {
            let recipe =
                foreground_inputs(index, &layer.foreground, layer.effective_trim(), self.caps)?;
            for spec in recipe.inputs {
                inputs.push(spec);
            }
            if layer.audio.enabled && layer.foreground.has_audio() != Some(false) {
                audio_sources.push(AudioSource {
                    input: inputs.slot(&recipe.audio_key)?,
                    volume: layer.audio.volume,
                    delay: layer.timing.start,
                    origin: AudioOrigin::Layer(index),
                    confirmed: layer.foreground.has_audio() == Some(true),
                });
            }
        }

        if let Some(background) = comp.background() {
            if background.audio_settings().enabled && background.has_audio() {
                audio_sources.push(AudioSource {
                    input: inputs.slot(BACKGROUND_KEY)?,
                    volume: background.audio_settings().volume,
                    delay: 0.0,
                    origin: AudioOrigin::Background,
                    confirmed: true,
                });
            }
        }

        let (video, video_out) = self.video_graph(comp, canvas, &inputs)?;
        let audio = AudioPlan::build(&audio_sources);

        if duration.is_none() && !comp.layers().is_empty() {
            tracing::warn!(
                layers = comp.layers().len(),
                "Output duration unresolved; export ends only when every input ends"
            );
        }

        Ok(CompiledGraph {
            canvas,
            duration,
            inputs,
            video,
            video_out,
            audio,
        })
    }

    /// Argument vector writing to `output`.
    pub fn compile(
        &self,
        comp: &Composition,
        encoder: &EncoderProfile,
        output: &Path,
    ) -> VbrResult<FfmpegCommand> {
        let plan = self.plan(comp)?;
        Ok(self.assemble(&plan, encoder, None, &output.to_string_lossy()))
    }

    /// Argument vector writing `format` to stdout.
    pub fn compile_for_stream(
        &self,
        comp: &Composition,
        encoder: &EncoderProfile,
        format: StreamFormat,
    ) -> VbrResult<FfmpegCommand> {
        let plan = self.plan(comp)?;
        Ok(self.assemble(&plan, encoder, Some(format), "-"))
    }

    /// Display string of the H.264 command, without running anything.
    pub fn dry_run(&self, comp: &Composition) -> VbrResult<String> {
        let command = self.compile(comp, &EncoderProfile::h264(), Path::new(DRY_RUN_OUTPUT))?;
        Ok(command.to_string())
    }

    fn assemble(
        &self,
        plan: &CompiledGraph,
        encoder: &EncoderProfile,
        stream: Option<StreamFormat>,
        output: &str,
    ) -> FfmpegCommand {
        let mut args = vec!["-y".to_string()];
        args.extend(plan.inputs.args().iter().cloned());

        if let Some(graph) = plan.filter_complex() {
            args.push("-filter_complex".into());
            args.push(graph);
        }

        args.push("-map".into());
        args.push(plan.video_out.map_target());
        args.extend(plan.audio.map_args());

        if let Some(duration) = plan.duration.filter(|d| *d > 0.0) {
            args.push("-t".into());
            args.push(format_number(duration));
        }

        args.extend(encoder.args());
        if let Some(format) = stream {
            args.extend(format.args());
        }
        args.push(output.to_string());

        let command = FfmpegCommand::new(&self.program, args);
        tracing::debug!(
            inputs = plan.inputs.len(),
            overlays = plan.overlay_count(),
            command = %command,
            "Compiled composition"
        );
        command
    }

    fn video_graph(
        &self,
        comp: &Composition,
        canvas: Canvas,
        inputs: &InputMap,
    ) -> VbrResult<(FilterGraph, Pad)> {
        let mut graph = FilterGraph::new();
        let mut canvas_pad = Pad::video(inputs.slot(BACKGROUND_KEY)?);

        let ordered = comp.layers_by_z();
        let last = ordered.len().saturating_sub(1);
        for (k, (index, layer)) in ordered.into_iter().enumerate() {
            let end = layer
                .timing
                .resolved_end(&layer.name)
                .map_err(|e| VbrError::config(e.to_string()))?;

            let (nodes, normalized) =
                foreground_filters(index, &layer.foreground, inputs, layer.alpha)?;
            graph.extend(nodes);
            let layer_out = transform_layer(&mut graph, index, layer, canvas, normalized);

            let (x, y) = overlay_position(&layer.position, &layer.size, canvas);
            let mut overlay = Filter::new("overlay")
                .named_expr("x", x)
                .named_expr("y", y)
                .named("eof_action", "pass");
            let start = layer.timing.start;
            if let Some(end) = end {
                overlay = overlay.named_expr(
                    "enable",
                    format!("between(t,{},{})", format_number(start), format_number(end)),
                );
            } else if layer.timing.is_shifted() {
                overlay = overlay.named_expr("enable", format!("gte(t,{})", format_number(start)));
            }

            let output = if k == last {
                Pad::label("out")
            } else {
                Pad::label(format!("tmp{k}"))
            };
            graph.push(FilterNode::new(
                Stage::Overlay,
                vec![canvas_pad, layer_out],
                overlay,
                output.clone(),
            ));
            canvas_pad = output;
        }

        Ok((graph, canvas_pad))
    }
}

/// Thread a normalized layer through shift, crop, scale, rotate and opacity.
/// Stages at their identity value are skipped. Returns the final pad.
fn transform_layer(
    graph: &mut FilterGraph,
    index: usize,
    layer: &Layer,
    canvas: Canvas,
    input: Pad,
) -> Pad {
    let label = |suffix: &str| Pad::label(format!("layer_{index}_{suffix}"));
    let mut current = input;

    if layer.timing.is_shifted() {
        let node = FilterNode::new(
            Stage::TimelineShift,
            vec![current],
            Filter::new("setpts").arg("PTS-STARTPTS"),
            label("timed"),
        )
        .then(
            Filter::new("setpts").arg(format!("PTS+{}/TB", format_number(layer.timing.start))),
        );
        current = step(graph, node);
    }

    if let Some(crop) = layer.crop {
        let node = FilterNode::new(
            Stage::Crop,
            vec![current],
            Filter::new("crop")
                .arg(crop.width)
                .arg(crop.height)
                .arg(crop.x)
                .arg(crop.y),
            label("crop"),
        );
        current = step(graph, node);
    }

    if let Some(scale) = scale_filter(&layer.size, canvas) {
        current = step(
            graph,
            FilterNode::new(Stage::Scale, vec![current], scale, label("scale")),
        );
    }

    if layer.needs_rotation() {
        let mut rotate =
            Filter::new("rotate").arg(format!("{}*PI/180", format_number(layer.rotation)));
        if layer.alpha {
            rotate = rotate.named("fillcolor", "none");
        }
        current = step(
            graph,
            FilterNode::new(Stage::Rotate, vec![current], rotate, label("rotate")),
        );
    }

    if layer.needs_opacity() {
        let mixer = Filter::new("colorchannelmixer").named("aa", format_number(layer.opacity));
        let node = if layer.alpha {
            FilterNode::new(Stage::Opacity, vec![current], mixer, label("opacity"))
        } else {
            FilterNode::new(
                Stage::Opacity,
                vec![current],
                Filter::new("format").arg("rgba"),
                label("opacity"),
            )
            .then(mixer)
        };
        current = step(graph, node);
    }

    current
}

fn step(graph: &mut FilterGraph, node: FilterNode) -> Pad {
    let output = node.output.clone();
    graph.push(node);
    output
}

/// Canvas from the background, else the composition's hint.
pub fn resolve_canvas(comp: &Composition) -> VbrResult<Canvas> {
    if let Some(canvas) = comp
        .background()
        .map(|bg| bg.canvas())
        .filter(Canvas::is_valid)
    {
        return Ok(canvas);
    }
    comp.canvas_hint().filter(Canvas::is_valid).ok_or_else(|| {
        VbrError::config(
            "Cannot determine canvas size: set a background or call set_canvas(width, height, fps)",
        )
    })
}

/// Output duration, first match wins: explicit override, then a video
/// background's duration, then the longest layer.
pub fn resolve_duration(comp: &Composition) -> Option<f64> {
    if let Some(explicit) = comp.duration_override() {
        return Some(explicit);
    }

    if let Some(background) = comp.background().filter(|bg| bg.is_duration_authority()) {
        if let Some(duration) = background.duration().filter(|d| *d > 0.0) {
            return Some(duration);
        }
    }

    comp.layers()
        .iter()
        .filter_map(Layer::source_duration)
        .filter(|d| *d > 0.0)
        .fold(None, |longest: Option<f64>, d| {
            Some(longest.map_or(d, |l| l.max(d)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbr_media_model::{Anchor, Background, Foreground, MediaInfo, Size};

    fn hd() -> Canvas {
        Canvas::new(1920, 1080, 30.0).unwrap()
    }

    fn webm(path: &str, duration: f64) -> Foreground {
        let mut info = MediaInfo::fallback(path);
        info.duration = Some(duration);
        Foreground::webm_vp9(path, info)
    }

    fn compiler() -> Compiler {
        Compiler::new("ffmpeg", Capabilities::default())
    }

    fn filter_complex(command: &FfmpegCommand) -> &str {
        command.value_of("-filter_complex").unwrap_or_default()
    }

    #[test]
    fn test_canvas_from_hint_when_background_missing() {
        let mut comp = Composition::default();
        assert!(resolve_canvas(&comp).unwrap_err().is_config());

        comp.set_canvas(640, 480, 24.0).unwrap();
        assert_eq!(resolve_canvas(&comp).unwrap(), Canvas::new(640, 480, 24.0).unwrap());
    }

    #[test]
    fn test_background_canvas_wins_over_hint() {
        let mut comp = Composition::new(Background::color("red", hd()));
        comp.set_canvas(640, 480, 24.0).unwrap();
        assert_eq!(resolve_canvas(&comp).unwrap(), hd());
    }

    #[test]
    fn test_no_layers_maps_background() {
        let comp = Composition::new(Background::color("blue", hd()));
        let command = compiler()
            .compile(&comp, &EncoderProfile::h264(), Path::new("out.mp4"))
            .unwrap();
        assert!(command.value_of("-filter_complex").is_none());
        assert_eq!(command.value_of("-map"), Some("0:v"));
        assert!(command.args().contains(&"-an".to_string()));
        assert!(command.value_of("-t").is_none());
    }

    #[test]
    fn test_full_transform_chain_order() {
        let mut comp = Composition::new(Background::color("black", hd()));
        comp.add(webm("fg.webm", 6.0))
            .start(2.0)
            .crop(10, 20, 300, 400)
            .size(Size::Pixels {
                width: 640,
                height: 360,
            })
            .rotate(90.0)
            .opacity(0.5)
            .at(Anchor::TopLeft, 0, 0);

        let plan = compiler().plan(&comp).unwrap();
        let stages: Vec<Stage> = plan.video.nodes().iter().map(|n| n.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::TimelineShift,
                Stage::Crop,
                Stage::Scale,
                Stage::Rotate,
                Stage::Opacity,
                Stage::Overlay
            ]
        );
        assert!(plan.video.is_well_formed());
        assert_eq!(
            plan.video.render(),
            "[1:v]setpts=PTS-STARTPTS,setpts=PTS+2/TB[layer_0_timed];\
             [layer_0_timed]crop=300:400:10:20[layer_0_crop];\
             [layer_0_crop]scale=640:360[layer_0_scale];\
             [layer_0_scale]rotate=90*PI/180:fillcolor=none[layer_0_rotate];\
             [layer_0_rotate]colorchannelmixer=aa=0.5[layer_0_opacity];\
             [0:v][layer_0_opacity]overlay=x='0':y='0':eof_action=pass:enable='gte(t,2)'[out]"
        );
    }

    #[test]
    fn test_opacity_on_rgb_layer_adds_alpha_plane() {
        let mut comp = Composition::new(Background::color("black", hd()));
        comp.add(webm("fg.webm", 6.0))
            .alpha(false)
            .opacity(0.25)
            .size(Size::scale(1.0));
        let plan = compiler().plan(&comp).unwrap();
        let opacity = plan.video.stage(Stage::Opacity).next().unwrap();
        assert_eq!(
            opacity.to_string(),
            "[layer_0_merged]format=rgba,colorchannelmixer=aa=0.25[layer_0_opacity]"
        );
    }

    #[test]
    fn test_rotation_without_alpha_keeps_default_fill() {
        let mut comp = Composition::new(Background::color("black", hd()));
        comp.add(webm("fg.webm", 6.0)).alpha(false).rotate(-15.0);
        let plan = compiler().plan(&comp).unwrap();
        let rotate = plan.video.stage(Stage::Rotate).next().unwrap();
        assert_eq!(rotate.filters[0].to_string(), "rotate=-15*PI/180");
    }

    #[test]
    fn test_overlay_chain_follows_z_order() {
        let mut comp = Composition::new(Background::color("black", hd()));
        comp.add(webm("a.webm", 3.0)).z(5);
        comp.add(webm("b.webm", 3.0)).z(1);
        comp.add(webm("c.webm", 3.0)).z(3);

        let plan = compiler().plan(&comp).unwrap();
        let overlays: Vec<String> = plan
            .video
            .stage(Stage::Overlay)
            .map(|n| {
                n.inputs
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("")
                    + &n.output.to_string()
            })
            .collect();
        assert_eq!(
            overlays,
            vec![
                "[0:v][layer_1_scale][tmp0]",
                "[tmp0][layer_2_scale][tmp1]",
                "[tmp1][layer_0_scale][out]"
            ]
        );
    }

    #[test]
    fn test_enable_window_from_duration() {
        let mut comp = Composition::new(Background::color("black", hd()));
        comp.add(webm("a.webm", 10.0)).start(1.5).duration(2.0);
        let command = compiler()
            .compile(&comp, &EncoderProfile::h264(), Path::new("o.mp4"))
            .unwrap();
        assert!(filter_complex(&command).contains(":enable='between(t,1.5,3.5)'[out]"));
    }

    #[test]
    fn test_conflicting_timing_rejected() {
        let mut comp = Composition::new(Background::color("black", hd()));
        comp.add(webm("a.webm", 10.0)).start(1.0).end(4.0).duration(2.0);
        let err = compiler().plan(&comp).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("layer0"));
    }

    #[test]
    fn test_foreground_without_audio_is_skipped() {
        let info = MediaInfo::from_streams(
            "a.webm",
            vec![vbr_media_model::StreamInfo {
                codec_type: vbr_media_model::StreamType::Video,
                codec_name: Some("vp9".into()),
                pix_fmt: Some("yuva420p".into()),
                width: Some(640),
                height: Some(480),
                duration: Some(4.0),
            }],
            None,
        )
        .unwrap();
        let mut comp = Composition::new(Background::color("black", hd()));
        comp.add(Foreground::webm_vp9("a.webm", info));
        let plan = compiler().plan(&comp).unwrap();
        assert_eq!(plan.audio, AudioPlan::Silent);
    }

    #[test]
    fn test_stream_output() {
        let mut comp = Composition::new(Background::color("black", hd()));
        comp.add(webm("a.webm", 4.0));
        let command = compiler()
            .compile_for_stream(&comp, &EncoderProfile::vp9(), StreamFormat::Webm)
            .unwrap();
        let args = command.args();
        assert_eq!(args.last().map(String::as_str), Some("-"));
        assert_eq!(&args[args.len() - 3..args.len() - 1], ["-f", "webm"]);
    }

    #[test]
    fn test_duration_override_of_zero_omits_clamp() {
        let mut comp = Composition::new(Background::color("black", hd()));
        comp.add(webm("a.webm", 4.0));
        comp.set_duration(0.0);
        assert_eq!(resolve_duration(&comp), Some(0.0));
        let command = compiler()
            .compile(&comp, &EncoderProfile::h264(), Path::new("o.mp4"))
            .unwrap();
        assert!(command.value_of("-t").is_none());
    }

    #[test]
    fn test_display_quotes_filter_graph() {
        let mut comp = Composition::new(Background::color("black", hd()));
        comp.add(webm("my clip.webm", 4.0));
        let command = compiler()
            .compile(&comp, &EncoderProfile::h264(), Path::new("out.mp4"))
            .unwrap();
        let line = command.to_string();
        assert!(line.starts_with("ffmpeg -y "));
        assert_eq!(shell_words::split(&line).unwrap()[1..], command.args()[..]);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn foreground(kind: u8, index: usize) -> Foreground {
            let info = MediaInfo::fallback("clip");
            match kind % 4 {
                0 => Foreground::webm_vp9(format!("l{index}.webm"), info),
                1 => Foreground::mov_prores(format!("l{index}.mov"), info),
                2 => Foreground::stacked(format!("l{index}.mp4"), info),
                _ => Foreground::video_and_mask(
                    format!("l{index}_color.mp4"),
                    format!("l{index}_alpha.mp4"),
                    None,
                    info,
                ),
            }
        }

        proptest! {
            #[test]
            fn every_layer_gets_one_overlay_in_a_well_formed_graph(
                layers in prop::collection::vec(
                    (0u8..4, -3i32..3, 0.0f64..5.0, 0.0f64..=1.0, any::<bool>(), 0.0f64..90.0),
                    1..6,
                ),
            ) {
                let mut comp = Composition::new(Background::color("black", hd()));
                for (i, (kind, z, start, opacity, alpha, rotation)) in layers.iter().enumerate() {
                    comp.add(foreground(*kind, i))
                        .z(*z)
                        .start(*start)
                        .opacity(*opacity)
                        .alpha(*alpha)
                        .rotate(*rotation);
                }

                let plan = compiler().plan(&comp).unwrap();
                prop_assert_eq!(plan.overlay_count(), layers.len());
                prop_assert!(plan.video.is_well_formed());
                prop_assert_eq!(plan.video_out.clone(), Pad::label("out"));

                let mut full = plan.video.clone();
                full.extend(plan.audio.nodes().iter().cloned());
                prop_assert!(full.is_well_formed());
            }
        }
    }
}
