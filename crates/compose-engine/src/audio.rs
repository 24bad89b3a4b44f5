//! Audio graph: delay, volume and mixing, planned apart from the video graph.

use crate::graph::{format_number, Filter, FilterNode, Pad, Stage};

/// Where an audio source comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOrigin {
    /// Layer by insertion index.
    Layer(usize),
    Background,
}

/// One enabled audio stream feeding the output.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    /// Input slot carrying the stream.
    pub input: usize,
    pub volume: f64,
    /// Output-time offset in seconds. Always zero for the background.
    pub delay: f64,
    pub origin: AudioOrigin,
    /// The probe saw an audio stream (or a separate audio file was given).
    /// Unconfirmed streams may only be mapped with `?`.
    pub confirmed: bool,
}

impl AudioSource {
    fn is_untouched(&self) -> bool {
        !self.needs_delay() && !self.needs_volume()
    }

    fn needs_delay(&self) -> bool {
        self.delay > 0.0
    }

    fn needs_volume(&self) -> bool {
        (self.volume - 1.0).abs() > f64::EPSILON
    }
}

/// How the output audio track is produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioPlan {
    /// No enabled source: `-an`.
    Silent,
    /// A single untouched source mapped straight from its input slot.
    Direct(usize),
    /// Filter nodes ending in `[audio_out]`.
    Filtered(Vec<FilterNode>),
}

/// Label of the final audio pad.
pub const AUDIO_OUT: &str = "audio_out";

impl AudioPlan {
    /// Plan the audio graph for the given sources, in order.
    ///
    /// A filter graph fails on a stream specifier that matches nothing, so
    /// sources without a confirmed audio stream are dropped unless the
    /// whole plan is a single `?` map.
    pub fn build(sources: &[AudioSource]) -> Self {
        if let [only] = sources {
            if only.is_untouched() {
                return Self::Direct(only.input);
            }
        }

        let (confirmed, unknown): (Vec<_>, Vec<_>) =
            sources.iter().cloned().partition(|s| s.confirmed);
        for source in &unknown {
            tracing::warn!(
                input = source.input,
                origin = ?source.origin,
                "Skipping audio of a source whose audio stream is unconfirmed"
            );
        }

        match confirmed.as_slice() {
            [] => Self::Silent,
            [only] if only.is_untouched() => Self::Direct(only.input),
            [only] => Self::Filtered(single_source(only)),
            many => Self::Filtered(mixed(many)),
        }
    }

    /// Nodes to append after the video graph.
    pub fn nodes(&self) -> &[FilterNode] {
        match self {
            Self::Filtered(nodes) => nodes,
            Self::Silent | Self::Direct(_) => &[],
        }
    }

    /// `-map` (or `-an`) arguments for the audio track.
    ///
    /// A direct map uses the optional `?` form so a clip without audio
    /// does not fail the export.
    pub fn map_args(&self) -> Vec<String> {
        match self {
            Self::Silent => vec!["-an".to_string()],
            Self::Direct(input) => vec![
                "-map".to_string(),
                format!("{}?", Pad::audio(*input).map_target()),
            ],
            Self::Filtered(_) => vec!["-map".to_string(), Pad::label(AUDIO_OUT).map_target()],
        }
    }
}

/// Milliseconds for `adelay`, rounded to the nearest millisecond.
pub fn delay_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

fn delay_filter(seconds: f64) -> Filter {
    let ms = delay_ms(seconds);
    Filter::new("adelay").arg(format!("{ms}|{ms}"))
}

fn volume_filter(volume: f64) -> Filter {
    Filter::new("volume").arg(format_number(volume))
}

fn single_source(source: &AudioSource) -> Vec<FilterNode> {
    let mut nodes = Vec::new();
    let mut current = Pad::audio(source.input);

    if source.needs_delay() {
        let delayed = Pad::label("audio_delayed");
        nodes.push(FilterNode::new(
            Stage::AudioDelay,
            vec![current],
            delay_filter(source.delay),
            delayed.clone(),
        ));
        current = delayed;
    }

    let (stage, filter) = if source.needs_volume() {
        (Stage::AudioVolume, volume_filter(source.volume))
    } else {
        (Stage::AudioPassthrough, Filter::new("anull"))
    };
    nodes.push(FilterNode::new(
        stage,
        vec![current],
        filter,
        Pad::label(AUDIO_OUT),
    ));
    nodes
}

fn mixed(sources: &[AudioSource]) -> Vec<FilterNode> {
    let mut nodes = Vec::new();
    let mut mix_inputs = Vec::with_capacity(sources.len());

    for (i, source) in sources.iter().enumerate() {
        let mut current = Pad::audio(source.input);
        if source.needs_delay() {
            let delayed = Pad::label(format!("audio_delayed_{i}"));
            nodes.push(FilterNode::new(
                Stage::AudioDelay,
                vec![current],
                delay_filter(source.delay),
                delayed.clone(),
            ));
            current = delayed;
        }
        if source.needs_volume() {
            let adjusted = Pad::label(format!("audio_vol_{i}"));
            nodes.push(FilterNode::new(
                Stage::AudioVolume,
                vec![current],
                volume_filter(source.volume),
                adjusted.clone(),
            ));
            current = adjusted;
        }
        mix_inputs.push(current);
    }

    nodes.push(FilterNode::new(
        Stage::AudioMix,
        mix_inputs,
        Filter::new("amix")
            .named("inputs", sources.len())
            .named("duration", "longest"),
        Pad::label(AUDIO_OUT),
    ));
    nodes
}
