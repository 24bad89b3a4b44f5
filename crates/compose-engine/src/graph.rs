//! Typed filter-graph model and its rendering to ffmpeg syntax.
//!
//! Nodes carry their stage, input pads, filters and output label as data.
//! Only [`FilterGraph::render`] knows about brackets, commas and semicolons.

use std::fmt;

/// Stream kind selected from an input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Video,
    Audio,
}

impl MediaType {
    fn specifier(self) -> &'static str {
        match self {
            Self::Video => "v",
            Self::Audio => "a",
        }
    }
}

/// A pad a node reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pad {
    /// A stream of an input slot, `[3:v]`.
    Input { index: usize, media: MediaType },
    /// A named intermediate pad, `[layer_0_scale]`.
    Label(String),
}

impl Pad {
    pub fn video(index: usize) -> Self {
        Self::Input {
            index,
            media: MediaType::Video,
        }
    }

    pub fn audio(index: usize) -> Self {
        Self::Input {
            index,
            media: MediaType::Audio,
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self::Label(name.into())
    }

    /// The form `-map` expects: `3:v` or `[out]`.
    pub fn map_target(&self) -> String {
        match self {
            Self::Input { index, media } => format!("{index}:{}", media.specifier()),
            Self::Label(name) => format!("[{name}]"),
        }
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input { index, media } => write!(f, "[{index}:{}]", media.specifier()),
            Self::Label(name) => write!(f, "[{name}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Positional(String),
    Named(String, String),
}

/// One filter with its options, e.g. `scale=1920:1080:force_original_aspect_ratio=decrease`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    name: String,
    args: Vec<Arg>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl fmt::Display) -> Self {
        self.args.push(Arg::Positional(value.to_string()));
        self
    }

    pub fn named(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.args.push(Arg::Named(key.into(), value.to_string()));
        self
    }

    /// Named option whose value is an expression that may contain `,` or `:`.
    pub fn named_expr(self, key: impl Into<String>, expr: impl fmt::Display) -> Self {
        self.named(key, format!("'{expr}'"))
    }

    /// Positional expression, quoted.
    pub fn arg_expr(self, expr: impl fmt::Display) -> Self {
        self.arg(format!("'{expr}'"))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of a named option, as rendered.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|arg| match arg {
            Arg::Named(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            match arg {
                Arg::Positional(value) => f.write_str(value)?,
                Arg::Named(key, value) => write!(f, "{key}={value}")?,
            }
        }
        Ok(())
    }
}

/// What a node does in the compiled pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Per-format conversion to RGBA (or RGB).
    Normalize,
    TimelineShift,
    Crop,
    Scale,
    Rotate,
    Opacity,
    Overlay,
    AudioDelay,
    AudioVolume,
    AudioPassthrough,
    AudioMix,
}

/// A filter chain: inputs, one or more filters in sequence, one output.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub stage: Stage,
    pub inputs: Vec<Pad>,
    pub filters: Vec<Filter>,
    pub output: Pad,
}

impl FilterNode {
    pub fn new(stage: Stage, inputs: Vec<Pad>, filter: Filter, output: Pad) -> Self {
        Self {
            stage,
            inputs,
            filters: vec![filter],
            output,
        }
    }

    /// Append a filter to the chain.
    pub fn then(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pad in &self.inputs {
            write!(f, "{pad}")?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{filter}")?;
        }
        write!(f, "{}", self.output)
    }
}

/// Ordered list of nodes forming a `-filter_complex` graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    nodes: Vec<FilterNode>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: FilterNode) {
        self.nodes.push(node);
    }

    pub fn extend(&mut self, nodes: impl IntoIterator<Item = FilterNode>) {
        self.nodes.extend(nodes);
    }

    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes belonging to one stage.
    pub fn stage(&self, stage: Stage) -> impl Iterator<Item = &FilterNode> {
        self.nodes.iter().filter(move |n| n.stage == stage)
    }

    /// Every label written by some node is distinct and every label read
    /// was written earlier.
    pub fn is_well_formed(&self) -> bool {
        let mut written: Vec<&str> = Vec::new();
        for node in &self.nodes {
            for pad in &node.inputs {
                if let Pad::Label(name) = pad {
                    if !written.contains(&name.as_str()) {
                        return false;
                    }
                }
            }
            if let Pad::Label(name) = &node.output {
                if written.contains(&name.as_str()) {
                    return false;
                }
                written.push(name);
            }
        }
        true
    }

    /// Render to ffmpeg syntax, nodes separated by `;`.
    pub fn render(&self) -> String {
        self.nodes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Shortest decimal form of a number: `3` for 3.0, `0.5` for 0.5.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
