//! Encoder profiles and streaming containers.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vbr_common::error::VbrError;

use crate::graph::format_number;

/// Output codec settings appended after the maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncoderProfile {
    H264 { crf: u8, preset: String },
    Vp9 { crf: u8 },
    /// VP9 keeping the alpha plane.
    TransparentWebm { crf: u8 },
    ProRes4444,
    PngSequence { fps: Option<f64> },
    /// Same encoding as H.264; the stacked layout is produced upstream.
    StackedVideo { crf: u8, preset: String },
}

impl EncoderProfile {
    pub fn h264() -> Self {
        Self::H264 {
            crf: 18,
            preset: "medium".to_string(),
        }
    }

    pub fn vp9() -> Self {
        Self::Vp9 { crf: 32 }
    }

    pub fn transparent_webm() -> Self {
        Self::TransparentWebm { crf: 28 }
    }

    pub fn stacked_video() -> Self {
        Self::StackedVideo {
            crf: 18,
            preset: "medium".to_string(),
        }
    }

    /// Codec arguments, without the output path.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::H264 { crf, preset } | Self::StackedVideo { crf, preset } => vec![
                "-c:v".into(),
                "libx264".into(),
                "-crf".into(),
                crf.to_string(),
                "-preset".into(),
                preset.clone(),
                "-pix_fmt".into(),
                "yuv420p".into(),
            ],
            Self::Vp9 { crf } => vec![
                "-c:v".into(),
                "libvpx-vp9".into(),
                "-crf".into(),
                crf.to_string(),
                "-b:v".into(),
                "0".into(),
            ],
            Self::TransparentWebm { crf } => vec![
                "-c:v".into(),
                "libvpx-vp9".into(),
                "-crf".into(),
                crf.to_string(),
                "-b:v".into(),
                "0".into(),
                "-pix_fmt".into(),
                "yuva420p".into(),
                "-auto-alt-ref".into(),
                "0".into(),
            ],
            Self::ProRes4444 => vec![
                "-c:v".into(),
                "prores_ks".into(),
                "-profile:v".into(),
                "4".into(),
                "-pix_fmt".into(),
                "yuva444p10le".into(),
            ],
            Self::PngSequence { fps } => {
                let mut args: Vec<String> = vec![
                    "-c:v".into(),
                    "png".into(),
                    "-pix_fmt".into(),
                    "rgba".into(),
                ];
                if let Some(fps) = fps {
                    args.push("-r".into());
                    args.push(format_number(*fps));
                }
                args
            }
        }
    }

    /// Name accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::H264 { .. } => "h264",
            Self::Vp9 { .. } => "vp9",
            Self::TransparentWebm { .. } => "transparent-webm",
            Self::ProRes4444 => "prores-4444",
            Self::PngSequence { .. } => "png-sequence",
            Self::StackedVideo { .. } => "stacked-video",
        }
    }

    /// Whether the profile keeps an alpha plane in the output.
    pub fn preserves_alpha(&self) -> bool {
        matches!(
            self,
            Self::TransparentWebm { .. } | Self::ProRes4444 | Self::PngSequence { .. }
        )
    }
}

impl Default for EncoderProfile {
    fn default() -> Self {
        Self::h264()
    }
}

impl FromStr for EncoderProfile {
    type Err = VbrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "h264" => Ok(Self::h264()),
            "vp9" => Ok(Self::vp9()),
            "transparent-webm" => Ok(Self::transparent_webm()),
            "prores-4444" => Ok(Self::ProRes4444),
            "png-sequence" => Ok(Self::PngSequence { fps: None }),
            "stacked-video" => Ok(Self::stacked_video()),
            other => Err(VbrError::config(format!(
                "Unknown encoder: {other}. Use: h264, vp9, transparent-webm, prores-4444, png-sequence, stacked-video"
            ))),
        }
    }
}

/// Container used when writing to a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFormat {
    Y4m,
    Webm,
    Matroska,
    Mp4Fragmented,
}

impl StreamFormat {
    pub fn args(self) -> Vec<String> {
        let args: &[&str] = match self {
            Self::Y4m => &["-f", "yuv4mpegpipe"],
            Self::Webm => &["-f", "webm"],
            Self::Matroska => &["-f", "matroska"],
            Self::Mp4Fragmented => &["-f", "mp4", "-movflags", "frag_keyframe+empty_moov"],
        };
        args.iter().map(|s| s.to_string()).collect()
    }
}

impl FromStr for StreamFormat {
    type Err = VbrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "y4m" => Ok(Self::Y4m),
            "webm" => Ok(Self::Webm),
            "matroska" | "mkv" => Ok(Self::Matroska),
            "mp4-fragmented" => Ok(Self::Mp4Fragmented),
            other => Err(VbrError::config(format!(
                "Unknown stream format: {other}. Use: y4m, webm, matroska, mp4-fragmented"
            ))),
        }
    }
}
