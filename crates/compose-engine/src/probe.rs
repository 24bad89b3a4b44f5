//! ffprobe runner and parsers.
//!
//! [`Prober::probe`] never fails: any error degrades to
//! [`MediaInfo::fallback`]. The geometry probes used for backgrounds do
//! fail, since a background without dimensions cannot be compiled.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use vbr_common::config::MediaConfig;
use vbr_common::error::{VbrError, VbrResult};
use vbr_media_model::{MediaInfo, SourceKind, StreamInfo, StreamType};

use crate::process::run_with_timeout;

/// Frame rate assumed when the stream does not report a usable one.
pub const DEFAULT_FPS: f64 = 30.0;

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<StreamType>,
    codec_name: Option<String>,
    pix_fmt: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    r_frame_rate: Option<String>,
    tags: Option<StreamTags>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
}

#[derive(Debug, Deserialize)]
struct StreamTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl ProbeStream {
    /// Absolute rotation in degrees, from side data first, then the legacy tag.
    fn rotation(&self) -> u32 {
        let side = self.side_data_list.iter().find_map(|s| s.rotation);
        let tag = self
            .tags
            .as_ref()
            .and_then(|t| t.rotate.as_deref())
            .and_then(|r| r.trim().parse::<f64>().ok());
        side.or(tag)
            .map(|deg| (deg.abs().round() as u32) % 360)
            .unwrap_or(0)
    }
}

/// Display geometry of a video background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoGeometry {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: Option<f64>,
    /// Rotation metadata in degrees; already applied to width/height.
    pub rotation: u32,
}

/// Arguments for the metadata probe of `source`.
pub fn probe_args(source: &str) -> Vec<String> {
    [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_entries",
        "stream=codec_name,codec_type,pix_fmt,width,height,duration:format=duration",
        "-probesize",
        "1M",
        "-analyzeduration",
        "5M",
        source,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn geometry_args(entries: &str, source: &str) -> Vec<String> {
    [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-select_streams",
        "v:0",
        "-show_entries",
        entries,
        source,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite())
}

/// Parse `num/den` (or a plain number) into frames per second.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Build [`MediaInfo`] from the metadata probe's JSON.
pub fn parse_probe_output(source: &str, json: &str) -> VbrResult<MediaInfo> {
    let output: ProbeOutput = serde_json::from_str(json)?;
    let format_duration = output
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()));

    let streams: Vec<StreamInfo> = output
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            codec_type: s.codec_type.unwrap_or(StreamType::Other),
            duration: parse_seconds(s.duration.as_deref()),
            codec_name: s.codec_name,
            pix_fmt: s.pix_fmt,
            width: s.width,
            height: s.height,
        })
        .collect();

    MediaInfo::from_streams(source, streams, format_duration)
        .ok_or_else(|| VbrError::probe(format!("no video stream in {source}")))
}

/// Parse the video geometry probe, swapping dimensions for 90/270 rotation.
pub fn parse_geometry(json: &str) -> VbrResult<VideoGeometry> {
    let output: ProbeOutput = serde_json::from_str(json)?;
    let stream = output
        .streams
        .first()
        .ok_or_else(|| VbrError::probe("no video stream found"))?;
    let (Some(mut width), Some(mut height)) = (stream.width, stream.height) else {
        return Err(VbrError::probe("could not determine video dimensions"));
    };

    let rotation = stream.rotation();
    if rotation == 90 || rotation == 270 {
        std::mem::swap(&mut width, &mut height);
        tracing::debug!(rotation, width, height, "Swapped dimensions for rotated video");
    }

    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(DEFAULT_FPS);
    let duration = output
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()));

    Ok(VideoGeometry {
        width,
        height,
        fps,
        duration,
        rotation,
    })
}

/// Parse the image dimension probe.
pub fn parse_image_dimensions(json: &str) -> VbrResult<(u32, u32)> {
    let output: ProbeOutput = serde_json::from_str(json)?;
    let stream = output
        .streams
        .first()
        .ok_or_else(|| VbrError::probe("no image stream found"))?;
    match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(VbrError::probe("could not determine image dimensions")),
    }
}

/// Runs ffprobe with per-source-kind timeouts.
#[derive(Debug, Clone)]
pub struct Prober {
    ffprobe: PathBuf,
    local_timeout: Duration,
    remote_timeout: Duration,
}

impl Prober {
    pub fn new(ffprobe: impl Into<PathBuf>, local_timeout: Duration, remote_timeout: Duration) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            local_timeout,
            remote_timeout,
        }
    }

    pub fn from_config(ffprobe: impl Into<PathBuf>, config: &MediaConfig) -> Self {
        Self::new(
            ffprobe,
            Duration::from_secs(config.probe_timeout_secs),
            Duration::from_secs(config.url_probe_timeout_secs),
        )
    }

    fn timeout_for(&self, source: &str) -> Duration {
        if SourceKind::detect(source).is_remote() {
            self.remote_timeout
        } else {
            self.local_timeout
        }
    }

    fn run_json(&self, args: Vec<String>, source: &str) -> VbrResult<String> {
        let output = run_with_timeout(&self.ffprobe, &args, self.timeout_for(source))
            .map_err(|e| VbrError::probe(e.to_string()))?;
        if !output.status.success() {
            return Err(VbrError::probe(format!(
                "ffprobe exited with {} for {source}: {}",
                output.status,
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    /// Probed metadata, or the extension-based fallback on any failure.
    pub fn probe(&self, source: &str) -> MediaInfo {
        match self.try_probe(source) {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!(source, error = %err, "Probe failed, using fallback metadata");
                MediaInfo::fallback(source)
            }
        }
    }

    pub fn try_probe(&self, source: &str) -> VbrResult<MediaInfo> {
        let json = self.run_json(probe_args(source), source)?;
        parse_probe_output(source, &json)
    }

    pub fn video_geometry(&self, source: &str) -> VbrResult<VideoGeometry> {
        let json = self.run_json(
            geometry_args(
                "stream=width,height,r_frame_rate:stream_tags=rotate:stream_side_data=rotation:format=duration",
                source,
            ),
            source,
        )?;
        parse_geometry(&json).map_err(|e| with_source(source, e))
    }

    pub fn image_dimensions(&self, source: &str) -> VbrResult<(u32, u32)> {
        let json = self.run_json(geometry_args("stream=width,height", source), source)?;
        parse_image_dimensions(&json).map_err(|e| with_source(source, e))
    }
}

fn with_source(source: &str, err: VbrError) -> VbrError {
    match err {
        VbrError::Probe { message } => VbrError::probe(format!("{source}: {message}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vp9_alpha_with_audio() {
        let json = r#"{
            "streams": [
                {"codec_name": "vp9", "codec_type": "video", "pix_fmt": "yuva420p",
                 "width": 1280, "height": 720, "duration": "8.500000"},
                {"codec_name": "opus", "codec_type": "audio"}
            ],
            "format": {"duration": "8.520000"}
        }"#;
        let info = parse_probe_output("fg.webm", json).unwrap();
        assert!(info.probed);
        assert!(info.has_alpha);
        assert!(info.needs_vp9_decoder);
        assert_eq!(info.width, Some(1280));
        assert_eq!(info.duration, Some(8.5));
        assert_eq!(info.has_audio_stream(), Some(true));
    }

    #[test]
    fn test_format_duration_used_when_stream_lacks_one() {
        let json = r#"{
            "streams": [{"codec_name": "prores", "codec_type": "video", "pix_fmt": "yuva444p10le"}],
            "format": {"duration": "3.000000"}
        }"#;
        let info = parse_probe_output("fg.mov", json).unwrap();
        assert_eq!(info.duration, Some(3.0));
        assert!(!info.has_alpha);
        assert_eq!(info.has_audio_stream(), Some(false));
    }

    #[test]
    fn test_no_video_stream_is_error() {
        let json = r#"{"streams": [{"codec_type": "audio", "codec_name": "aac"}]}"#;
        assert!(parse_probe_output("a.m4a", json).is_err());
        assert!(parse_probe_output("x", "not json").is_err());
    }

    #[test]
    fn test_unknown_codec_type_tolerated() {
        let json = r#"{"streams": [
            {"codec_type": "attachment"},
            {"codec_type": "video", "codec_name": "h264", "pix_fmt": "yuv420p"}
        ]}"#;
        let info = parse_probe_output("v.mkv", json).unwrap();
        assert_eq!(info.streams[0].codec_type, StreamType::Other);
        assert_eq!(info.codec_name.as_deref(), Some("h264"));
    }

    #[test]
    fn test_geometry_swaps_for_rotation_tag() {
        let json = r#"{
            "streams": [{"width": 1920, "height": 1080, "r_frame_rate": "30000/1001",
                         "tags": {"rotate": "90"}}],
            "format": {"duration": "12.0"}
        }"#;
        let geometry = parse_geometry(json).unwrap();
        assert_eq!((geometry.width, geometry.height), (1080, 1920));
        assert!((geometry.fps - 29.97).abs() < 0.01);
        assert_eq!(geometry.duration, Some(12.0));
        assert_eq!(geometry.rotation, 90);
    }

    #[test]
    fn test_geometry_side_data_rotation() {
        let json = r#"{
            "streams": [{"width": 1280, "height": 720, "r_frame_rate": "25/1",
                         "side_data_list": [{"rotation": -90}]}]
        }"#;
        let geometry = parse_geometry(json).unwrap();
        assert_eq!((geometry.width, geometry.height), (720, 1280));
        assert_eq!(geometry.fps, 25.0);
        assert_eq!(geometry.duration, None);
    }

    #[test]
    fn test_geometry_defaults_fps() {
        let json = r#"{"streams": [{"width": 640, "height": 480, "r_frame_rate": "0/0"}]}"#;
        assert_eq!(parse_geometry(json).unwrap().fps, DEFAULT_FPS);
        assert!(parse_geometry(r#"{"streams": []}"#).is_err());
    }

    #[test]
    fn test_frame_rate_forms() {
        assert_eq!(parse_frame_rate("24/1"), Some(24.0));
        assert_eq!(parse_frame_rate("60"), Some(60.0));
        assert_eq!(parse_frame_rate("1/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_image_dimensions() {
        let json = r#"{"streams": [{"width": 800, "height": 600}]}"#;
        assert_eq!(parse_image_dimensions(json).unwrap(), (800, 600));
        assert!(parse_image_dimensions(r#"{"streams": [{"width": 800}]}"#).is_err());
    }

    #[test]
    fn test_probe_args_shape() {
        let args = probe_args("clip.webm");
        assert_eq!(args.last().map(String::as_str), Some("clip.webm"));
        assert!(args.windows(2).any(|w| w == ["-probesize", "1M"]));
        assert!(args.windows(2).any(|w| w == ["-analyzeduration", "5M"]));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_ffprobe_falls_back() {
        let prober = Prober::new(
            "/nonexistent/ffprobe",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let info = prober.probe("clip.webm");
        assert!(!info.probed);
        assert!(info.needs_vp9_decoder);
        assert!(prober.video_geometry("clip.webm").is_err());
    }
}
