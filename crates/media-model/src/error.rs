//! Validation errors raised by the data model.

/// Errors raised while building or validating model values.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Layer '{layer}' sets end={end} and duration={duration} from start={start}, which disagree")]
    ConflictingTiming {
        layer: String,
        start: f64,
        end: f64,
        duration: f64,
    },

    #[error("Unsupported foreground file extension '{extension}' for {path}")]
    UnsupportedExtension { path: String, extension: String },

    #[error("Invalid canvas {width}x{height}@{fps}: all values must be positive")]
    InvalidCanvas { width: u32, height: u32, fps: f64 },

    #[error("Invalid source trim: start={start}, end={end:?}")]
    InvalidTrim { start: f64, end: Option<f64> },

    #[error("Only video backgrounds can be trimmed")]
    NotTrimmable,
}
