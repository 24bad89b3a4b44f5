//! Error types shared across vbr crates.

use std::path::PathBuf;

/// Top-level error type for vbr operations.
#[derive(Debug, thiserror::Error)]
pub enum VbrError {
    /// Composition cannot be compiled as configured (no canvas size,
    /// malformed archive, contradictory layer timing).
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Probe error: {message}")]
    Probe { message: String },

    /// The transcoder exited unsuccessfully. Carries its diagnostics.
    #[error("Processing error: {message}")]
    Processing { message: String },

    #[error("Acquisition error: {message}")]
    Acquisition { message: String },

    #[error("{binary} unavailable: {message}")]
    BinaryMissing { binary: String, message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using VbrError.
pub type VbrResult<T> = Result<T, VbrError>;

impl VbrError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe {
            message: msg.into(),
        }
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing {
            message: msg.into(),
        }
    }

    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::Acquisition {
            message: msg.into(),
        }
    }

    pub fn binary_missing(binary: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::BinaryMissing {
            binary: binary.into(),
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error belongs to the configuration class (fatal to a
    /// single compile call, never retried).
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_message() {
        let err = VbrError::processing("ffmpeg exited with status 1: boom");
        assert_eq!(
            err.to_string(),
            "Processing error: ffmpeg exited with status 1: boom"
        );
    }

    #[test]
    fn test_binary_missing_names_binary() {
        let err = VbrError::binary_missing("FFprobe", "not found on PATH");
        assert_eq!(err.to_string(), "FFprobe unavailable: not found on PATH");
        assert!(!err.is_config());
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> VbrResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(VbrError::Io(_))));
    }
}
