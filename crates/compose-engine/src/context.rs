//! Media runtime context: binaries, temp arena, decoder capabilities.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tempfile::TempDir;
use vbr_common::config::{AppConfig, MediaConfig};
use vbr_common::error::{VbrError, VbrResult};

use crate::probe::Prober;
use crate::process::{run_with_timeout, RunError};
use crate::recipe::Capabilities;

/// Prefix of the per-context temp directory.
pub const TEMP_PREFIX: &str = "vbr_";

/// Paths to ffmpeg/ffprobe plus a scoped temporary-file arena.
///
/// Construction verifies both binaries with `-version`. The arena is
/// deleted by [`MediaContext::cleanup`] or when the context is dropped.
#[derive(Debug)]
pub struct MediaContext {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    ffmpeg_version: String,
    config: MediaConfig,
    temp: TempDir,
    scratch: Mutex<Vec<TempDir>>,
    vp9_alpha: OnceLock<bool>,
}

impl MediaContext {
    pub fn new(config: MediaConfig) -> VbrResult<Self> {
        let timeout = Duration::from_secs(config.version_check_timeout_secs);
        let ffmpeg = resolve_binary("FFmpeg", &config.ffmpeg)?;
        let ffprobe = resolve_binary("FFprobe", &config.ffprobe)?;
        let ffmpeg_version = verify_binary("FFmpeg", &ffmpeg, timeout)?;
        verify_binary("FFprobe", &ffprobe, timeout)?;

        let context = Self::assemble(ffmpeg, ffprobe, ffmpeg_version, config)?;
        tracing::debug!(
            ffmpeg = %context.ffmpeg.display(),
            ffprobe = %context.ffprobe.display(),
            temp = %context.temp.path().display(),
            "Media context ready"
        );
        Ok(context)
    }

    /// Context from the user's config file and environment overrides.
    pub fn from_default_config() -> VbrResult<Self> {
        Self::new(AppConfig::load().media)
    }

    fn assemble(
        ffmpeg: PathBuf,
        ffprobe: PathBuf,
        ffmpeg_version: String,
        config: MediaConfig,
    ) -> VbrResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);
        let temp = match &config.tmp_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        Ok(Self {
            ffmpeg,
            ffprobe,
            ffmpeg_version,
            config,
            temp,
            scratch: Mutex::new(Vec::new()),
            vp9_alpha: OnceLock::new(),
        })
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe(&self) -> &Path {
        &self.ffprobe
    }

    /// First line of `ffmpeg -version`.
    pub fn ffmpeg_version(&self) -> &str {
        &self.ffmpeg_version
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp.path()
    }

    /// Reserve a unique file path inside the arena. The file exists, empty.
    pub fn temp_path(&self, suffix: &str, prefix: &str) -> VbrResult<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(self.temp.path())?;
        file.into_temp_path()
            .keep()
            .map_err(|e| VbrError::Io(e.error))
    }

    /// Create a unique directory inside the arena, removed with it.
    pub fn scratch_dir(&self, prefix: &str) -> VbrResult<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(self.temp.path())?;
        let path = dir.path().to_path_buf();
        self.scratch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(dir);
        Ok(path)
    }

    /// Whether ffmpeg lists the `libvpx-vp9` decoder. Queried once.
    pub fn supports_vp9_alpha_decoder(&self) -> bool {
        *self.vp9_alpha.get_or_init(|| self.query_vp9_decoder())
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            vp9_alpha_decoder: self.supports_vp9_alpha_decoder(),
        }
    }

    pub fn prober(&self) -> Prober {
        Prober::from_config(&self.ffprobe, &self.config)
    }

    fn query_vp9_decoder(&self) -> bool {
        let timeout = Duration::from_secs(self.config.version_check_timeout_secs);
        match run_with_timeout(&self.ffmpeg, ["-hide_banner", "-decoders"], timeout) {
            Ok(output) if output.status.success() => {
                let supported = output.stdout.contains("libvpx-vp9");
                tracing::debug!(supported, "Checked VP9 alpha decoder");
                supported
            }
            Ok(output) => {
                tracing::warn!(status = %output.status, "Could not list ffmpeg decoders");
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "Could not list ffmpeg decoders");
                false
            }
        }
    }

    /// Delete the temp arena now.
    pub fn cleanup(self) -> VbrResult<()> {
        let scratch = self
            .scratch
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(scratch);
        let path = self.temp.path().to_path_buf();
        self.temp.close()?;
        tracing::debug!(temp = %path.display(), "Temporary files cleaned up");
        Ok(())
    }

    /// Context that skips binary verification, for unit tests.
    #[cfg(test)]
    pub(crate) fn unverified(config: MediaConfig, vp9_alpha: bool) -> VbrResult<Self> {
        let context = Self::assemble(
            config.ffmpeg.clone(),
            config.ffprobe.clone(),
            String::new(),
            config,
        )?;
        let _ = context.vp9_alpha.set(vp9_alpha);
        Ok(context)
    }
}

fn resolve_binary(name: &str, configured: &Path) -> VbrResult<PathBuf> {
    which::which(configured).map_err(|e| {
        VbrError::binary_missing(
            name,
            format!(
                "{name} not found at '{}'. Please install FFmpeg or set the path in config: {e}",
                configured.display()
            ),
        )
    })
}

/// Run `<binary> -version` and return its first output line.
fn verify_binary(name: &str, binary: &Path, timeout: Duration) -> VbrResult<String> {
    let output = run_with_timeout(binary, ["-version"], timeout).map_err(|err| match err {
        RunError::TimedOut { .. } => {
            VbrError::binary_missing(name, format!("{name} verification timed out"))
        }
        err if err.is_not_found() => {
            VbrError::binary_missing(name, format!("{name} not found. Please install FFmpeg: {err}"))
        }
        err => VbrError::binary_missing(name, format!("{name} not working: {err}")),
    })?;

    if !output.status.success() {
        return Err(VbrError::binary_missing(
            name,
            format!("{name} not working: {}", output.stderr.trim()),
        ));
    }
    Ok(output.stdout.lines().next().unwrap_or_default().to_string())
}

static DEFAULT_CONTEXT: Mutex<Option<Arc<MediaContext>>> = Mutex::new(None);

/// The process-wide context, built from the default config on first use.
pub fn default_context() -> VbrResult<Arc<MediaContext>> {
    let mut slot = DEFAULT_CONTEXT
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(ctx) = slot.as_ref() {
        return Ok(Arc::clone(ctx));
    }
    let ctx = Arc::new(MediaContext::from_default_config()?);
    *slot = Some(Arc::clone(&ctx));
    Ok(ctx)
}

/// Replace the process-wide context.
pub fn set_default_context(ctx: Arc<MediaContext>) {
    *DEFAULT_CONTEXT
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ctx);
}

/// Drop the process-wide context; the next [`default_context`] rebuilds it.
pub fn reset_default_context() {
    DEFAULT_CONTEXT
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(root: &Path) -> MediaConfig {
        MediaConfig {
            tmp_root: Some(root.to_path_buf()),
            ..MediaConfig::default()
        }
    }

    #[test]
    fn test_temp_paths_live_in_arena() {
        let root = tempfile::tempdir().unwrap();
        let ctx = MediaContext::unverified(config_in(root.path()), false).unwrap();
        let arena = ctx.temp_dir().to_path_buf();
        assert!(arena.starts_with(root.path()));
        assert!(arena
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(TEMP_PREFIX));

        let a = ctx.temp_path(".png", "downloaded_image_").unwrap();
        let b = ctx.temp_path(".png", "downloaded_image_").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with(&arena));
        assert!(a.to_string_lossy().ends_with(".png"));

        let dir = ctx.scratch_dir("pro_bundle_").unwrap();
        assert!(dir.is_dir());

        ctx.cleanup().unwrap();
        assert!(!arena.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn test_drop_removes_arena() {
        let root = tempfile::tempdir().unwrap();
        let arena = {
            let ctx = MediaContext::unverified(config_in(root.path()), true).unwrap();
            assert!(ctx.capabilities().vp9_alpha_decoder);
            ctx.temp_dir().to_path_buf()
        };
        assert!(!arena.exists());
    }

    #[test]
    fn test_missing_binary_is_reported() {
        let config = MediaConfig {
            ffmpeg: PathBuf::from("/nonexistent/vbr-ffmpeg"),
            ..MediaConfig::default()
        };
        let err = MediaContext::new(config).unwrap_err();
        assert!(matches!(err, VbrError::BinaryMissing { ref binary, .. } if binary == "FFmpeg"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_default_context_can_be_replaced() {
        let root = tempfile::tempdir().unwrap();
        let ctx = Arc::new(MediaContext::unverified(config_in(root.path()), false).unwrap());
        set_default_context(Arc::clone(&ctx));
        let current = default_context().unwrap();
        assert!(Arc::ptr_eq(&ctx, &current));
        reset_default_context();
        drop(current);
    }
}
