//! Running compiled commands: blocking export, cancellable export, and
//! streamed output.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;

use vbr_common::error::{VbrError, VbrResult};
use vbr_media_model::Composition;

use crate::compiler::{Compiler, FfmpegCommand};
use crate::context::MediaContext;
use crate::encoder::EncoderProfile;
use crate::process::{drain, join_drain, kill_quietly};

/// A composition export ready to run.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub composition: Composition,
    pub encoder: EncoderProfile,
    pub output_path: PathBuf,
    /// Let ffmpeg write straight to the terminal.
    pub verbose: bool,
}

/// Coarse export stages reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Processing,
    Completed,
}

impl ExportStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
        }
    }
}

/// Progress callback for exports.
pub type ProgressCallback = Box<dyn Fn(ExportStage) + Send>;

#[derive(Default)]
pub struct ExportOptions {
    pub verbose: bool,
    pub progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for ExportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportOptions")
            .field("verbose", &self.verbose)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl ExportOptions {
    fn report(&self, stage: ExportStage) {
        if let Some(cb) = &self.progress {
            cb(stage);
        }
    }
}

/// Something that can execute a compiled command.
pub trait ExportBackend: Send {
    fn run(&mut self, command: &FfmpegCommand, options: ExportOptions) -> VbrResult<()>;

    /// Check if this backend can run on the system.
    fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

/// Runs commands with a local ffmpeg binary.
#[derive(Debug, Clone)]
pub struct Exporter {
    ffmpeg: PathBuf,
}

impl Exporter {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    pub fn for_context(ctx: &MediaContext) -> Self {
        Self::new(ctx.ffmpeg())
    }

    /// Start an export in the background. Stderr is captured.
    pub fn spawn(&self, command: &FfmpegCommand) -> VbrResult<RunningExport> {
        let mut child = start(command, Stdio::null(), Stdio::piped())?;
        let stderr = drain(child.stderr.take());
        Ok(RunningExport { child, stderr })
    }

    /// Start a streaming command and hand back its stdout.
    ///
    /// The command must write to `-`, as produced by
    /// [`Compiler::compile_for_stream`].
    pub fn spawn_stream(&self, command: &FfmpegCommand) -> VbrResult<OutputStream> {
        let mut child = start(command, Stdio::piped(), Stdio::piped())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VbrError::processing("Failed to capture ffmpeg stdout"))?;
        let stderr = drain(child.stderr.take());
        Ok(OutputStream {
            child: Some(child),
            stdout,
            stderr,
        })
    }
}

impl ExportBackend for Exporter {
    fn run(&mut self, command: &FfmpegCommand, options: ExportOptions) -> VbrResult<()> {
        options.report(ExportStage::Processing);
        let started = std::time::Instant::now();

        if options.verbose {
            let status = start(command, Stdio::inherit(), Stdio::inherit())?
                .wait()
                .map_err(|e| VbrError::processing(format!("Failed to wait for ffmpeg: {e}")))?;
            if !status.success() {
                return Err(VbrError::processing(format!(
                    "ffmpeg export failed (status {status})"
                )));
            }
        } else {
            self.spawn(command)?.wait()?;
        }

        tracing::info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Export finished"
        );
        options.report(ExportStage::Completed);
        Ok(())
    }

    fn is_available(&self) -> bool {
        which::which(&self.ffmpeg).is_ok()
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

fn start(command: &FfmpegCommand, stdout: Stdio, stderr: Stdio) -> VbrResult<Child> {
    tracing::debug!(command = %command, "Running ffmpeg");
    let child = Command::new(command.program())
        .args(command.args())
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .map_err(|e| VbrError::processing(format!("Failed to start ffmpeg: {e}")))?;
    tracing::info!(
        pid = child.id(),
        args_len = command.args().len(),
        "ffmpeg process started"
    );
    Ok(child)
}

fn failure(status: std::process::ExitStatus, stderr: &str) -> VbrError {
    VbrError::processing(format!(
        "ffmpeg export failed (status {status}): {}",
        stderr.trim()
    ))
}

/// An export running in the background.
#[derive(Debug)]
pub struct RunningExport {
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

impl RunningExport {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Cancel the export. The partial output is left as ffmpeg wrote it.
    pub fn kill(mut self) {
        tracing::info!(pid = self.child.id(), "Cancelling export");
        kill_quietly(&mut self.child);
        join_drain(self.stderr.take());
    }

    /// Wait for ffmpeg to exit.
    pub fn wait(mut self) -> VbrResult<()> {
        let status = self
            .child
            .wait()
            .map_err(|e| VbrError::processing(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr = join_drain(self.stderr.take());
        if !status.success() {
            return Err(failure(status, &stderr));
        }
        Ok(())
    }
}

/// Encoded bytes from a streaming command. Dropping it kills ffmpeg.
#[derive(Debug)]
pub struct OutputStream {
    child: Option<Child>,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
}

impl OutputStream {
    /// Wait for ffmpeg after the stream has been read to the end.
    pub fn finish(mut self) -> VbrResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| VbrError::processing(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr = join_drain(self.stderr.take());
        if !status.success() {
            return Err(failure(status, &stderr));
        }
        Ok(())
    }
}

impl Read for OutputStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            kill_quietly(&mut child);
            join_drain(self.stderr.take());
        }
    }
}

/// Check the backend and run one command on it.
pub fn export_with_backend(
    backend: &mut dyn ExportBackend,
    command: &FfmpegCommand,
    options: ExportOptions,
) -> VbrResult<()> {
    if !backend.is_available() {
        return Err(VbrError::unsupported(format!(
            "Export backend '{}' is not available",
            backend.name()
        )));
    }
    tracing::info!(backend = backend.name(), "Using export backend");
    backend.run(command, options)
}

/// Export a composition to a file.
///
/// This is the main entry point for rendering. Archive layers are
/// unpacked, the composition compiled, and ffmpeg run on a blocking
/// worker thread.
pub async fn export_composition(
    ctx: Arc<MediaContext>,
    job: ExportJob,
    progress: Option<ProgressCallback>,
) -> VbrResult<PathBuf> {
    let backend = Box::new(Exporter::for_context(&ctx));
    export_composition_with(ctx, job, backend, progress).await
}

/// [`export_composition`] with a caller-chosen backend.
pub async fn export_composition_with(
    ctx: Arc<MediaContext>,
    job: ExportJob,
    mut backend: Box<dyn ExportBackend>,
    progress: Option<ProgressCallback>,
) -> VbrResult<PathBuf> {
    tracing::info!(
        output = %job.output_path.display(),
        encoder = job.encoder.name(),
        layers = job.composition.layers().len(),
        "Starting export"
    );

    ensure_parent_dir(&job.output_path)?;

    tokio::task::spawn_blocking(move || -> VbrResult<PathBuf> {
        let comp = ctx.prepare(&job.composition)?;
        let command = Compiler::for_context(&ctx).compile(&comp, &job.encoder, &job.output_path)?;
        let options = ExportOptions {
            verbose: job.verbose,
            progress,
        };
        export_with_backend(backend.as_mut(), &command, options)?;
        Ok(job.output_path)
    })
    .await
    .map_err(|e| VbrError::processing(format!("Export task failed: {e}")))?
}

fn ensure_parent_dir(output: &Path) -> VbrResult<()> {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}
