//! Bounded subprocess execution for the short helper calls
//! (`-version`, `-decoders`, ffprobe).

use std::ffi::OsStr;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of a finished helper process.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("failed waiting on {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },
}

impl RunError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Run `program args...`, capturing both pipes, killing it after `timeout`.
pub fn run_with_timeout<I, S>(
    program: &Path,
    args: I,
    timeout: Duration,
) -> Result<CommandOutput, RunError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.display().to_string();
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| RunError::Spawn {
            program: name.clone(),
            source,
        })?;

    // Drain both pipes so the child never blocks on a full buffer.
    let stdout_task = drain(child.stdout.take());
    let stderr_task = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                kill_quietly(&mut child);
                return Err(RunError::TimedOut {
                    program: name,
                    timeout,
                });
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(source) => {
                kill_quietly(&mut child);
                return Err(RunError::Wait {
                    program: name,
                    source,
                });
            }
        }
    };

    Ok(CommandOutput {
        status,
        stdout: join_drain(stdout_task),
        stderr: join_drain(stderr_task),
    })
}

/// Read a pipe to the end on a background thread.
pub(crate) fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|pipe| {
        std::thread::spawn(move || {
            let mut reader = BufReader::new(pipe);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read output: {err}>"),
            }
        })
    })
}

pub(crate) fn join_drain(task: Option<JoinHandle<String>>) -> String {
    task.map(|t| {
        t.join()
            .unwrap_or_else(|_| "<failed to join output reader>".to_string())
    })
    .unwrap_or_default()
}

pub(crate) fn kill_quietly(child: &mut Child) {
    if let Err(err) = child.kill() {
        tracing::debug!(error = %err, "kill on already-exited child");
    }
    child.wait().ok();
}
