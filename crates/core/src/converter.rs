//! External document converter invocation.
//!
//! The converter is an opaque subprocess. [`LibreOfficeConverter`] runs it
//! with a fixed argument convention, captures its output, and always
//! normalises the result to a [`ConversionOutcome`]; spawn errors and
//! timeouts become failures with a diagnostic rather than escaping.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Conversion target passed to `--convert-to`.
pub const TARGET_FORMAT: &str = "html:HTML:EmbedImages";

/// Substrings in converter output that indicate failure even on exit code 0.
pub const ERROR_MARKERS: &[&str] = &["Error:", "failed:"];

/// Marker the single-line diagnostic is extracted from.
pub const DIAGNOSTIC_MARKER: &str = "Error:";

/// Diagnostic used when the output carries no extractable message.
pub const GENERIC_FAILURE: &str = "Conversion failed";

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Classified result of one converter run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Success {
        /// Combined stdout and stderr.
        output: String,
    },
    Failure {
        /// Single-line human-readable reason.
        diagnostic: String,
        /// Combined stdout and stderr (empty if the process never ran).
        output: String,
    },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success { .. })
    }
}

/// Converts a source document into HTML inside `output_dir`.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, input: &Path, output_dir: &Path) -> ConversionOutcome;
}

/// Runs LibreOffice (or a compatible binary) headless.
#[derive(Debug, Clone)]
pub struct LibreOfficeConverter {
    program: PathBuf,
    timeout: Duration,
}

impl LibreOfficeConverter {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Arguments for converting `input` into `output_dir`.
    pub fn arguments(input: &Path, output_dir: &Path) -> Vec<OsString> {
        vec![
            "--convert-to".into(),
            TARGET_FORMAT.into(),
            "--headless".into(),
            "--outdir".into(),
            output_dir.as_os_str().to_owned(),
            input.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl DocumentConverter for LibreOfficeConverter {
    async fn convert(&self, input: &Path, output_dir: &Path) -> ConversionOutcome {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::arguments(input, output_dir));

        match run_captured(&mut cmd, self.timeout).await {
            Ok(captured) => classify(captured.success, &captured.combined()),
            Err(RunError::Spawn(e)) => ConversionOutcome::Failure {
                diagnostic: format!("Failed to start converter: {e}"),
                output: String::new(),
            },
            Err(RunError::Wait(e)) => ConversionOutcome::Failure {
                diagnostic: format!("Converter process error: {e}"),
                output: String::new(),
            },
            Err(RunError::Timeout { elapsed_ms }) => ConversionOutcome::Failure {
                diagnostic: format!("Conversion timed out after {}s", elapsed_ms / 1000),
                output: String::new(),
            },
        }
    }
}

/// Classify a finished run: failure on a non-zero exit OR any error marker
/// in the output, since the converter sometimes reports errors while still
/// exiting successfully.
pub fn classify(exit_success: bool, output: &str) -> ConversionOutcome {
    let has_marker = ERROR_MARKERS.iter().any(|m| output.contains(m));
    if exit_success && !has_marker {
        return ConversionOutcome::Success {
            output: output.to_string(),
        };
    }
    ConversionOutcome::Failure {
        diagnostic: extract_diagnostic(output),
        output: output.to_string(),
    }
}

/// Text from the first `Error:` marker up to the next line break, or
/// [`GENERIC_FAILURE`] when there is none.
pub fn extract_diagnostic(output: &str) -> String {
    let Some(start) = output.find(DIAGNOSTIC_MARKER) else {
        return GENERIC_FAILURE.to_string();
    };
    let rest = &output[start..];
    let line = rest.split('\n').next().unwrap_or(rest).trim_end_matches('\r');
    line.to_string()
}

// ---------------------------------------------------------------------------
// Subprocess plumbing
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Captured {
    success: bool,
    stdout: String,
    stderr: String,
}

impl Captured {
    /// stdout then stderr, always separated by a line break so a diagnostic
    /// at the end of stdout never runs into stderr.
    fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        out.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') && !self.stderr.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.stderr);
        out
    }
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("spawn failed: {0}")]
    Spawn(std::io::Error),
    #[error("wait failed: {0}")]
    Wait(std::io::Error),
    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Spawn `cmd`, capture stdout/stderr, and enforce `timeout`.
///
/// `kill_on_drop(true)` ensures the child is killed when dropped on timeout.
/// The deadline also covers draining the pipes, which a surviving grandchild
/// may hold open after the child exits.
async fn run_captured(cmd: &mut Command, timeout: Duration) -> Result<Captured, RunError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(RunError::Spawn)?;

    // Read both pipes in spawned tasks so `child.wait()` can borrow the child.
    let mut stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let mut stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let timed_out = |stdout_task: &JoinHandle<Vec<u8>>, stderr_task: &JoinHandle<Vec<u8>>| {
        stdout_task.abort();
        stderr_task.abort();
        RunError::Timeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    };

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            stdout_task.abort();
            stderr_task.abort();
            return Err(RunError::Wait(e));
        }
        Err(_elapsed) => return Err(timed_out(&stdout_task, &stderr_task)),
    };

    let remaining = timeout.saturating_sub(start.elapsed());
    let drained = tokio::time::timeout(remaining, async {
        let stdout = (&mut stdout_task).await.unwrap_or_default();
        let stderr = (&mut stderr_task).await.unwrap_or_default();
        (stdout, stderr)
    })
    .await;

    match drained {
        Ok((stdout, stderr)) => Ok(Captured {
            success: status.success(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        }),
        Err(_elapsed) => Err(timed_out(&stdout_task, &stderr_task)),
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES as u64).read_to_end(&mut buf).await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
