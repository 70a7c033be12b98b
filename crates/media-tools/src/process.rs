//! Subprocess runner for external media tools.
//!
//! Spawns ffmpeg/ffprobe with piped output, keeps a bounded tail of stderr
//! for error reporting, and kills the child when the cancellation token
//! fires. Stdout lines can be forwarded to a callback so callers can parse
//! `-progress pipe:1` key/value output.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{MediaToolError, Result};

/// Number of trailing stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 40;

/// Outcome of a finished tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    /// Exit code (`-1` when the OS reported none).
    pub exit_code: i32,
    /// Whether the process exited successfully.
    pub success: bool,
    /// Last lines of stderr, newline-joined.
    pub stderr_tail: String,
    /// Wall-clock duration in seconds.
    pub duration_secs: f64,
}

/// Callback invoked for every stdout line the tool produces.
pub type StdoutLineFn<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Run an external tool to completion.
///
/// Both output streams are drained concurrently with the process so the
/// pipes never fill up; only the last [`STDERR_TAIL_LINES`] lines of stderr
/// are retained. If `cancel` fires the child is killed and
/// [`MediaToolError::Cancelled`] is returned.
pub async fn run_tool(
    tool: &'static str,
    command: &mut Command,
    mut on_stdout_line: Option<StdoutLineFn<'_>>,
    cancel: &CancellationToken,
) -> Result<ToolOutput> {
    let start = Instant::now();

    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|source| MediaToolError::SpawnFailure { tool, source })?;

    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(tool, "stderr: {}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
        tail
    });

    let stdout = child.stdout.take();
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    let stdout_task = tokio::spawn(async move {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        }
    });

    let mut stdout_open = true;
    let status = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(tool, "Cancellation requested, killing process");
                let _ = child.kill().await;
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                return Err(MediaToolError::Cancelled);
            }
            line = line_rx.recv(), if stdout_open => {
                match line {
                    Some(line) => {
                        if let Some(cb) = on_stdout_line.as_deref_mut() {
                            cb(&line);
                        }
                    }
                    None => stdout_open = false,
                }
            }
            status = child.wait() => {
                break status?;
            }
        }
    };

    // The process exited; flush whatever the reader tasks still hold.
    let _ = stdout_task.await;
    while let Ok(line) = line_rx.try_recv() {
        if let Some(cb) = on_stdout_line.as_deref_mut() {
            cb(&line);
        }
    }
    let tail = stderr_task.await.unwrap_or_default();

    let exit_code = status.code().unwrap_or(-1);
    if !status.success() {
        warn!(tool, exit_code, "Process exited with failure");
    }

    Ok(ToolOutput {
        exit_code,
        success: status.success(),
        stderr_tail: tail.into_iter().collect::<Vec<_>>().join("\n"),
        duration_secs: start.elapsed().as_secs_f64(),
    })
}

/// Convert a non-zero tool exit into a [`MediaToolError::ToolFailure`].
pub fn ensure_success(tool: &'static str, output: &ToolOutput) -> Result<()> {
    if output.success {
        return Ok(());
    }
    Err(MediaToolError::ToolFailure {
        tool,
        exit_code: output.exit_code,
        stderr: output.stderr_tail.clone(),
    })
}

/// Parse one `key=value` line of ffmpeg `-progress pipe:1` output.
///
/// Returns the media time in milliseconds when the line carries
/// `out_time_ms` (which ffmpeg reports in microseconds) or `out_time_us`.
pub fn parse_progress_out_time_ms(line: &str) -> Option<u64> {
    let (key, value) = line.split_once('=')?;
    match key.trim() {
        "out_time_ms" | "out_time_us" => value.trim().parse::<u64>().ok().map(|us| us / 1000),
        _ => None,
    }
}
