//! Error types for external media-tool invocations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media-tool operations.
pub type Result<T> = std::result::Result<T, MediaToolError>;

/// Errors raised by the splitter/merger adapters.
///
/// These are adapter-level failures only; retry policy belongs to the caller.
#[derive(Error, Debug)]
pub enum MediaToolError {
    #[error("Input file is not readable: {0}")]
    InputNotReadable(PathBuf),

    #[error("{tool} failed with exit code {exit_code}: {stderr}")]
    ToolFailure {
        tool: &'static str,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to spawn {tool}: {source}")]
    SpawnFailure {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write segment manifest: {0}")]
    ManifestWriteFailed(String),

    #[error("Failed to read segment manifest: {0}")]
    ManifestReadFailed(String),

    #[error("Dubbed audio for segment {index} is missing: {expected}")]
    MissingDubbedSegment { index: usize, expected: PathBuf },

    #[error("Could not parse media duration from probe output: {0}")]
    DurationParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}
