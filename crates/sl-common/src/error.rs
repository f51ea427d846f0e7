//! Error types for Seisloc.
//!
//! Empty engine output is never an error: a chunk or window that legitimately
//! produces zero picks, events, or relocations flows through the pipeline as
//! a zero-row table.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Seisloc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Seisloc.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19), fatal at startup
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    // Artifact errors (20-29), recovered per window
    #[error("missing input artifact for window {window}: {path}")]
    MissingArtifact { window: String, path: PathBuf },

    #[error("malformed artifact {path}: {detail}")]
    MalformedArtifact { path: PathBuf, detail: String },

    // External solver errors (30-39), recovered per chunk
    #[error("missing command `{command}` on PATH")]
    SolverMissing { command: String },

    #[error("command failed: `{command}` (status: {status}){stderr_suffix}")]
    SolverFailed {
        command: String,
        status: i32,
        stderr_suffix: String,
    },

    #[error("command timed out after {seconds}s: `{command}`")]
    SolverTimeout { command: String, seconds: u64 },

    #[error("all {chunks} chunks failed for window {window}, stage {stage}")]
    AllChunksFailed {
        window: String,
        stage: String,
        chunks: usize,
    },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the stable numeric code for this error class.
    /// Used for machine-readable error reporting and exit-code mapping.
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidTimeRange(_) => 11,
            Error::MissingArtifact { .. } => 20,
            Error::MalformedArtifact { .. } => 21,
            Error::SolverMissing { .. } => 30,
            Error::SolverFailed { .. } => 31,
            Error::SolverTimeout { .. } => 32,
            Error::AllChunksFailed { .. } => 33,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// True for errors that abort the run before any window is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::InvalidTimeRange(_))
    }

    /// True for errors recovered by skipping the owning window.
    ///
    /// A malformed artifact is recovered the same way as a missing one, but
    /// keeps a distinct variant so operators can tell corruption from
    /// absence in the logs.
    pub fn skips_window(&self) -> bool {
        matches!(
            self,
            Error::MissingArtifact { .. } | Error::MalformedArtifact { .. }
        )
    }

    pub fn solver_failure(command: impl Into<String>, status: i32, stderr: &str) -> Self {
        let trimmed = stderr.trim();
        let stderr_suffix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("; stderr: {trimmed}")
        };
        Error::SolverFailed {
            command: command.into(),
            status,
            stderr_suffix,
        }
    }
}
