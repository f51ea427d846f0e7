//! Exit codes for the seisloc CLI.
//!
//! Exit codes communicate run outcome without requiring log parsing and are
//! stable across releases.

use sl_common::Error;

/// Exit codes for seisloc operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// All requested windows completed (possibly with skips).
    Clean = 0,

    /// Run finished but one or more windows failed.
    PartialFail = 3,

    /// Configuration error, nothing was processed.
    ConfigError = 10,

    /// I/O error outside per-window recovery.
    IoError = 13,

    /// Internal/unknown error.
    InternalError = 99,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean)
    }

    /// Map a top-level error to its exit code.
    pub fn from_error(err: &Error) -> Self {
        match err.code() {
            10 | 11 => ExitCode::ConfigError,
            60 => ExitCode::IoError,
            _ => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}
