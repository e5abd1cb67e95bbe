//! Typed error handling for findlock.
//!
//! Provides structured errors that library consumers can match on,
//! with full context about what went wrong and where.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::trace::Trace;

/// Main error type for findlock operations.
#[derive(Error, Debug)]
pub enum FindlockError {
    /// I/O error when reading the dump or a config file
    #[error("I/O error at {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Structurally invalid dump text
    #[error("line {line}: {reason}")]
    Parse {
        /// Line number (1-indexed) in the dump
        line: usize,
        reason: String,
    },

    /// Configuration file errors
    #[error("Config error at {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// A wait-state entry the detector could not interpret
    #[error(transparent)]
    Detection(#[from] DetectionLogicError),
}

impl FindlockError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a parse error at a dump line.
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Create a config error.
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error (partial results are still usable).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Detection(_))
    }

    /// Dump line associated with this error, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Parse { line, .. } => Some(*line),
            Self::Detection(e) => Some(e.line),
            _ => None,
        }
    }
}

/// Convenience type alias for findlock results.
pub type FindlockResult<T> = Result<T, FindlockError>;

/// A parse that stopped early.
///
/// Carries every entry built before the failure, including the one that was
/// open when the error hit, so callers can still inspect what was read.
#[derive(Error, Debug)]
#[error("parsing stopped after {} entries", .partial.len())]
pub struct PartialParse {
    pub partial: Trace,
    #[source]
    pub error: FindlockError,
}

/// Detection failure tied to one wait-state entry.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("entry #{entry_index} (dump line {line}): {reason}")]
pub struct DetectionLogicError {
    /// Position of the entry in the trace
    pub entry_index: usize,
    /// Goroutine number from the entry header
    pub goroutine: Option<u64>,
    /// Dump line of the entry header
    pub line: usize,
    pub reason: DetectionFailure,
}

/// Why a wait-state entry produced no lock token.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionFailure {
    #[error("state `{state}` looks like a lock wait but no lock-acquire frame was found")]
    NoLockFrame { state: String },

    #[error("lock-acquire frame `{function}` has no argument to use as lock token")]
    MissingToken { function: String },
}

/// Extension trait for converting std::io::Error with path context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> FindlockResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> FindlockResult<T> {
        self.map_err(|e| FindlockError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error() {
        let err = FindlockError::io(
            PathBuf::from("/tmp/dump.txt"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        assert!(matches!(err, FindlockError::Io { .. }));
        assert!(err.to_string().contains("/tmp/dump.txt"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_parse_error_display() {
        let err = FindlockError::parse(12, "didn't find the ':' separator");
        assert_eq!(err.to_string(), "line 12: didn't find the ':' separator");
        assert_eq!(err.line(), Some(12));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_detection_error_converts() {
        let detection = DetectionLogicError {
            entry_index: 3,
            goroutine: Some(17),
            line: 40,
            reason: DetectionFailure::NoLockFrame {
                state: "semacquire".into(),
            },
        };
        let err: FindlockError = detection.clone().into();
        assert_eq!(err.line(), Some(40));
        assert_eq!(err.to_string(), detection.to_string());
        assert!(err.to_string().contains("entry #3"));
    }

    #[test]
    fn test_partial_parse_keeps_source() {
        let partial = PartialParse {
            partial: Trace::default(),
            error: FindlockError::parse(2, "missing '['"),
        };
        assert_eq!(partial.to_string(), "parsing stopped after 0 entries");
        let source = std::error::Error::source(&partial).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("line 2: missing '['"));
    }

    #[test]
    fn test_io_result_ext() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        let mapped = result.with_path("<stdin>");
        assert!(matches!(mapped, Err(FindlockError::Io { .. })));
    }
}
