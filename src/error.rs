use std::io;
use std::path::PathBuf;

use thiserror::Error as ThisError;

/// Errors that can occur when building or reconfiguring logging components
#[derive(ThisError, Debug)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// A failure raised on the logging path, delivered to an [`ErrorHandler`].
///
/// `write_record` callers never see these: logging is best-effort and must
/// not halt the caller's request processing. Every failure is forwarded to
/// the handler supplied at writer construction instead.
#[derive(ThisError, Debug)]
pub enum WriterFailure {
    /// A log file could not be opened.
    #[error("cannot open log file {}: {}", .path.display(), .source)]
    Open {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// A record could not be written to the sink.
    #[error("cannot write log record: {}", .source)]
    Write {
        /// The record that was lost.
        record: String,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The sink could not be flushed.
    #[error("cannot flush log output: {}", .source)]
    Flush {
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The sink could not be closed cleanly.
    #[error("cannot close log output: {}", .source)]
    Close {
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The live file could not be renamed to its rotated name.
    #[error("cannot rename {} to {}: {}", .from.display(), .to.display(), .source)]
    Rename {
        /// The live file path.
        from: PathBuf,
        /// The rotated name it should have received.
        to: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// A rotated file selected by retention could not be deleted.
    #[error("cannot delete rotated file {}: {}", .path.display(), .source)]
    Delete {
        /// The file that survived deletion.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// A retention policy failed to evaluate (other policies still run).
    #[error("retention policy {policy} failed: {}", .source)]
    Retention {
        /// Name of the failing policy.
        policy: String,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// A record was submitted after shutdown and dropped.
    #[error("record rejected after shutdown")]
    Rejected {
        /// The rejected record.
        record: String,
    },
}

/// Sink for failures raised on the logging path.
///
/// The writer never logs its own failures — that would recurse through the
/// logging subsystem — and forwards each one here exactly once. Handlers must
/// be cheap: they run on the write path or the background checker.
pub trait ErrorHandler: Send + Sync {
    /// Called once per failure.
    fn handle(&self, failure: WriterFailure);
}

/// An [`ErrorHandler`] that forwards failures to `tracing` at error level.
///
/// The standard downstream reporting path for operators. Do not route the
/// `tracing` output of this handler back into the writer it serves.
#[derive(Debug, Default)]
pub struct TracingErrorHandler;

impl ErrorHandler for TracingErrorHandler {
    fn handle(&self, failure: WriterFailure) {
        tracing::error!(target: "rotolog", "{failure}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display() {
        let failure = WriterFailure::Open {
            path: PathBuf::from("/var/log/access.log"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = failure.to_string();
        assert!(msg.contains("/var/log/access.log"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_rejected_display() {
        let failure = WriterFailure::Rejected {
            record: "dropped line".to_string(),
        };
        assert_eq!(failure.to_string(), "record rejected after shutdown");
    }

    #[test]
    fn test_error_from_io() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("missing"));
    }
}
