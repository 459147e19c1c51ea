//! Per-configuration outcomes

use crate::extract::{ExtractionError, Metrics};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stderr attached to exit failures is capped to this many trailing bytes.
pub(crate) const STDERR_TAIL_BYTES: usize = 2048;

/// Result of evaluating one configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Process ran and its metrics were extracted
    Success(Metrics),
    /// Process or extraction failed; siblings are unaffected
    Failure(Failure),
    /// Never dispatched (the sweep was cancelled first)
    Skipped,
}

impl Outcome {
    /// Get the metrics of a successful run.
    #[must_use]
    pub const fn metrics(&self) -> Option<&Metrics> {
        match self {
            Self::Success(metrics) => Some(metrics),
            _ => None,
        }
    }

    /// Get the failure, if the run failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// True for [`Outcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short status label used in row exports.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Success(_) => "ok",
            Self::Failure(failure) => failure.kind().label(),
            Self::Skipped => "skipped",
        }
    }
}

/// Why one configuration failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    /// The executable could not be started
    #[error("failed to spawn process: {message}")]
    Spawn {
        /// OS error text
        message: String,
    },

    /// The process started but waiting on it failed
    #[error("lost track of running process: {message}")]
    Wait {
        /// OS error text
        message: String,
    },

    /// The process exited non-zero or was killed by a foreign signal
    #[error("process exited with {}: {stderr}", describe_code(.code))]
    Exit {
        /// Exit code, `None` if terminated by a signal
        code: Option<i32>,
        /// Tail of captured stderr
        stderr: String,
    },

    /// The process exceeded its time limit and was killed
    #[error("process timed out after {after:?} and was killed")]
    Timeout {
        /// Configured limit
        after: Duration,
    },

    /// Output did not match the expected stat-line layout
    #[error("{} (raw: {:?})", .0, .0.raw())]
    Extraction(ExtractionError),

    /// The sweep was cancelled while this process ran
    #[error("cancelled while running")]
    Cancelled,

    /// The worker task evaluating this configuration panicked
    #[error("worker panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string
        message: String,
    },
}

impl Failure {
    /// Failure category.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Spawn { .. } | Self::Wait { .. } | Self::Exit { .. } => FailureKind::Process,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Extraction(_) => FailureKind::Extraction,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Panicked { .. } => FailureKind::Panicked,
        }
    }

    /// Raw text kept for diagnosis (offending output or stderr tail).
    #[must_use]
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::Exit { stderr, .. } => Some(stderr.as_str()),
            Self::Extraction(err) => Some(err.raw()),
            _ => None,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"))
}

/// Failure categories reported in sweep summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    /// Spawn or wait failure, or non-zero exit
    Process,
    /// Killed after exceeding the timeout
    Timeout,
    /// Stat line missing or malformed
    Extraction,
    /// Killed by sweep cancellation
    Cancelled,
    /// Internal worker panic
    Panicked,
}

impl FailureKind {
    /// Lower-case label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Timeout => "timeout",
            Self::Extraction => "extraction",
            Self::Cancelled => "cancelled",
            Self::Panicked => "panicked",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let spawn = Failure::Spawn {
            message: "No such file".to_string(),
        };
        let exit = Failure::Exit {
            code: Some(2),
            stderr: "bad flag".to_string(),
        };
        let timeout = Failure::Timeout {
            after: Duration::from_secs(1),
        };
        let wait = Failure::Wait {
            message: "No child processes".to_string(),
        };
        let extraction = Failure::Extraction(ExtractionError::new("line missing", "tail"));

        assert_eq!(spawn.kind(), FailureKind::Process);
        assert_eq!(wait.kind(), FailureKind::Process);
        assert_eq!(exit.kind(), FailureKind::Process);
        assert_eq!(timeout.kind(), FailureKind::Timeout);
        assert_eq!(extraction.kind(), FailureKind::Extraction);
        assert_eq!(Failure::Cancelled.kind(), FailureKind::Cancelled);
    }

    #[test]
    fn test_failure_display() {
        let exit = Failure::Exit {
            code: Some(2),
            stderr: "bad flag".to_string(),
        };
        assert_eq!(exit.to_string(), "process exited with code 2: bad flag");

        let signalled = Failure::Exit {
            code: None,
            stderr: String::new(),
        };
        assert!(signalled.to_string().contains("a signal"));

        let spawn = Failure::Spawn {
            message: "No such file".to_string(),
        };
        let wait = Failure::Wait {
            message: "No child processes".to_string(),
        };
        assert_eq!(spawn.to_string(), "failed to spawn process: No such file");
        assert_eq!(
            wait.to_string(),
            "lost track of running process: No child processes"
        );

        let extraction = Failure::Extraction(ExtractionError::new("line missing", "tail"));
        assert_eq!(
            extraction.to_string(),
            "extraction failed: line missing (raw: \"tail\")"
        );
        assert_eq!(extraction.raw_text(), Some("tail"));
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(Outcome::Success(Metrics::new()).status(), "ok");
        assert_eq!(Outcome::Skipped.status(), "skipped");
        assert_eq!(
            Outcome::Failure(Failure::Timeout {
                after: Duration::from_millis(5)
            })
            .status(),
            "timeout"
        );
    }
}
