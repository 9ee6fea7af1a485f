//! Failure taxonomy for section execution.
//!
//! Every failure is local to one [`Section::execute`](crate::Section::execute)
//! call. Bytes delivered to sinks before the failure stay delivered, so a
//! non-success status means "output may be incomplete", never "output is
//! absent". I/O errors are wrapped in `Arc` to keep the enum small and
//! cloneable.

use std::io;
use std::sync::Arc;

use strum::Display;
use thiserror::Error;

use crate::section::SectionReport;

/// Coarse outcome of a section execution, as reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SectionStatus {
    /// The section completed and its output was delivered.
    Success,
    /// The deadline elapsed first; partial output may have been delivered.
    Timeout,
    /// Reading the source or the relay pipe failed.
    IoFailure,
    /// The pipe, thread, or process could not be created.
    SpawnFailure,
    /// The producer reported an error distinct from a timeout.
    RemoteFailure,
}

impl SectionStatus {
    /// Classifies the result of an execution.
    #[must_use]
    pub fn of(result: &Result<SectionReport, SectionError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(error) => error.status(),
        }
    }
}

/// Errors raised while executing a section.
#[derive(Debug, Clone, Error)]
pub enum SectionError {
    /// The deadline elapsed before the producer finished.
    #[error("section '{name}' timed out after {timeout_ms}ms ({delivered} bytes delivered)")]
    Timeout {
        /// Section name.
        name: String,
        /// Budget that elapsed.
        timeout_ms: i64,
        /// Bytes captured and flushed before giving up.
        delivered: usize,
    },

    /// A read from the source or relay pipe failed.
    #[error("I/O failure in section '{name}': {source}")]
    Io {
        /// Section name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The relay pipe or the worker could not be created.
    #[error("section '{name}' failed to start: {message}")]
    Spawn {
        /// Section name.
        name: String,
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<io::Error>>,
    },

    /// The remote producer reported a failure.
    #[error("section '{name}' remote call failed: {message}")]
    Remote {
        /// Section name.
        name: String,
        /// Description reported by the producer.
        message: String,
    },

    /// The command exited with a non-zero status code.
    #[error("section '{name}' command exited with non-zero status {status}")]
    NonZeroExit {
        /// Section name.
        name: String,
        /// Process exit status.
        status: i32,
    },

    /// The command was terminated by a signal it did not receive from us.
    #[error("section '{name}' command was terminated by signal {signal}")]
    Signalled {
        /// Section name.
        name: String,
        /// Terminating signal number.
        signal: i32,
    },
}

impl SectionError {
    /// Maps the error onto the status taxonomy.
    #[must_use]
    pub const fn status(&self) -> SectionStatus {
        match self {
            Self::Timeout { .. } => SectionStatus::Timeout,
            Self::Io { .. } => SectionStatus::IoFailure,
            Self::Spawn { .. } => SectionStatus::SpawnFailure,
            Self::Remote { .. } | Self::NonZeroExit { .. } | Self::Signalled { .. } => {
                SectionStatus::RemoteFailure
            }
        }
    }

    /// Name of the section that failed.
    #[must_use]
    pub fn section_name(&self) -> &str {
        match self {
            Self::Timeout { name, .. }
            | Self::Io { name, .. }
            | Self::Spawn { name, .. }
            | Self::Remote { name, .. }
            | Self::NonZeroExit { name, .. }
            | Self::Signalled { name, .. } => name,
        }
    }

    pub(crate) fn io(name: &str, source: io::Error) -> Self {
        Self::Io {
            name: name.to_owned(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn spawn(name: &str, message: &str, source: Option<io::Error>) -> Self {
        Self::Spawn {
            name: name.to_owned(),
            message: message.to_owned(),
            source: source.map(Arc::new),
        }
    }

    pub(crate) fn remote(name: &str, message: impl Into<String>) -> Self {
        Self::Remote {
            name: name.to_owned(),
            message: message.into(),
        }
    }
}
