//! The section contract shared by every collection strategy.

use std::time::Duration;

use incident_config::{MAX_SECTION_BYTES, REMOTE_CALL_TIMEOUT_MS};

use crate::error::SectionError;
use crate::request::ReportRequestSet;

/// Identifier reserved for the report header.
pub const HEADER_SECTION_ID: i32 = 1;

/// Immutable identity shared by every section variant.
///
/// The timeout is always at least one millisecond; smaller values are raised
/// when the section is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    id: i32,
    name: String,
    timeout_ms: i64,
    max_bytes: usize,
}

impl SectionInfo {
    /// Builds section metadata with the remote call timeout and default cap.
    #[must_use]
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            timeout_ms: REMOTE_CALL_TIMEOUT_MS,
            max_bytes: MAX_SECTION_BYTES,
        }
    }

    /// Replaces the execution budget.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = timeout_ms.max(1);
        self
    }

    /// Replaces the cap on bytes buffered for one execution.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes.max(1);
        self
    }

    /// Stable section identifier.
    #[must_use]
    pub const fn id(&self) -> i32 {
        self.id
    }

    /// Human-readable label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Budget in milliseconds.
    #[must_use]
    pub const fn timeout_ms(&self) -> i64 {
        self.timeout_ms
    }

    /// Budget as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.timeout_ms).unwrap_or(1))
    }

    /// Maximum bytes buffered for one execution.
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub(crate) fn timeout_error(&self, delivered: usize) -> SectionError {
        SectionError::Timeout {
            name: self.name.clone(),
            timeout_ms: self.timeout_ms,
            delivered,
        }
    }
}

/// Summary of a successful execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionReport {
    bytes: usize,
    elapsed: Duration,
    truncated: bool,
}

impl SectionReport {
    /// Creates a report.
    #[must_use]
    pub const fn new(bytes: usize, elapsed: Duration, truncated: bool) -> Self {
        Self {
            bytes,
            elapsed,
            truncated,
        }
    }

    /// Bytes delivered to each interested sink.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        self.bytes
    }

    /// Wall-clock time spent producing the output.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether the producer wrote more than the section cap allowed.
    #[must_use]
    pub const fn truncated(&self) -> bool {
        self.truncated
    }
}

/// One discrete unit of diagnostic collection.
///
/// `execute` must return within the section's timeout as observed by the
/// caller, whatever the producer does. Sections are built once and may be
/// executed on any number of later passes; no state survives between calls.
pub trait Section: Send + Sync {
    /// Identity of the section.
    fn info(&self) -> &SectionInfo;

    /// Produces the section and writes it to every interested sink.
    ///
    /// # Errors
    ///
    /// Returns a [`SectionError`] describing why the output may be
    /// incomplete. Bytes already delivered are never retracted.
    fn execute(&self, requests: &mut ReportRequestSet) -> Result<SectionReport, SectionError>;

    /// Stable section identifier.
    fn id(&self) -> i32 {
        self.info().id()
    }

    /// Human-readable label.
    fn name(&self) -> &str {
        self.info().name()
    }

    /// Budget in milliseconds.
    fn timeout_ms(&self) -> i64 {
        self.info().timeout_ms()
    }
}
