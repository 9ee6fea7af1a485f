//! Output sinks interested in a collection pass.
//!
//! A [`ReportRequestSet`] fans each section's bytes out to every registered
//! [`ReportRequest`] that asked for that section. Each request tracks its own
//! error state: a sink that fails is marked and skipped for the rest of the
//! pass while the others keep receiving data.

use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::warn;

/// Tracing target for sink delivery.
const REQUEST_TARGET: &str = "incident_sections::request";

/// Which sections a request wants to receive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SectionFilter {
    /// Every section.
    #[default]
    All,
    /// Only the listed section identifiers.
    Only(BTreeSet<i32>),
}

impl SectionFilter {
    /// Builds a filter accepting only the given identifiers.
    #[must_use]
    pub fn only(ids: impl IntoIterator<Item = i32>) -> Self {
        Self::Only(ids.into_iter().collect())
    }

    /// Returns `true` when `id` passes the filter.
    #[must_use]
    pub fn accepts(&self, id: i32) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(&id),
        }
    }
}

/// Failure recorded against a single sink.
#[derive(Debug, Clone, Error)]
#[error("write of section {section_id} failed: {source}")]
pub struct SinkError {
    section_id: i32,
    #[source]
    source: Arc<io::Error>,
}

impl SinkError {
    /// Section whose delivery failed.
    #[must_use]
    pub const fn section_id(&self) -> i32 {
        self.section_id
    }

    /// Kind of the underlying I/O error.
    #[must_use]
    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

/// One output destination registered for a collection pass.
///
/// The request holds a handle to a stream owned by the caller; dropping the
/// request only drops the handle.
pub struct ReportRequest {
    sink: Box<dyn Write + Send>,
    filter: SectionFilter,
    headers: Vec<Vec<u8>>,
    error: Option<SinkError>,
    bytes_written: u64,
}

impl fmt::Debug for ReportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportRequest")
            .field("filter", &self.filter)
            .field("headers", &self.headers.len())
            .field("error", &self.error)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl ReportRequest {
    /// Creates a request that wants every section.
    #[must_use]
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            filter: SectionFilter::All,
            headers: Vec::new(),
            error: None,
            bytes_written: 0,
        }
    }

    /// Restricts the sections this request receives.
    #[must_use]
    pub fn with_filter(mut self, filter: SectionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Appends a client-supplied header blob emitted by the header section.
    #[must_use]
    pub fn with_header(mut self, header: impl Into<Vec<u8>>) -> Self {
        self.headers.push(header.into());
        self
    }

    /// Returns `true` when the request asked for `id` and has not failed.
    #[must_use]
    pub fn wants(&self, id: i32) -> bool {
        self.error.is_none() && self.filter.accepts(id)
    }

    /// Client-supplied header blobs.
    #[must_use]
    pub fn headers(&self) -> &[Vec<u8>] {
        &self.headers
    }

    /// The first delivery failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&SinkError> {
        self.error.as_ref()
    }

    /// Total bytes successfully written to the sink.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Writes `bytes`, followed by the client headers when `with_headers` is
    /// set, recording the first failure on the request.
    ///
    /// Returns `true` when every byte reached the sink.
    fn deliver(&mut self, section_id: i32, bytes: &[u8], with_headers: bool) -> bool {
        let mut written = bytes.len();
        let mut result = self.sink.write_all(bytes);
        if with_headers {
            for header in &self.headers {
                result = result.and_then(|()| self.sink.write_all(header));
                written += header.len();
            }
        }
        match result.and_then(|()| self.sink.flush()) {
            Ok(()) => {
                self.bytes_written = self
                    .bytes_written
                    .saturating_add(u64::try_from(written).unwrap_or(u64::MAX));
                true
            }
            Err(source) => {
                warn!(
                    target: REQUEST_TARGET,
                    section = section_id,
                    error = %source,
                    "sink write failed; skipping sink for the rest of the pass"
                );
                self.error = Some(SinkError {
                    section_id,
                    source: Arc::new(source),
                });
                false
            }
        }
    }
}

/// Outcome of fanning one section out to the request set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Sinks that received every byte.
    pub delivered: usize,
    /// Sinks whose write failed during this delivery.
    pub failed: usize,
}

/// The set of sinks interested in a collection pass.
#[derive(Debug, Default)]
pub struct ReportRequestSet {
    requests: Vec<ReportRequest>,
}

impl ReportRequestSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request and returns its index.
    pub fn add(&mut self, request: ReportRequest) -> usize {
        self.requests.push(request);
        self.requests.len() - 1
    }

    /// Looks up a request by the index returned from [`Self::add`].
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ReportRequest> {
        self.requests.get(index)
    }

    /// Iterates over the registered requests.
    pub fn iter(&self) -> impl Iterator<Item = &ReportRequest> {
        self.requests.iter()
    }

    /// Number of registered requests.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns `true` when no requests are registered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Returns `true` when at least one healthy request wants `id`.
    #[must_use]
    pub fn wants(&self, id: i32) -> bool {
        self.requests.iter().any(|request| request.wants(id))
    }

    /// Writes the same bytes to every interested, healthy sink.
    pub fn write_section(&mut self, id: i32, bytes: &[u8]) -> Delivery {
        self.fan_out(id, bytes, false)
    }

    /// Writes `record` followed by each request's own header blobs.
    pub fn write_header_section(&mut self, id: i32, record: &[u8]) -> Delivery {
        self.fan_out(id, record, true)
    }

    fn fan_out(&mut self, id: i32, bytes: &[u8], with_headers: bool) -> Delivery {
        let mut delivery = Delivery::default();
        for request in self.requests.iter_mut().filter(|request| request.wants(id)) {
            if request.deliver(id, bytes, with_headers) {
                delivery.delivered += 1;
            } else {
                delivery.failed += 1;
            }
        }
        delivery
    }
}

/// Cloneable in-memory sink.
///
/// Every clone appends to the same buffer, so a caller can keep one handle
/// and register another with a [`ReportRequest`].
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out everything written so far.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
