//! The report header section.

use std::io;
use std::time::Instant;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use crate::error::SectionError;
use crate::request::ReportRequestSet;
use crate::section::{HEADER_SECTION_ID, Section, SectionInfo, SectionReport};

/// Tracing target for the header section.
const HEADER_TARGET: &str = "incident_sections::header";

/// Daemon name used by [`HeaderSection::default`].
const DEFAULT_DAEMON: &str = "incidentd";

/// One-line identification record written ahead of client headers.
#[derive(Debug, Serialize)]
struct HeaderRecord<'a> {
    daemon: &'a str,
    version: &'a str,
    pid: u32,
    collected_at: String,
}

/// Writes a daemon identification record, then each request's own headers.
///
/// The record is a single JSON object terminated by a newline. No blocking
/// I/O happens beyond the sink writes themselves.
#[derive(Debug, Clone)]
pub struct HeaderSection {
    info: SectionInfo,
    daemon: String,
    version: String,
}

impl Default for HeaderSection {
    fn default() -> Self {
        Self::new(DEFAULT_DAEMON, env!("CARGO_PKG_VERSION"))
    }
}

impl HeaderSection {
    /// Creates the header section for `daemon` at `version`.
    #[must_use]
    pub fn new(daemon: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: SectionInfo::new(HEADER_SECTION_ID, "header"),
            daemon: daemon.into(),
            version: version.into(),
        }
    }

    fn record(&self) -> io::Result<Vec<u8>> {
        let collected_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(io::Error::other)?;
        let record = HeaderRecord {
            daemon: &self.daemon,
            version: &self.version,
            pid: std::process::id(),
            collected_at,
        };
        let mut line = serde_json::to_vec(&record).map_err(io::Error::other)?;
        line.push(b'\n');
        Ok(line)
    }
}

impl Section for HeaderSection {
    fn info(&self) -> &SectionInfo {
        &self.info
    }

    fn execute(&self, requests: &mut ReportRequestSet) -> Result<SectionReport, SectionError> {
        let started = Instant::now();
        let line = self
            .record()
            .map_err(|error| SectionError::io(self.info.name(), error))?;
        let delivery = requests.write_header_section(self.info.id(), &line);
        debug!(
            target: HEADER_TARGET,
            bytes = line.len(),
            sinks = delivery.delivered,
            failed = delivery.failed,
            "header written"
        );
        Ok(SectionReport::new(line.len(), started.elapsed(), false))
    }
}
