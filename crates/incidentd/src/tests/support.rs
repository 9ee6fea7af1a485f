//! Shared doubles for the daemon test suites.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use incident_sections::{SectionError, SectionInfo, SectionReport, SectionStatus};

use crate::collection::PassSummary;
use crate::reporter::CollectionReporter;

/// Event captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    PassStarting { sections: usize, requests: usize },
    SectionStarting(i32),
    SectionSucceeded(i32),
    SectionFailed(i32, SectionStatus),
    SectionSkipped(i32),
    PassFinished { succeeded: usize, failed: usize },
}

/// Reporter that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, event: ReportEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl CollectionReporter for RecordingReporter {
    fn pass_starting(&self, sections: usize, requests: usize) {
        self.push(ReportEvent::PassStarting { sections, requests });
    }

    fn section_starting(&self, section: &SectionInfo) {
        self.push(ReportEvent::SectionStarting(section.id()));
    }

    fn section_succeeded(&self, section: &SectionInfo, _report: &SectionReport) {
        self.push(ReportEvent::SectionSucceeded(section.id()));
    }

    fn section_failed(&self, section: &SectionInfo, error: &SectionError) {
        self.push(ReportEvent::SectionFailed(section.id(), error.status()));
    }

    fn section_skipped(&self, section: &SectionInfo) {
        self.push(ReportEvent::SectionSkipped(section.id()));
    }

    fn pass_finished(&self, summary: &PassSummary) {
        self.push(ReportEvent::PassFinished {
            succeeded: summary.succeeded(),
            failed: summary.failed(),
        });
    }
}

/// Sink rejecting every write.
pub struct BrokenSink;

impl Write for BrokenSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Builds a configuration JSON document from section entries.
pub fn config_json(sections: &[String]) -> String {
    format!(
        r#"{{ "log_filter": "warn", "sections": [{}] }}"#,
        sections.join(", ")
    )
}

/// JSON entry for a file section.
pub fn file_entry(id: i32, path: &str) -> String {
    format!(r#"{{ "kind": "file", "id": {id}, "path": "{path}" }}"#)
}

/// JSON entry for a `/bin/sh -c` command section.
pub fn shell_entry(id: i32, script: &str) -> String {
    format!(r#"{{ "kind": "command", "id": {id}, "argv": ["/bin/sh", "-c", "{script}"] }}"#)
}
