//! Structured reporting of collection pass events.

use std::sync::Arc;

use incident_sections::{SectionError, SectionInfo, SectionReport};

use crate::collection::PassSummary;

/// Tracing target for collection events.
const REPORTER_TARGET: &str = "incidentd::collection";

/// Observer notified as a collection pass progresses.
#[cfg_attr(test, mockall::automock)]
pub trait CollectionReporter: Send + Sync {
    /// Invoked before the first section runs.
    fn pass_starting(&self, sections: usize, requests: usize);

    /// Invoked before a section executes.
    fn section_starting(&self, section: &SectionInfo);

    /// Invoked after a section completes.
    fn section_succeeded(&self, section: &SectionInfo, report: &SectionReport);

    /// Invoked when a section reports a failure.
    fn section_failed(&self, section: &SectionInfo, error: &SectionError);

    /// Invoked when no request wants a section.
    fn section_skipped(&self, section: &SectionInfo);

    /// Invoked after the last section.
    fn pass_finished(&self, summary: &PassSummary);
}

impl<T> CollectionReporter for Arc<T>
where
    T: CollectionReporter,
{
    fn pass_starting(&self, sections: usize, requests: usize) {
        (**self).pass_starting(sections, requests);
    }

    fn section_starting(&self, section: &SectionInfo) {
        (**self).section_starting(section);
    }

    fn section_succeeded(&self, section: &SectionInfo, report: &SectionReport) {
        (**self).section_succeeded(section, report);
    }

    fn section_failed(&self, section: &SectionInfo, error: &SectionError) {
        (**self).section_failed(section, error);
    }

    fn section_skipped(&self, section: &SectionInfo) {
        (**self).section_skipped(section);
    }

    fn pass_finished(&self, summary: &PassSummary) {
        (**self).pass_finished(summary);
    }
}

/// Default reporter that records collection events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredCollectionReporter;

impl StructuredCollectionReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CollectionReporter for StructuredCollectionReporter {
    fn pass_starting(&self, sections: usize, requests: usize) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "pass_starting",
            sections,
            requests,
            "starting collection pass"
        );
    }

    fn section_starting(&self, section: &SectionInfo) {
        tracing::debug!(
            target: REPORTER_TARGET,
            event = "section_starting",
            id = section.id(),
            section = section.name(),
            timeout_ms = section.timeout_ms(),
            "executing section"
        );
    }

    fn section_succeeded(&self, section: &SectionInfo, report: &SectionReport) {
        let elapsed_ms = u64::try_from(report.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            target: REPORTER_TARGET,
            event = "section_succeeded",
            id = section.id(),
            section = section.name(),
            bytes = report.bytes(),
            elapsed_ms,
            truncated = report.truncated(),
            "section '{}' wrote {} bytes in {elapsed_ms} ms",
            section.name(),
            report.bytes()
        );
    }

    fn section_failed(&self, section: &SectionInfo, error: &SectionError) {
        tracing::warn!(
            target: REPORTER_TARGET,
            event = "section_failed",
            id = section.id(),
            section = section.name(),
            status = %error.status(),
            error = %error,
            "section failed; continuing with the next section"
        );
    }

    fn section_skipped(&self, section: &SectionInfo) {
        tracing::debug!(
            target: REPORTER_TARGET,
            event = "section_skipped",
            id = section.id(),
            section = section.name(),
            "no request wants this section"
        );
    }

    fn pass_finished(&self, summary: &PassSummary) {
        tracing::info!(
            target: REPORTER_TARGET,
            event = "pass_finished",
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            elapsed_ms = u64::try_from(summary.elapsed().as_millis()).unwrap_or(u64::MAX),
            "collection pass finished"
        );
    }
}
