//! Sequential collection pass over an ordered section list.

use std::sync::Arc;
use std::time::{Duration, Instant};

use incident_sections::{
    ReportRequestSet, Section, SectionError, SectionReport, SectionStatus,
};

use crate::reporter::CollectionReporter;

/// What happened to one section during a pass.
#[derive(Debug, Clone)]
pub enum SectionOutcome {
    /// The section ran and delivered its output.
    Succeeded(SectionReport),
    /// The section ran and reported a failure; output may be incomplete.
    Failed(SectionError),
    /// No request wanted the section, so it did not run.
    Skipped,
}

/// Outcome of one section, keyed by its identity.
#[derive(Debug, Clone)]
pub struct SectionRecord {
    id: i32,
    name: String,
    outcome: SectionOutcome,
}

impl SectionRecord {
    /// Section identifier.
    #[must_use]
    pub const fn id(&self) -> i32 {
        self.id
    }

    /// Section name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What happened.
    #[must_use]
    pub const fn outcome(&self) -> &SectionOutcome {
        &self.outcome
    }

    /// Status of the section, or `None` when it was skipped.
    #[must_use]
    pub const fn status(&self) -> Option<SectionStatus> {
        match &self.outcome {
            SectionOutcome::Succeeded(_) => Some(SectionStatus::Success),
            SectionOutcome::Failed(error) => Some(error.status()),
            SectionOutcome::Skipped => None,
        }
    }
}

/// Per-section outcomes of a pass, in execution order.
#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    records: Vec<SectionRecord>,
    elapsed: Duration,
}

impl PassSummary {
    /// Records in execution order.
    #[must_use]
    pub fn records(&self) -> &[SectionRecord] {
        &self.records
    }

    /// Status of the section with `id`, if it ran.
    #[must_use]
    pub fn status_of(&self, id: i32) -> Option<SectionStatus> {
        self.records
            .iter()
            .find(|record| record.id == id)
            .and_then(SectionRecord::status)
    }

    /// Number of sections that succeeded.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(|outcome| matches!(outcome, SectionOutcome::Succeeded(_)))
    }

    /// Number of sections that reported a failure.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, SectionOutcome::Failed(_)))
    }

    /// Number of sections nobody asked for.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, SectionOutcome::Skipped))
    }

    /// Wall-clock duration of the pass.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    fn count(&self, predicate: impl Fn(&SectionOutcome) -> bool) -> usize {
        self.records
            .iter()
            .filter(|record| predicate(&record.outcome))
            .count()
    }
}

/// An ordered list of sections executed one at a time.
///
/// A failing section never stops the pass: the failure is reported and the
/// next section runs.
pub struct Collection {
    sections: Vec<Box<dyn Section>>,
    reporter: Arc<dyn CollectionReporter>,
}

impl Collection {
    /// Creates a collection over `sections`, in execution order.
    #[must_use]
    pub fn new(sections: Vec<Box<dyn Section>>, reporter: Arc<dyn CollectionReporter>) -> Self {
        Self { sections, reporter }
    }

    /// Number of sections in the collection.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.sections.len()
    }

    /// Returns `true` when the collection holds no sections.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Identifiers in execution order.
    pub fn ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.sections.iter().map(|section| section.id())
    }

    /// Runs every section against `requests` and summarises the outcomes.
    pub fn run(&self, requests: &mut ReportRequestSet) -> PassSummary {
        let started = Instant::now();
        self.reporter.pass_starting(self.sections.len(), requests.len());

        let records = self
            .sections
            .iter()
            .map(|section| self.run_section(section.as_ref(), requests))
            .collect();

        let summary = PassSummary {
            records,
            elapsed: started.elapsed(),
        };
        self.reporter.pass_finished(&summary);
        summary
    }

    fn run_section(&self, section: &dyn Section, requests: &mut ReportRequestSet) -> SectionRecord {
        let info = section.info();
        let outcome = if requests.wants(info.id()) {
            self.reporter.section_starting(info);
            match section.execute(requests) {
                Ok(report) => {
                    self.reporter.section_succeeded(info, &report);
                    SectionOutcome::Succeeded(report)
                }
                Err(error) => {
                    self.reporter.section_failed(info, &error);
                    SectionOutcome::Failed(error)
                }
            }
        } else {
            self.reporter.section_skipped(info);
            SectionOutcome::Skipped
        };
        SectionRecord {
            id: info.id(),
            name: info.name().to_owned(),
            outcome,
        }
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("sections", &self.ids().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
