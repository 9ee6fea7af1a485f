//! Section execution for the incident collection daemon.
//!
//! A [`Section`] is one unit of diagnostic collection: a file's contents,
//! a command's standard output, a service's dump, or the report header.
//! Executing a section writes its bytes to every interested sink in a
//! [`ReportRequestSet`] and returns within the section's timeout whatever
//! the producer does.
//!
//! Sections that read directly ([`FileSection`], [`HeaderSection`]) bound
//! their own waits. Sections whose work may block indefinitely
//! ([`CommandSection`], [`DumpsysSection`]) implement [`WorkerSection`] and
//! run through [`worker::execute`], which relays output over a pipe read
//! under a single deadline. Thread workers that miss the deadline are
//! detached; command processes are killed and reaped.
//!
//! Failures never abort a collection pass. Each one is reported as a
//! [`SectionError`], and any bytes captured before it are still delivered.

mod buffer;
mod command;
mod dumpsys;
mod error;
mod file;
mod header;
mod request;
mod section;
pub mod worker;

pub use command::CommandSection;
pub use dumpsys::{Dumpable, DumpsysSection, ServiceDirectory, ServiceManager};
pub use error::{SectionError, SectionStatus};
pub use file::FileSection;
pub use header::HeaderSection;
pub use request::{
    Delivery, MemorySink, ReportRequest, ReportRequestSet, SectionFilter, SinkError,
};
pub use section::{HEADER_SECTION_ID, Section, SectionInfo, SectionReport};
pub use worker::{Worker, WorkerSection};

#[cfg(test)]
mod tests;
