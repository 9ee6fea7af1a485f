//! Section that copies the contents of one file.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use incident_config::{FILE_READ_TIMEOUT_MS, SYSFS_ROOT};
use nix::fcntl::OFlag;
use tracing::{debug, warn};

use crate::buffer::{CaptureBuffer, DeadlineReader, Polled, ReadOutcome};
use crate::error::SectionError;
use crate::request::ReportRequestSet;
use crate::section::{Section, SectionInfo, SectionReport};

/// Tracing target for file sections.
const FILE_TARGET: &str = "incident_sections::file";

/// Reads a named file and delivers its contents.
///
/// Paths under the pseudo-filesystem root (`/sys/` by default) report an
/// error condition on every poll while their reads still succeed; for those
/// paths only a failing read is treated as an error.
///
/// ```rust,no_run
/// use incident_sections::{FileSection, MemorySink, ReportRequest, ReportRequestSet, Section};
///
/// let section = FileSection::new(2002, "/proc/version");
/// let sink = MemorySink::new();
/// let mut requests = ReportRequestSet::new();
/// requests.add(ReportRequest::new(sink.clone()));
/// section.execute(&mut requests)?;
/// assert!(!sink.contents().is_empty());
/// # Ok::<(), incident_sections::SectionError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileSection {
    info: SectionInfo,
    path: PathBuf,
    is_sysfs: bool,
}

impl FileSection {
    /// Creates a section named after `path` with the file read timeout.
    #[must_use]
    pub fn new(id: i32, path: impl Into<PathBuf>) -> Self {
        let owned: PathBuf = path.into();
        let info = SectionInfo::new(id, owned.display().to_string())
            .with_timeout_ms(FILE_READ_TIMEOUT_MS);
        let is_sysfs = owned.starts_with(SYSFS_ROOT);
        Self {
            info,
            path: owned,
            is_sysfs,
        }
    }

    /// Replaces the execution budget.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.info = self.info.with_timeout_ms(timeout_ms);
        self
    }

    /// Replaces the cap on buffered bytes.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.info = self.info.with_max_bytes(max_bytes);
        self
    }

    /// Reclassifies the path against a different pseudo-filesystem root.
    #[must_use]
    pub fn with_sysfs_root(mut self, root: impl AsRef<Path>) -> Self {
        self.is_sysfs = self.path.starts_with(root);
        self
    }

    /// File read by this section.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether poll error conditions are tolerated for this path.
    #[must_use]
    pub const fn is_sysfs(&self) -> bool {
        self.is_sysfs
    }
}

impl Section for FileSection {
    fn info(&self) -> &SectionInfo {
        &self.info
    }

    fn execute(&self, requests: &mut ReportRequestSet) -> Result<SectionReport, SectionError> {
        let name = self.info.name();
        let deadline = Instant::now() + self.info.timeout();

        // Non-blocking open keeps FIFOs from stalling before the deadline applies.
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&self.path)
            .map_err(|error| {
                warn!(
                    target: FILE_TARGET,
                    section = name,
                    %error,
                    "failed to open file"
                );
                SectionError::io(name, error)
            })?;

        let mut reader = Polled::new(file);
        let mut buffer = CaptureBuffer::new(self.info.max_bytes());
        let outcome = DeadlineReader::new(deadline)
            .tolerate_poll_errors(self.is_sysfs)
            .read_to_end(&mut reader, &mut buffer);
        drop(reader);

        let delivery = requests.write_section(self.info.id(), buffer.bytes());
        match outcome {
            ReadOutcome::Eof => {
                debug!(
                    target: FILE_TARGET,
                    section = name,
                    bytes = buffer.len(),
                    sinks = delivery.delivered,
                    elapsed_ms = u64::try_from(buffer.elapsed().as_millis()).unwrap_or(u64::MAX),
                    truncated = buffer.truncated(),
                    "file section captured"
                );
                Ok(SectionReport::new(
                    buffer.len(),
                    buffer.elapsed(),
                    buffer.truncated(),
                ))
            }
            ReadOutcome::TimedOut => {
                warn!(
                    target: FILE_TARGET,
                    section = name,
                    bytes = buffer.len(),
                    timeout_ms = self.info.timeout_ms(),
                    "file section timed out"
                );
                Err(self.info.timeout_error(buffer.len()))
            }
            ReadOutcome::Failed(error) => {
                warn!(
                    target: FILE_TARGET,
                    section = name,
                    bytes = buffer.len(),
                    sysfs = self.is_sysfs,
                    %error,
                    "file read failed"
                );
                Err(SectionError::io(name, error))
            }
        }
    }
}
