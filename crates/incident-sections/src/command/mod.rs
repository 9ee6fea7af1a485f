//! Section capturing the standard output of an external command.

use std::os::fd::OwnedFd;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::error::SectionError;
use crate::request::ReportRequestSet;
use crate::section::{Section, SectionInfo, SectionReport};
use crate::worker::{self, Worker, WorkerSection};

/// Tracing target for command sections.
const COMMAND_TARGET: &str = "incident_sections::command";

/// Runs a program and captures what it writes to standard output.
///
/// Standard input and standard error are attached to `/dev/null`. The child
/// leads its own process group so that a timeout can kill any helpers it
/// started along with it.
#[derive(Debug, Clone)]
pub struct CommandSection {
    info: SectionInfo,
    argv: Vec<String>,
}

impl CommandSection {
    /// Creates a section for `argv`, named after the joined arguments.
    ///
    /// An empty `argv` is accepted here and reported as a spawn failure on
    /// every execution.
    #[must_use]
    pub fn new<I, A>(id: i32, argv: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let words: Vec<String> = argv.into_iter().map(Into::into).collect();
        Self {
            info: SectionInfo::new(id, words.join(" ")),
            argv: words,
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

    /// Program and arguments.
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl WorkerSection for CommandSection {
    fn info(&self) -> &SectionInfo {
        &self.info
    }

    fn spawn_worker(&self, write_end: OwnedFd) -> Result<Worker, SectionError> {
        let name = self.info.name();
        let Some((program, args)) = self.argv.split_first() else {
            return Err(SectionError::spawn(name, "command has no program", None));
        };

        // The command (and its copy of the write end) is dropped on return,
        // leaving the child as the only writer.
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(write_end))
            .stderr(Stdio::null())
            .process_group(0);

        match command.spawn() {
            Ok(child) => {
                debug!(
                    target: COMMAND_TARGET,
                    section = name,
                    pid = child.id(),
                    "command started"
                );
                Ok(Worker::Process(child))
            }
            Err(error) => {
                warn!(
                    target: COMMAND_TARGET,
                    section = name,
                    program = program.as_str(),
                    %error,
                    "failed to start command"
                );
                Err(SectionError::spawn(name, "failed to start command", Some(error)))
            }
        }
    }
}

impl Section for CommandSection {
    fn info(&self) -> &SectionInfo {
        &self.info
    }

    fn execute(&self, requests: &mut ReportRequestSet) -> Result<SectionReport, SectionError> {
        worker::execute(self, requests)
    }
}
