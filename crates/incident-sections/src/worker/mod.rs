//! Deadline protocol for sections whose work may block indefinitely.
//!
//! A [`WorkerSection`] hands the write end of a fresh pipe to a worker
//! (a thread or a child process) and the caller reads the other end under a
//! single deadline. The worker owns everything it touches, so abandoning it
//! at the deadline leaves nothing shared in an inconsistent state.
//!
//! Thread workers cannot be cancelled; when the deadline passes they are
//! detached and their later writes fail against the closed pipe. Process
//! workers run in their own process group, which is killed and reaped.

use std::fs::File;
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::process::Child;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::{Pid, pipe2};
use tracing::{debug, warn};

use crate::buffer::{CaptureBuffer, DeadlineReader, Polled, ReadOutcome};
use crate::error::SectionError;
use crate::request::ReportRequestSet;
use crate::section::{SectionInfo, SectionReport};

/// Tracing target for worker orchestration.
const WORKER_TARGET: &str = "incident_sections::worker";

/// Interval between exit-status probes of a child process.
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A section whose output is produced by a worker writing into a pipe.
///
/// Implementors supply only [`WorkerSection::spawn_worker`]; the deadline
/// handling lives in [`execute`], which every implementor's
/// [`Section::execute`](crate::Section::execute) delegates to.
pub trait WorkerSection: Send + Sync {
    /// Identity of the section.
    fn info(&self) -> &SectionInfo;

    /// Starts the blocking work, writing output into `write_end`.
    ///
    /// The worker must own `write_end` and close it when finished; the
    /// caller treats the close as end of output.
    ///
    /// # Errors
    ///
    /// Returns [`SectionError::Spawn`] when the worker cannot be started.
    fn spawn_worker(&self, write_end: OwnedFd) -> Result<Worker, SectionError>;
}

/// Handle to the worker started for one execution.
#[derive(Debug)]
pub enum Worker {
    /// An in-process thread reporting its outcome over a channel.
    Thread {
        /// Join handle, dropped to detach.
        handle: JoinHandle<()>,
        /// Receives the worker's result exactly once.
        result: Receiver<Result<(), SectionError>>,
    },
    /// A child process leading its own process group.
    Process(Child),
}

/// Result of waiting for a worker after its output closed.
enum Completion {
    Finished(Result<(), SectionError>),
    Expired,
}

impl Worker {
    /// Runs `body` on a named thread with exclusive ownership of the pipe.
    ///
    /// The pipe is closed when `body` returns or unwinds. A panic inside
    /// `body` surfaces as a remote failure.
    ///
    /// # Errors
    ///
    /// Returns [`SectionError::Spawn`] when the thread cannot be created.
    pub fn spawn_thread<F>(
        info: &SectionInfo,
        write_end: OwnedFd,
        body: F,
    ) -> Result<Self, SectionError>
    where
        F: FnOnce(&mut File) -> Result<(), SectionError> + Send + 'static,
    {
        let (sender, result) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("section-{}", info.id()))
            .spawn(move || {
                let mut output = File::from(write_end);
                let outcome = body(&mut output);
                drop(output);
                // The caller stops listening at the deadline.
                if sender.send(outcome).is_err() {
                    debug!(target: WORKER_TARGET, "worker finished after its caller gave up");
                }
            })
            .map_err(|error| {
                SectionError::spawn(info.name(), "failed to start worker thread", Some(error))
            })?;
        Ok(Self::Thread { handle, result })
    }

    fn finish(&mut self, name: &str, deadline: Instant) -> Completion {
        match self {
            Self::Thread { result, .. } => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match result.recv_timeout(remaining) {
                    Ok(outcome) => Completion::Finished(outcome),
                    Err(RecvTimeoutError::Timeout) => Completion::Expired,
                    Err(RecvTimeoutError::Disconnected) => Completion::Finished(Err(
                        SectionError::remote(name, "worker exited without reporting a result"),
                    )),
                }
            }
            Self::Process(child) => loop {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        let outcome = match (status.code(), status.signal()) {
                            (Some(0), _) => Ok(()),
                            (Some(code), _) => Err(SectionError::NonZeroExit {
                                name: name.to_owned(),
                                status: code,
                            }),
                            (None, Some(signal)) => Err(SectionError::Signalled {
                                name: name.to_owned(),
                                signal,
                            }),
                            (None, None) => Err(SectionError::remote(
                                name,
                                "command ended without an exit status",
                            )),
                        };
                        return Completion::Finished(outcome);
                    }
                    Ok(None) => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            return Completion::Expired;
                        }
                        thread::sleep(remaining.min(REAP_POLL_INTERVAL));
                    }
                    Err(source) => {
                        return Completion::Finished(Err(SectionError::io(name, source)));
                    }
                }
            },
        }
    }

    /// Stops waiting for the worker.
    ///
    /// Threads are detached. Processes have their whole group killed and are
    /// reaped so no zombie outlives the call.
    fn abandon(self, name: &str) {
        match self {
            Self::Thread { handle, .. } => {
                debug!(
                    target: WORKER_TARGET,
                    section = name,
                    thread = handle.thread().name().unwrap_or_default(),
                    "detaching worker thread"
                );
                drop(handle);
            }
            Self::Process(mut child) => {
                kill_process_group(name, &mut child);
                if let Err(error) = child.wait() {
                    warn!(
                        target: WORKER_TARGET,
                        section = name,
                        pid = child.id(),
                        %error,
                        "failed to reap command"
                    );
                }
            }
        }
    }
}

fn kill_process_group(name: &str, child: &mut Child) {
    let group = i32::try_from(child.id()).map(Pid::from_raw);
    let signalled = match group {
        Ok(pid) => match killpg(pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        },
        Err(_) => child.kill(),
    };
    if let Err(error) = signalled {
        warn!(
            target: WORKER_TARGET,
            section = name,
            pid = child.id(),
            %error,
            "failed to kill command"
        );
        // Fall back to the direct child so the reap cannot hang on it.
        if let Err(error) = child.kill() {
            debug!(target: WORKER_TARGET, section = name, %error, "direct kill failed");
        }
    }
}

/// Runs a worker section under its deadline and fans the output out.
///
/// Captured bytes are delivered to every interested sink on every exit
/// path, including timeouts and read failures, before the status is
/// returned.
///
/// # Errors
///
/// Returns [`SectionError::Spawn`] when the pipe or worker cannot be
/// created, [`SectionError::Timeout`] when the deadline passes first,
/// [`SectionError::Io`] when the pipe read fails, and the worker's own
/// error when it reports one.
pub fn execute<S>(
    section: &S,
    requests: &mut ReportRequestSet,
) -> Result<SectionReport, SectionError>
where
    S: WorkerSection + ?Sized,
{
    let info = section.info();
    let name = info.name();
    let deadline = Instant::now() + info.timeout();

    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC).map_err(|errno| {
        SectionError::spawn(name, "failed to create relay pipe", Some(io::Error::from(errno)))
    })?;
    let mut worker = section.spawn_worker(write_end).inspect_err(|error| {
        warn!(target: WORKER_TARGET, section = name, %error, "worker failed to start");
    })?;

    let mut reader = Polled::new(File::from(read_end));
    let mut buffer = CaptureBuffer::new(info.max_bytes());
    let outcome = DeadlineReader::new(deadline).read_to_end(&mut reader, &mut buffer);
    drop(reader);

    let result = match outcome {
        ReadOutcome::Eof => match worker.finish(name, deadline) {
            Completion::Finished(reported) => reported,
            Completion::Expired => {
                worker.abandon(name);
                Err(info.timeout_error(buffer.len()))
            }
        },
        ReadOutcome::TimedOut => {
            worker.abandon(name);
            Err(info.timeout_error(buffer.len()))
        }
        ReadOutcome::Failed(error) => {
            worker.abandon(name);
            Err(SectionError::io(name, error))
        }
    };

    let delivery = requests.write_section(info.id(), buffer.bytes());
    let elapsed = buffer.elapsed();
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    if buffer.truncated() {
        warn!(
            target: WORKER_TARGET,
            section = name,
            max_bytes = info.max_bytes(),
            "section output truncated"
        );
    }

    match result {
        Ok(()) => {
            debug!(
                target: WORKER_TARGET,
                section = name,
                id = info.id(),
                bytes = buffer.len(),
                elapsed_ms,
                sinks = delivery.delivered,
                "section '{name}' wrote {} bytes in {elapsed_ms} ms",
                buffer.len()
            );
            Ok(SectionReport::new(buffer.len(), elapsed, buffer.truncated()))
        }
        Err(error) => {
            warn!(
                target: WORKER_TARGET,
                section = name,
                id = info.id(),
                bytes = buffer.len(),
                elapsed_ms,
                timeout_ms = info.timeout_ms(),
                %error,
                "worker section did not complete"
            );
            Err(error)
        }
    }
}
