//! Deadline-bounded capture of a readable descriptor.
//!
//! [`DeadlineReader`] never issues an unbounded blocking wait: every
//! iteration polls for readiness with the time left until a single deadline,
//! then reads whatever is available into a [`CaptureBuffer`]. Pseudo
//! filesystem nodes report an error condition on every poll even though
//! their reads succeed, so the reader can be told to attempt the read anyway
//! and only fail when the read itself fails.

use std::io::{self, Read};
use std::os::fd::AsFd;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

/// Bytes requested from the descriptor per read call.
const CHUNK_SIZE: usize = 4096;

/// Readiness reported by one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// Nothing happened before the wait expired.
    Idle,
    /// Data or end-of-file can be read.
    Readable,
    /// The descriptor reported an error condition.
    Error,
}

/// A byte source that supports bounded readiness waits.
pub(crate) trait ReadySource: Read {
    /// Waits at most `timeout` for the source to become readable.
    fn wait_ready(&mut self, timeout: Duration) -> io::Result<Readiness>;
}

/// Adapts any readable descriptor to [`ReadySource`] using `poll(2)`.
#[derive(Debug)]
pub(crate) struct Polled<R>(R);

impl<R> Polled<R> {
    pub(crate) const fn new(inner: R) -> Self {
        Self(inner)
    }
}

impl<R: Read> Read for Polled<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read + AsFd> ReadySource for Polled<R> {
    fn wait_ready(&mut self, timeout: Duration) -> io::Result<Readiness> {
        // Waits longer than u16::MAX ms are split across loop iterations.
        let millis = u16::try_from(timeout.as_micros().div_ceil(1000)).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.0.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) | Err(Errno::EINTR) => return Ok(Readiness::Idle),
            Ok(_) => {}
            Err(errno) => return Err(io::Error::from(errno)),
        }
        let [fd] = &fds;
        let revents = fd.revents().unwrap_or_else(PollFlags::empty);
        if revents.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
            Ok(Readiness::Error)
        } else {
            Ok(Readiness::Readable)
        }
    }
}

/// How a bounded read ended.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    /// The writer closed its end; the buffer holds everything produced.
    Eof,
    /// The deadline elapsed first.
    TimedOut,
    /// Polling or reading failed.
    Failed(io::Error),
}

/// Accumulates a section's bytes up to a fixed cap.
///
/// Input beyond the cap is drained and dropped so the producer never blocks
/// on a full pipe; the buffer remembers that it was truncated.
#[derive(Debug)]
pub(crate) struct CaptureBuffer {
    data: Vec<u8>,
    max_bytes: usize,
    truncated: bool,
    started: Instant,
}

impl CaptureBuffer {
    pub(crate) fn new(max_bytes: usize) -> Self {
        Self {
            data: Vec::new(),
            max_bytes,
            truncated: false,
            started: Instant::now(),
        }
    }

    pub(crate) fn append(&mut self, chunk: &[u8]) {
        let room = self.max_bytes.saturating_sub(self.data.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        let kept = chunk.len().min(room);
        self.data
            .extend_from_slice(chunk.get(..kept).unwrap_or_default());
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) const fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) const fn truncated(&self) -> bool {
        self.truncated
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Reads a source to end-of-file or until a deadline, whichever is first.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeadlineReader {
    deadline: Instant,
    tolerate_poll_errors: bool,
}

impl DeadlineReader {
    pub(crate) const fn new(deadline: Instant) -> Self {
        Self {
            deadline,
            tolerate_poll_errors: false,
        }
    }

    /// Treats an error-ready poll as "read anyway" instead of a failure.
    pub(crate) const fn tolerate_poll_errors(mut self, tolerate: bool) -> Self {
        self.tolerate_poll_errors = tolerate;
        self
    }

    pub(crate) fn read_to_end<S: ReadySource>(
        &self,
        source: &mut S,
        buffer: &mut CaptureBuffer,
    ) -> ReadOutcome {
        let mut chunk = [0_u8; CHUNK_SIZE];
        loop {
            let Some(remaining) = self
                .deadline
                .checked_duration_since(Instant::now())
                .filter(|remaining| !remaining.is_zero())
            else {
                return ReadOutcome::TimedOut;
            };

            match source.wait_ready(remaining) {
                Ok(Readiness::Idle) => continue,
                Ok(Readiness::Error) if !self.tolerate_poll_errors => {
                    return ReadOutcome::Failed(io::Error::other(
                        "descriptor reported an error condition",
                    ));
                }
                Ok(Readiness::Readable | Readiness::Error) => {}
                Err(error) => return ReadOutcome::Failed(error),
            }

            match source.read(&mut chunk) {
                Ok(0) => return ReadOutcome::Eof,
                Ok(read) => buffer.append(chunk.get(..read).unwrap_or_default()),
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                    ) => {}
                Err(error) => return ReadOutcome::Failed(error),
            }
        }
    }
}

#[cfg(test)]
mod tests;
