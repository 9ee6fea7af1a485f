//! Unit tests for the deadline reader and capture buffer.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use rstest::rstest;

use super::*;

/// Source replaying scripted poll results and reads.
///
/// Once the poll script is exhausted the source behaves like a stalled
/// producer: every wait sleeps for the full timeout and reports `Idle`.
#[derive(Default)]
struct ScriptedSource {
    polls: VecDeque<Readiness>,
    reads: VecDeque<io::Result<Vec<u8>>>,
}

impl ScriptedSource {
    fn new(polls: impl IntoIterator<Item = Readiness>) -> Self {
        Self {
            polls: polls.into_iter().collect(),
            reads: VecDeque::new(),
        }
    }

    fn then_read(mut self, chunk: io::Result<Vec<u8>>) -> Self {
        self.reads.push_back(chunk);
        self
    }
}

impl Read for ScriptedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            None => Ok(0),
            Some(Err(error)) => Err(error),
            Some(Ok(chunk)) => {
                let len = chunk.len().min(buf.len());
                buf.get_mut(..len)
                    .expect("slice within bounds")
                    .copy_from_slice(chunk.get(..len).expect("slice within bounds"));
                Ok(len)
            }
        }
    }
}

impl ReadySource for ScriptedSource {
    fn wait_ready(&mut self, timeout: Duration) -> io::Result<Readiness> {
        match self.polls.pop_front() {
            Some(readiness) => Ok(readiness),
            None => {
                thread::sleep(timeout);
                Ok(Readiness::Idle)
            }
        }
    }
}

fn deadline_in(millis: u64) -> Instant {
    Instant::now() + Duration::from_millis(millis)
}

#[test]
fn sysfs_error_ready_still_reads_data() {
    let mut source = ScriptedSource::new([Readiness::Error, Readiness::Error])
        .then_read(Ok(b"[always] madvise never\n".to_vec()));
    let mut buffer = CaptureBuffer::new(1024);

    let outcome = DeadlineReader::new(deadline_in(1000))
        .tolerate_poll_errors(true)
        .read_to_end(&mut source, &mut buffer);

    assert!(matches!(outcome, ReadOutcome::Eof), "got {outcome:?}");
    assert_eq!(buffer.bytes(), b"[always] madvise never\n");
}

#[test]
fn regular_error_ready_is_fatal() {
    let mut source =
        ScriptedSource::new([Readiness::Error]).then_read(Ok(b"never read".to_vec()));
    let mut buffer = CaptureBuffer::new(1024);

    let outcome = DeadlineReader::new(deadline_in(1000)).read_to_end(&mut source, &mut buffer);

    assert!(matches!(outcome, ReadOutcome::Failed(_)), "got {outcome:?}");
    assert!(buffer.bytes().is_empty());
}

#[test]
fn sysfs_error_ready_followed_by_failed_read_is_a_failure() {
    let mut source = ScriptedSource::new([Readiness::Error])
        .then_read(Err(io::Error::from_raw_os_error(nix::libc::EIO)));
    let mut buffer = CaptureBuffer::new(1024);

    let outcome = DeadlineReader::new(deadline_in(1000))
        .tolerate_poll_errors(true)
        .read_to_end(&mut source, &mut buffer);

    match outcome {
        ReadOutcome::Failed(error) => assert_eq!(error.raw_os_error(), Some(nix::libc::EIO)),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn stalled_source_times_out_with_partial_bytes() {
    let mut source =
        ScriptedSource::new([Readiness::Readable]).then_read(Ok(b"partial".to_vec()));
    let mut buffer = CaptureBuffer::new(1024);
    let started = Instant::now();

    let outcome = DeadlineReader::new(deadline_in(100)).read_to_end(&mut source, &mut buffer);

    assert!(matches!(outcome, ReadOutcome::TimedOut), "got {outcome:?}");
    assert_eq!(buffer.bytes(), b"partial");
    assert!(started.elapsed() < Duration::from_millis(1000));
}

#[test]
fn interrupted_reads_are_retried() {
    let mut source = ScriptedSource::new([
        Readiness::Readable,
        Readiness::Readable,
        Readiness::Readable,
    ])
    .then_read(Err(io::Error::from(io::ErrorKind::Interrupted)))
    .then_read(Ok(b"ok".to_vec()));
    let mut buffer = CaptureBuffer::new(1024);

    let outcome = DeadlineReader::new(deadline_in(1000)).read_to_end(&mut source, &mut buffer);

    assert!(matches!(outcome, ReadOutcome::Eof), "got {outcome:?}");
    assert_eq!(buffer.bytes(), b"ok");
}

#[rstest]
#[case(4, b"abcdefgh".as_slice(), b"abcd".as_slice(), true)]
#[case(8, b"abcdefgh".as_slice(), b"abcdefgh".as_slice(), false)]
#[case(16, b"abc".as_slice(), b"abc".as_slice(), false)]
fn buffer_caps_captured_bytes(
    #[case] max_bytes: usize,
    #[case] input: &[u8],
    #[case] kept: &[u8],
    #[case] truncated: bool,
) {
    let mut buffer = CaptureBuffer::new(max_bytes);
    for byte in input {
        buffer.append(std::slice::from_ref(byte));
    }
    assert_eq!(buffer.bytes(), kept);
    assert_eq!(buffer.len(), kept.len());
    assert_eq!(buffer.truncated(), truncated);
}

#[test]
fn pipe_reads_until_writer_closes() {
    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC).expect("create pipe");
    let writer = thread::spawn(move || {
        let mut file = File::from(write_end);
        file.write_all(b"hello ").expect("write first chunk");
        thread::sleep(Duration::from_millis(20));
        file.write_all(b"world").expect("write second chunk");
    });

    let mut source = Polled::new(File::from(read_end));
    let mut buffer = CaptureBuffer::new(1024);
    let outcome = DeadlineReader::new(deadline_in(2000)).read_to_end(&mut source, &mut buffer);
    writer.join().expect("writer thread");

    assert!(matches!(outcome, ReadOutcome::Eof), "got {outcome:?}");
    assert_eq!(buffer.bytes(), b"hello world");
}

#[test]
fn pipe_without_eof_times_out() {
    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC).expect("create pipe");
    let mut source = Polled::new(File::from(read_end));
    let mut buffer = CaptureBuffer::new(1024);
    let started = Instant::now();

    let outcome = DeadlineReader::new(deadline_in(150)).read_to_end(&mut source, &mut buffer);
    drop(write_end);

    assert!(matches!(outcome, ReadOutcome::TimedOut), "got {outcome:?}");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(150), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1000), "returned late: {elapsed:?}");
}
