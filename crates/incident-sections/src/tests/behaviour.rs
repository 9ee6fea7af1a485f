//! Behavioural tests for section execution.

use std::cell::RefCell;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use crate::{
    CommandSection, Dumpable, DumpsysSection, FileSection, MemorySink, ReportRequest,
    ReportRequestSet, Section, SectionError, SectionReport, SectionStatus, ServiceDirectory,
};

type StepResult = Result<(), String>;

/// Sink rejecting every write.
struct BrokenSink;

impl Write for BrokenSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Service that never finishes its dump within a test deadline.
struct HungService;

impl Dumpable for HungService {
    fn dump(&self, _out: &mut dyn Write, _args: &[String]) -> io::Result<()> {
        thread::sleep(Duration::from_secs(3));
        Ok(())
    }
}

struct TestWorld {
    temp_dir: TempDir,
    requests: ReportRequestSet,
    healthy: Vec<MemorySink>,
    broken: Option<usize>,
    section: Option<Box<dyn Section>>,
    pid_file: Option<PathBuf>,
    result: Option<Result<SectionReport, SectionError>>,
    elapsed: Duration,
}

impl TestWorld {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("create temp dir"),
            requests: ReportRequestSet::new(),
            healthy: Vec::new(),
            broken: None,
            section: None,
            pid_file: None,
            result: None,
            elapsed: Duration::ZERO,
        }
    }

    fn result(&self) -> Result<&Result<SectionReport, SectionError>, String> {
        self.result
            .as_ref()
            .ok_or_else(|| "section has not executed".to_owned())
    }
}

#[fixture]
fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}

#[given("{count} healthy sinks")]
fn given_healthy_sinks(world: &RefCell<TestWorld>, count: usize) {
    let mut state = world.borrow_mut();
    for _ in 0..count {
        let sink = MemorySink::new();
        state.requests.add(ReportRequest::new(sink.clone()));
        state.healthy.push(sink);
    }
}

#[given("a broken sink")]
fn given_broken_sink(world: &RefCell<TestWorld>) {
    let mut state = world.borrow_mut();
    let index = state.requests.add(ReportRequest::new(BrokenSink));
    state.broken = Some(index);
}

#[given("a command section that prints {text} with a {timeout} ms timeout")]
fn given_printing_command(world: &RefCell<TestWorld>, text: String, timeout: i64) {
    let section = CommandSection::new(4001, ["/bin/sh", "-c", &format!("printf '%s' '{text}'")])
        .with_timeout_ms(timeout);
    world.borrow_mut().section = Some(Box::new(section));
}

#[given("a command section that sleeps for {seconds} seconds with a {timeout} ms timeout")]
fn given_sleeping_command(world: &RefCell<TestWorld>, seconds: u64, timeout: i64) {
    let mut state = world.borrow_mut();
    let pid_file = state.temp_dir.path().join("command.pid");
    let script = format!("echo $$ > '{}'; sleep {seconds}", pid_file.display());
    let section = CommandSection::new(4002, ["/bin/sh", "-c", &script]).with_timeout_ms(timeout);
    state.pid_file = Some(pid_file);
    state.section = Some(Box::new(section));
}

#[given("a file section over a missing path")]
fn given_missing_file(world: &RefCell<TestWorld>) {
    let mut state = world.borrow_mut();
    let path = state.temp_dir.path().join("does-not-exist");
    state.section = Some(Box::new(FileSection::new(4003, path)));
}

#[given("a file section containing {text}")]
fn given_file_with_text(world: &RefCell<TestWorld>, text: String) -> StepResult {
    let mut state = world.borrow_mut();
    let path = state.temp_dir.path().join("contents");
    fs::write(&path, text).map_err(|error| format!("write fixture: {error}"))?;
    state.section = Some(Box::new(FileSection::new(4004, path)));
    Ok(())
}

#[given("a dump section for a hung service with a {timeout} ms timeout")]
fn given_hung_service(world: &RefCell<TestWorld>, timeout: i64) {
    let directory = ServiceDirectory::new();
    directory.register("hung", Arc::new(HungService));
    let section = DumpsysSection::new(4005, Arc::new(directory), "hung", Vec::<String>::new())
        .with_timeout_ms(timeout);
    world.borrow_mut().section = Some(Box::new(section));
}

#[when("the section executes")]
fn when_section_executes(world: &RefCell<TestWorld>) -> StepResult {
    let mut guard = world.borrow_mut();
    let state = &mut *guard;
    let section = state
        .section
        .as_ref()
        .ok_or_else(|| "no section configured".to_owned())?;
    let started = Instant::now();
    let result = section.execute(&mut state.requests);
    state.elapsed = started.elapsed();
    state.result = Some(result);
    Ok(())
}

#[then("the status is {status}")]
fn then_status_is(world: &RefCell<TestWorld>, status: String) -> StepResult {
    let state = world.borrow();
    let actual = SectionStatus::of(state.result()?).to_string();
    if actual == status {
        Ok(())
    } else {
        Err(format!("expected status {status}, got {actual}"))
    }
}

#[then("the section returned within {millis} ms")]
fn then_returned_within(world: &RefCell<TestWorld>, millis: u64) {
    let elapsed = world.borrow().elapsed;
    assert!(
        elapsed < Duration::from_millis(millis),
        "section took {elapsed:?}"
    );
}

#[then("every healthy sink received {text}")]
fn then_every_sink_received(world: &RefCell<TestWorld>, text: String) {
    let state = world.borrow();
    assert!(!state.healthy.is_empty(), "no healthy sinks registered");
    for sink in &state.healthy {
        assert_eq!(sink.contents(), text.as_bytes());
    }
}

#[then("the command process is no longer running")]
fn then_command_gone(world: &RefCell<TestWorld>) -> StepResult {
    let state = world.borrow();
    let pid_file = state
        .pid_file
        .as_ref()
        .ok_or_else(|| "no pid file recorded".to_owned())?;
    let text = fs::read_to_string(pid_file).map_err(|error| format!("read pid: {error}"))?;
    let pid: i32 = text
        .trim()
        .parse()
        .map_err(|error| format!("parse pid: {error}"))?;
    match kill(Pid::from_raw(pid), None) {
        Err(Errno::ESRCH) => Ok(()),
        other => Err(format!("process {pid} still present: {other:?}")),
    }
}

#[then("the broken sink recorded a write failure")]
fn then_broken_sink_failed(world: &RefCell<TestWorld>) -> StepResult {
    let state = world.borrow();
    let index = state.broken.ok_or_else(|| "no broken sink".to_owned())?;
    let request = state
        .requests
        .get(index)
        .ok_or_else(|| "broken sink missing".to_owned())?;
    match request.error() {
        Some(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => Err(format!("unexpected sink error state: {other:?}")),
    }
}

#[scenario(
    path = "tests/features/section_execution.feature",
    name = "A quick command delivers its output to every sink"
)]
fn quick_command(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/section_execution.feature",
    name = "A sleeping command times out and leaves no process behind"
)]
fn sleeping_command(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/section_execution.feature",
    name = "A missing file is an I/O failure"
)]
fn missing_file(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/section_execution.feature",
    name = "A hung service is abandoned at the deadline"
)]
fn hung_service(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/section_execution.feature",
    name = "A failing sink does not disturb the others"
)]
fn failing_sink(world: RefCell<TestWorld>) {
    drop(world);
}
