//! Section invoking a registered service's diagnostic dump.
//!
//! Services are looked up through a [`ServiceManager`] at execution time, on
//! the worker thread, so a slow directory or a hung service is bounded by
//! the same deadline as the dump itself.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::SectionError;
use crate::request::ReportRequestSet;
use crate::section::{Section, SectionInfo, SectionReport};
use crate::worker::{self, Worker, WorkerSection};

/// Tracing target for dump sections.
const DUMPSYS_TARGET: &str = "incident_sections::dumpsys";

/// A service able to describe its own state.
#[cfg_attr(test, mockall::automock)]
pub trait Dumpable: Send + Sync {
    /// Writes diagnostic output for `args` into `out`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the dump cannot be produced or written.
    fn dump(&self, out: &mut dyn Write, args: &[String]) -> io::Result<()>;
}

/// Resolves service names to live services.
#[cfg_attr(test, mockall::automock)]
pub trait ServiceManager: Send + Sync {
    /// Returns the service registered under `name`, if any.
    fn check_service(&self, name: &str) -> Option<Arc<dyn Dumpable>>;
}

/// In-process [`ServiceManager`] backed by a name to service map.
#[derive(Default)]
pub struct ServiceDirectory {
    services: RwLock<HashMap<String, Arc<dyn Dumpable>>>,
}

impl fmt::Debug for ServiceDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDirectory")
            .field("services", &self.names())
            .finish()
    }
}

impl ServiceDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under `name`, replacing any earlier registration.
    pub fn register(&self, name: impl Into<String>, service: Arc<dyn Dumpable>) {
        let key = name.into();
        let replaced = self
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), service);
        if replaced.is_some() {
            debug!(target: DUMPSYS_TARGET, service = key.as_str(), "service replaced");
        }
    }

    /// Removes the service registered under `name`.
    #[must_use = "the removed service is dropped if unused"]
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Dumpable>> {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Registered service names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl ServiceManager for ServiceDirectory {
    fn check_service(&self, name: &str) -> Option<Arc<dyn Dumpable>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// Dumps one service with fixed arguments.
#[derive(Clone)]
pub struct DumpsysSection {
    info: SectionInfo,
    service: String,
    args: Vec<String>,
    manager: Arc<dyn ServiceManager>,
}

impl fmt::Debug for DumpsysSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpsysSection")
            .field("info", &self.info)
            .field("service", &self.service)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl DumpsysSection {
    /// Creates a section named `dumpsys <service> <args...>`.
    #[must_use]
    pub fn new<I, A>(
        id: i32,
        manager: Arc<dyn ServiceManager>,
        service: impl Into<String>,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let service_name: String = service.into();
        let dump_args: Vec<String> = args.into_iter().map(Into::into).collect();
        let label = std::iter::once("dumpsys")
            .chain(std::iter::once(service_name.as_str()))
            .chain(dump_args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            info: SectionInfo::new(id, label),
            service: service_name,
            args: dump_args,
            manager,
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

    /// Name of the dumped service.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Arguments passed to the dump.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl WorkerSection for DumpsysSection {
    fn info(&self) -> &SectionInfo {
        &self.info
    }

    fn spawn_worker(&self, write_end: OwnedFd) -> Result<Worker, SectionError> {
        let name = self.info.name().to_owned();
        let service = self.service.clone();
        let args = self.args.clone();
        let manager = Arc::clone(&self.manager);
        Worker::spawn_thread(&self.info, write_end, move |output: &mut File| {
            let Some(target) = manager.check_service(&service) else {
                return Err(SectionError::remote(
                    &name,
                    format!("service '{service}' not found"),
                ));
            };
            debug!(target: DUMPSYS_TARGET, section = name.as_str(), "dumping service");
            target
                .dump(output, &args)
                .map_err(|error| SectionError::remote(&name, format!("dump failed: {error}")))
        })
    }
}

impl Section for DumpsysSection {
    fn info(&self) -> &SectionInfo {
        &self.info
    }

    fn execute(&self, requests: &mut ReportRequestSet) -> Result<SectionReport, SectionError> {
        worker::execute(self, requests)
    }
}
