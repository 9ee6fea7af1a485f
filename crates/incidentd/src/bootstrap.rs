//! Wiring for a single collection pass.

use std::sync::Arc;

use thiserror::Error;

use incident_config::{Config, ConfigError, LogFormat};
use incident_sections::{ReportRequest, ReportRequestSet, ServiceManager, SinkError};

use crate::collection::{Collection, PassSummary};
use crate::registry::{RegistryError, build_sections};
use crate::reporter::CollectionReporter;
use crate::telemetry::{self, TelemetryError};

/// Tracing target for daemon lifecycle events.
const BOOTSTRAP_TARGET: &str = "incidentd::bootstrap";

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configuration is unusable.
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load()
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(self.config.clone())
    }
}

/// Loader that applies command-line overrides on top of another loader.
#[derive(Debug, Clone)]
pub struct OverridingConfigLoader<L> {
    inner: L,
    log_format: Option<LogFormat>,
}

impl<L: ConfigLoader> OverridingConfigLoader<L> {
    /// Wraps `inner` without overrides.
    #[must_use]
    pub const fn new(inner: L) -> Self {
        Self {
            inner,
            log_format: None,
        }
    }

    /// Forces the log format when `log_format` is set.
    #[must_use]
    pub const fn with_log_format(mut self, log_format: Option<LogFormat>) -> Self {
        self.log_format = log_format;
        self
    }
}

impl<L: ConfigLoader> ConfigLoader for OverridingConfigLoader<L> {
    fn load(&self) -> Result<Config, ConfigError> {
        let config = self.inner.load()?;
        let Some(format) = self.log_format else {
            return Ok(config);
        };
        Ok(config.with_log_format(format))
    }
}

/// Errors that stop a collection pass from running or being delivered.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The section registry could not be built.
    #[error("failed to build section registry: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
    /// The output sink failed during the pass.
    #[error("report output failed: {source}")]
    Output {
        /// First write failure recorded on the sink.
        #[source]
        source: SinkError,
    },
}

/// Collaborators needed to run one pass.
pub struct PassPlan<'a> {
    /// Source of the configuration.
    pub loader: &'a dyn ConfigLoader,
    /// Observer for pass events.
    pub reporter: Arc<dyn CollectionReporter>,
    /// Resolves services for dump sections; built from the loaded
    /// configuration.
    pub services: &'a dyn Fn(&Config) -> Arc<dyn ServiceManager>,
}

/// Loads configuration, initialises telemetry, and runs one pass into
/// `request`.
///
/// Section failures are reported and do not fail the pass.
///
/// # Errors
///
/// Returns a [`DaemonError`] when the pass cannot start or when the output
/// sink fails.
pub fn run_pass(plan: &PassPlan<'_>, request: ReportRequest) -> Result<PassSummary, DaemonError> {
    let config = plan
        .loader
        .load()
        .map_err(|source| DaemonError::Configuration { source })?;
    telemetry::initialise(&config).map_err(|source| DaemonError::Telemetry { source })?;

    let services = (plan.services)(&config);
    let sections =
        build_sections(&config, &services).map_err(|source| DaemonError::Registry { source })?;
    let collection = Collection::new(sections, Arc::clone(&plan.reporter));
    tracing::debug!(
        target: BOOTSTRAP_TARGET,
        sections = collection.len(),
        "section registry built"
    );

    let mut requests = ReportRequestSet::new();
    let index = requests.add(request);
    let summary = collection.run(&mut requests);

    if let Some(error) = requests.get(index).and_then(ReportRequest::error) {
        return Err(DaemonError::Output {
            source: error.clone(),
        });
    }
    Ok(summary)
}
