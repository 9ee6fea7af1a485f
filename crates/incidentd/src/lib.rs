//! The incident collection daemon.
//!
//! A collection pass loads the configuration, initialises structured
//! telemetry, builds the ordered section registry (the report header first,
//! then every configured section), and executes the sections one at a time
//! against the registered output sinks. Section failures are reported
//! through a [`CollectionReporter`] and never stop the pass; the
//! [`PassSummary`] records what happened to each section.

mod bootstrap;
mod collection;
pub mod registry;
mod reporter;
mod services;
pub mod telemetry;

pub use bootstrap::{
    ConfigLoader, DaemonError, OverridingConfigLoader, PassPlan, StaticConfigLoader,
    SystemConfigLoader, run_pass,
};
pub use collection::{Collection, PassSummary, SectionOutcome, SectionRecord};
pub use registry::{RegistryError, build_sections};
pub use reporter::{CollectionReporter, StructuredCollectionReporter};
pub use services::{ConfigService, builtin_services};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
