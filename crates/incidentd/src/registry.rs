//! Builds the ordered section list from configuration.

use std::sync::Arc;

use thiserror::Error;

use incident_config::{Config, ConfigError, SectionSpec};
use incident_sections::{
    CommandSection, DumpsysSection, FileSection, HEADER_SECTION_ID, HeaderSection, Section,
    ServiceManager,
};

/// Daemon name written into the report header.
pub const DAEMON_NAME: &str = "incidentd";

/// Errors raised while turning configuration into sections.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The configuration failed validation.
    #[error("invalid section configuration: {source}")]
    InvalidConfig {
        /// Violated invariant.
        #[source]
        source: ConfigError,
    },
    /// A configured section claimed the identifier reserved for the header.
    #[error("section id {id} is reserved for the report header")]
    ReservedId {
        /// Offending identifier.
        id: i32,
    },
}

/// Builds the header followed by every configured section, in order.
///
/// Timeouts fall back to the configured defaults for each kind and every
/// section inherits the configured byte cap.
///
/// # Errors
///
/// Returns [`RegistryError::InvalidConfig`] when `config` fails validation
/// and [`RegistryError::ReservedId`] when a section reuses the header id.
pub fn build_sections(
    config: &Config,
    services: &Arc<dyn ServiceManager>,
) -> Result<Vec<Box<dyn Section>>, RegistryError> {
    config
        .validate()
        .map_err(|source| RegistryError::InvalidConfig { source })?;

    let mut sections: Vec<Box<dyn Section>> = Vec::with_capacity(config.sections().len() + 1);
    sections.push(Box::new(HeaderSection::new(
        DAEMON_NAME,
        env!("CARGO_PKG_VERSION"),
    )));
    for spec in config.sections() {
        if spec.id() == HEADER_SECTION_ID {
            return Err(RegistryError::ReservedId { id: spec.id() });
        }
        sections.push(build_section(config, spec, services));
    }
    Ok(sections)
}

fn build_section(
    config: &Config,
    spec: &SectionSpec,
    services: &Arc<dyn ServiceManager>,
) -> Box<dyn Section> {
    let max_bytes = config.max_section_bytes();
    match spec {
        SectionSpec::File {
            id,
            path,
            timeout_ms,
        } => Box::new(
            FileSection::new(*id, path.clone())
                .with_sysfs_root(config.sysfs_root())
                .with_timeout_ms(timeout_ms.unwrap_or(config.file_timeout_ms()))
                .with_max_bytes(max_bytes),
        ),
        SectionSpec::Command {
            id,
            argv,
            timeout_ms,
        } => Box::new(
            CommandSection::new(*id, argv.iter().cloned())
                .with_timeout_ms(timeout_ms.unwrap_or(config.default_timeout_ms()))
                .with_max_bytes(max_bytes),
        ),
        SectionSpec::Dumpsys {
            id,
            service,
            args,
            timeout_ms,
        } => Box::new(
            DumpsysSection::new(*id, Arc::clone(services), service.clone(), args.iter().cloned())
                .with_timeout_ms(timeout_ms.unwrap_or(config.default_timeout_ms()))
                .with_max_bytes(max_bytes),
        ),
    }
}
