//! Shared configuration for the incident collection daemon.
//!
//! The configuration carries the ambient settings (log filter and format),
//! the timeout defaults every section falls back to, the per-section byte
//! cap, and the ordered section registry. Every field has a default so an
//! empty JSON object is a valid configuration.
//!
//! ```rust
//! use incident_config::{Config, LogFormat};
//!
//! let config = Config::from_json_str(r#"{ "log_format": "compact" }"#)?;
//! assert_eq!(config.log_format(), LogFormat::Compact);
//! assert_eq!(config.default_timeout_ms(), 10_000);
//! # Ok::<(), incident_config::ConfigError>(())
//! ```

pub mod defaults;
mod logging;
mod sections;

use std::collections::HashSet;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    CONFIG_PATH_ENV_VAR, DEFAULT_LOG_FILTER, FILE_READ_TIMEOUT_MS, MAX_SECTION_BYTES,
    REMOTE_CALL_TIMEOUT_MS, SYSFS_ROOT,
};
pub use logging::LogFormat;
pub use sections::SectionSpec;

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration '{path}': {source}")]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The configuration text was not valid JSON for [`Config`].
    #[error("failed to parse configuration from {origin}: {source}")]
    Parse {
        /// Where the text came from.
        origin: String,
        /// Underlying parse error.
        #[source]
        source: Arc<serde_json::Error>,
    },
    /// A timeout was zero or negative.
    #[error("{field} must be positive, got {value}")]
    InvalidTimeout {
        /// Offending setting.
        field: String,
        /// Value that was rejected.
        value: i64,
    },
    /// The per-section byte cap was zero.
    #[error("max_section_bytes must be greater than zero")]
    InvalidByteLimit,
    /// Two sections share an identifier.
    #[error("section id {id} is declared more than once")]
    DuplicateSectionId {
        /// Repeated identifier.
        id: i32,
    },
    /// A section entry is missing the data it needs to run.
    #[error("section {id} is incomplete: {message}")]
    IncompleteSection {
        /// Section identifier.
        id: i32,
        /// What is missing.
        message: String,
    },
}

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "defaults::default_log_filter_string")]
    log_filter: String,
    #[serde(default = "defaults::default_log_format")]
    log_format: LogFormat,
    #[serde(default = "defaults::default_timeout_ms")]
    default_timeout_ms: i64,
    #[serde(default = "defaults::default_file_timeout_ms")]
    file_timeout_ms: i64,
    #[serde(default = "defaults::default_max_section_bytes")]
    max_section_bytes: usize,
    #[serde(default = "defaults::default_sysfs_root")]
    sysfs_root: String,
    #[serde(default)]
    sections: Vec<SectionSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
            default_timeout_ms: defaults::default_timeout_ms(),
            file_timeout_ms: defaults::default_file_timeout_ms(),
            max_section_bytes: defaults::default_max_section_bytes(),
            sysfs_root: defaults::default_sysfs_root(),
            sections: Vec::new(),
        }
    }
}

impl Config {
    /// Loads the configuration named by [`CONFIG_PATH_ENV_VAR`], falling back
    /// to defaults when the variable is unset.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the named file cannot be read, parsed,
    /// or validated.
    pub fn load() -> Result<Self, ConfigError> {
        env::var_os(CONFIG_PATH_ENV_VAR).map_or_else(
            || Ok(Self::default()),
            |path| Self::load_from_path(Path::new(&path)),
        )
    }

    /// Loads and validates the configuration stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the text is malformed or invalid.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, "inline text")
    }

    fn parse(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            origin: origin.to_owned(),
            source: Arc::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the section constructors rely on.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("default_timeout_ms", self.default_timeout_ms)?;
        ensure_positive("file_timeout_ms", self.file_timeout_ms)?;
        if self.max_section_bytes == 0 {
            return Err(ConfigError::InvalidByteLimit);
        }

        let mut seen = HashSet::new();
        for spec in &self.sections {
            let id = spec.id();
            if !seen.insert(id) {
                return Err(ConfigError::DuplicateSectionId { id });
            }
            if let Some(timeout) = spec.timeout_ms() {
                ensure_positive(&format!("sections[{id}].timeout_ms"), timeout)?;
            }
            validate_section(spec)?;
        }
        Ok(())
    }

    /// Log filter expression handed to the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for log records.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Budget applied to command and service sections without an override.
    #[must_use]
    pub const fn default_timeout_ms(&self) -> i64 {
        self.default_timeout_ms
    }

    /// Budget applied to file sections without an override.
    #[must_use]
    pub const fn file_timeout_ms(&self) -> i64 {
        self.file_timeout_ms
    }

    /// Maximum bytes buffered for a single section.
    #[must_use]
    pub const fn max_section_bytes(&self) -> usize {
        self.max_section_bytes
    }

    /// Prefix identifying pseudo-filesystem paths.
    #[must_use]
    pub fn sysfs_root(&self) -> &str {
        &self.sysfs_root
    }

    /// Ordered section registry.
    #[must_use]
    pub fn sections(&self) -> &[SectionSpec] {
        &self.sections
    }

    /// Replaces the section registry.
    #[must_use]
    pub fn with_sections(mut self, sections: Vec<SectionSpec>) -> Self {
        self.sections = sections;
        self
    }

    /// Replaces the log output format.
    #[must_use]
    pub const fn with_log_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }
}

fn ensure_positive(field: &str, value: i64) -> Result<(), ConfigError> {
    if value > 0 {
        return Ok(());
    }
    Err(ConfigError::InvalidTimeout {
        field: field.to_owned(),
        value,
    })
}

fn validate_section(spec: &SectionSpec) -> Result<(), ConfigError> {
    let incomplete = |message: &str| ConfigError::IncompleteSection {
        id: spec.id(),
        message: message.to_owned(),
    };
    match spec {
        SectionSpec::File { path, .. } if path.as_os_str().is_empty() => {
            Err(incomplete("file path is empty"))
        }
        SectionSpec::Command { argv, .. } if argv.first().is_none_or(String::is_empty) => {
            Err(incomplete("command argv is empty"))
        }
        SectionSpec::Dumpsys { service, .. } if service.is_empty() => {
            Err(incomplete("service name is empty"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests;
