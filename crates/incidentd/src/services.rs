//! Services the daemon registers for itself.

use std::io::{self, Write};
use std::sync::Arc;

use incident_config::Config;
use incident_sections::{Dumpable, ServiceDirectory};

use crate::registry::DAEMON_NAME;

/// Dumps the configuration the daemon is running with.
///
/// Passing `--compact` writes a single JSON line instead of indented JSON.
#[derive(Debug, Clone)]
pub struct ConfigService {
    config: Config,
}

impl ConfigService {
    /// Creates a service describing `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl Dumpable for ConfigService {
    fn dump(&self, out: &mut dyn Write, args: &[String]) -> io::Result<()> {
        let compact = args.iter().any(|arg| arg == "--compact");
        if compact {
            serde_json::to_writer(&mut *out, &self.config)?;
        } else {
            serde_json::to_writer_pretty(&mut *out, &self.config)?;
        }
        out.write_all(b"\n")
    }
}

/// Builds the directory of built-in services.
///
/// The daemon's own configuration is registered under [`DAEMON_NAME`].
#[must_use]
pub fn builtin_services(config: &Config) -> ServiceDirectory {
    let directory = ServiceDirectory::new();
    directory.register(DAEMON_NAME, Arc::new(ConfigService::new(config.clone())));
    directory
}
