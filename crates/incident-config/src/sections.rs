//! Declarative descriptions of the sections a collection pass runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One entry of the section registry as written in the configuration file.
///
/// The daemon turns each entry into a concrete section; the order of the
/// entries is the order in which the sections execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum SectionSpec {
    /// Copies the contents of a file.
    File {
        /// Section identifier.
        id: i32,
        /// File to read.
        path: PathBuf,
        /// Optional budget overriding the file read default.
        timeout_ms: Option<i64>,
    },
    /// Captures the standard output of an external program.
    Command {
        /// Section identifier.
        id: i32,
        /// Argument vector; the first element is the executable.
        argv: Vec<String>,
        /// Optional budget overriding the remote call default.
        timeout_ms: Option<i64>,
    },
    /// Captures the diagnostic dump of a named service.
    Dumpsys {
        /// Section identifier.
        id: i32,
        /// Service to dump.
        service: String,
        /// Extra arguments handed to the service.
        #[serde(default)]
        args: Vec<String>,
        /// Optional budget overriding the remote call default.
        timeout_ms: Option<i64>,
    },
}

impl SectionSpec {
    /// Returns the section identifier.
    #[must_use]
    pub const fn id(&self) -> i32 {
        match self {
            Self::File { id, .. } | Self::Command { id, .. } | Self::Dumpsys { id, .. } => *id,
        }
    }

    /// Returns the explicit timeout, if one was configured.
    #[must_use]
    pub const fn timeout_ms(&self) -> Option<i64> {
        match self {
            Self::File { timeout_ms, .. }
            | Self::Command { timeout_ms, .. }
            | Self::Dumpsys { timeout_ms, .. } => *timeout_ms,
        }
    }
}
