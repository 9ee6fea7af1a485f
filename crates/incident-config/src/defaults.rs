//! Default values shared by the configuration and the section constructors.

use crate::logging::LogFormat;

/// Budget for sections that wait on a remote party (commands, service dumps).
pub const REMOTE_CALL_TIMEOUT_MS: i64 = 10 * 1000;

/// Budget for sections that read a single file.
pub const FILE_READ_TIMEOUT_MS: i64 = 5000;

/// Upper bound on the bytes buffered for one section.
pub const MAX_SECTION_BYTES: usize = 256 * 4 * 1024;

/// Prefix identifying pseudo-filesystem nodes with unreliable poll semantics.
pub const SYSFS_ROOT: &str = "/sys/";

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Environment variable naming a JSON configuration file.
pub const CONFIG_PATH_ENV_VAR: &str = "INCIDENTD_CONFIG_PATH";

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

pub(crate) const fn default_timeout_ms() -> i64 {
    REMOTE_CALL_TIMEOUT_MS
}

pub(crate) const fn default_file_timeout_ms() -> i64 {
    FILE_READ_TIMEOUT_MS
}

pub(crate) const fn default_max_section_bytes() -> usize {
    MAX_SECTION_BYTES
}

pub(crate) fn default_sysfs_root() -> String {
    SYSFS_ROOT.to_owned()
}
