//! Output format of the daemon's own diagnostics.
//!
//! The format is read from the configuration file and may be overridden on
//! the command line, so it deserialises from JSON and parses from text.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the daemon renders its log events on standard error.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened.
    #[default]
    Json,
    /// Terse single-line text for interactive use.
    Compact,
}
