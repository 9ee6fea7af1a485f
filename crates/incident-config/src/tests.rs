//! Unit tests for configuration parsing and validation.

use std::path::PathBuf;

use rstest::rstest;

use super::*;

#[test]
fn empty_object_yields_defaults() {
    let config = Config::from_json_str("{}").expect("parse empty config");
    assert_eq!(config, Config::default());
    assert_eq!(config.default_timeout_ms(), REMOTE_CALL_TIMEOUT_MS);
    assert_eq!(config.file_timeout_ms(), FILE_READ_TIMEOUT_MS);
    assert_eq!(config.max_section_bytes(), MAX_SECTION_BYTES);
    assert_eq!(config.sysfs_root(), "/sys/");
    assert_eq!(config.log_filter(), "info");
    assert_eq!(config.log_format(), LogFormat::Json);
    assert!(config.sections().is_empty());
}

#[test]
fn sections_keep_declaration_order() {
    let text = r#"{
        "sections": [
            { "kind": "file", "id": 2000, "path": "/proc/version" },
            { "kind": "command", "id": 2001, "argv": ["/bin/uname", "-a"], "timeout_ms": 500 },
            { "kind": "dumpsys", "id": 3000, "service": "battery", "args": ["--proto"] }
        ]
    }"#;
    let config = Config::from_json_str(text).expect("parse sections");
    let ids: Vec<i32> = config.sections().iter().map(SectionSpec::id).collect();
    assert_eq!(ids, vec![2000, 2001, 3000]);
    assert_eq!(
        config.sections().first(),
        Some(&SectionSpec::File {
            id: 2000,
            path: PathBuf::from("/proc/version"),
            timeout_ms: None,
        })
    );
    assert_eq!(
        config.sections().get(1).and_then(SectionSpec::timeout_ms),
        Some(500)
    );
}

#[rstest]
#[case::zero_default(r#"{ "default_timeout_ms": 0 }"#)]
#[case::negative_file(r#"{ "file_timeout_ms": -5 }"#)]
#[case::section_override(
    r#"{ "sections": [ { "kind": "file", "id": 1, "path": "/x", "timeout_ms": 0 } ] }"#
)]
fn non_positive_timeouts_are_rejected(#[case] text: &str) {
    let error = Config::from_json_str(text).expect_err("timeout must be rejected");
    assert!(
        matches!(error, ConfigError::InvalidTimeout { .. }),
        "unexpected error: {error}"
    );
}

#[test]
fn zero_byte_limit_is_rejected() {
    let error = Config::from_json_str(r#"{ "max_section_bytes": 0 }"#)
        .expect_err("zero cap must be rejected");
    assert!(matches!(error, ConfigError::InvalidByteLimit));
}

#[test]
fn duplicate_section_ids_are_rejected() {
    let text = r#"{ "sections": [
        { "kind": "file", "id": 7, "path": "/a" },
        { "kind": "file", "id": 7, "path": "/b" }
    ] }"#;
    let error = Config::from_json_str(text).expect_err("duplicates must be rejected");
    assert!(matches!(error, ConfigError::DuplicateSectionId { id: 7 }));
}

#[rstest]
#[case::empty_argv(r#"{ "sections": [ { "kind": "command", "id": 3, "argv": [] } ] }"#)]
#[case::empty_program(r#"{ "sections": [ { "kind": "command", "id": 3, "argv": [""] } ] }"#)]
#[case::empty_service(r#"{ "sections": [ { "kind": "dumpsys", "id": 3, "service": "" } ] }"#)]
#[case::empty_path(r#"{ "sections": [ { "kind": "file", "id": 3, "path": "" } ] }"#)]
fn incomplete_sections_are_rejected(#[case] text: &str) {
    let error = Config::from_json_str(text).expect_err("section must be rejected");
    assert!(
        matches!(error, ConfigError::IncompleteSection { id: 3, .. }),
        "unexpected error: {error}"
    );
}

#[test]
fn unknown_fields_fail_to_parse() {
    let error = Config::from_json_str(r#"{ "timeout": 5 }"#).expect_err("unknown field");
    assert!(matches!(error, ConfigError::Parse { .. }));
}

#[rstest]
#[case("json", LogFormat::Json)]
#[case("COMPACT", LogFormat::Compact)]
fn log_format_parses_case_insensitively(#[case] text: &str, #[case] expected: LogFormat) {
    let parsed: LogFormat = text.parse().expect("parse log format");
    assert_eq!(parsed, expected);
}

#[test]
fn unknown_log_format_is_rejected() {
    assert!("pretty".parse::<LogFormat>().is_err());
}

#[test]
fn log_format_can_be_replaced() {
    let config = Config::from_json_str(r#"{ "log_filter": "debug" }"#)
        .expect("parse config")
        .with_log_format(LogFormat::Compact);
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert_eq!(config.log_filter(), "debug");
}
