//! Tests for logging configuration and format parsing
//!
//! Tests the pure functions in the logging module that turn environment
//! values into a log format and level.

use a2a_analyzer::observability::logging::{parse_level, LogFormat};
use tracing::Level;

#[test]
fn test_log_format_parse_is_case_insensitive() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
    assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("COMPACT"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_invalid_defaults_to_compact() {
    assert_eq!(LogFormat::parse(""), LogFormat::Compact);
    assert_eq!(LogFormat::parse("xml"), LogFormat::Compact);
    assert_eq!(LogFormat::parse("123"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_whitespace() {
    assert_eq!(LogFormat::parse("  json  "), LogFormat::Json);
    assert_eq!(LogFormat::parse("pretty\n"), LogFormat::Pretty);
}

#[test]
fn test_parse_level() {
    assert_eq!(parse_level("error"), Level::ERROR);
    assert_eq!(parse_level("WARN"), Level::WARN);
    assert_eq!(parse_level("Debug"), Level::DEBUG);
    assert_eq!(parse_level(" trace "), Level::TRACE);
    assert_eq!(parse_level("verbose"), Level::INFO);
    assert_eq!(parse_level(""), Level::INFO);
}
