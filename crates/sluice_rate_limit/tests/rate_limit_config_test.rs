//! Tests for TOML configuration loading.

use sluice_error::SluiceErrorKind;
use sluice_rate_limit::{RetryOverride, SluiceConfig};
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_bundled_defaults() {
    let config = SluiceConfig::load().unwrap();

    assert!(config.resources.contains_key("llm"));
    assert!(config.resources.contains_key("embeddings"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_from_file_reads_resources() {
    let file = write_config(
        r#"
[broker]
max_queue_size = 50
shutdown_timeout_ms = 5000

[resources.llm]
requests_per_window = 10
window_ms = 60000
cost_per_window = 20000
max_concurrent = 3
"#,
    );

    let config = SluiceConfig::from_file(file.path()).unwrap();
    assert_eq!(config.broker.max_queue_size, 50);
    assert_eq!(config.broker.shutdown_timeout_ms, 5_000);

    let llm = config.resource("llm").unwrap();
    assert_eq!(llm.rate_limits().requests_per_window, 10);
    assert_eq!(llm.rate_limits().cost_per_window, Some(20_000));
    assert_eq!(*llm.max_concurrent(), 3);
    assert_eq!(*llm.max_queue_size(), 50);
    assert_eq!(llm.retry().max_retries, 3);
}

#[test]
fn test_missing_sections_use_defaults() {
    let file = write_config(
        r#"
[resources.vectors]
requests_per_window = 5
window_ms = 1000
"#,
    );

    let config = SluiceConfig::from_file(file.path()).unwrap();
    let vectors = config.resource("vectors").unwrap();
    assert_eq!(*vectors.max_concurrent(), 1);
    assert_eq!(*vectors.max_queue_size(), 1_000);
    assert_eq!(vectors.rate_limits().cost_per_window, None);
    assert!(config.resource("llm").is_none());
}

#[test]
fn test_retry_override_merges_with_default() {
    let file = write_config(
        r#"
[retry]
max_retries = 2
base_delay_ms = 500

[resources.llm]
requests_per_window = 10
window_ms = 60000

[resources.llm.retry]
max_retries = 6
"#,
    );

    let config = SluiceConfig::from_file(file.path()).unwrap();
    let retry = *config.resource("llm").unwrap().retry();
    assert_eq!(retry.max_retries, 6);
    assert_eq!(retry.base_delay_ms, 500);
    assert_eq!(retry.max_delay_ms, 30_000);
}

#[test]
fn test_retry_override_apply() {
    let base = sluice_core::RetryConfig::default();
    let merged = RetryOverride {
        jitter_ratio: Some(0.0),
        ..Default::default()
    }
    .apply(base);
    assert_eq!(merged.jitter_ratio, 0.0);
    assert_eq!(merged.max_retries, base.max_retries);
}

#[test]
fn test_validate_rejects_zero_window() {
    let file = write_config(
        r#"
[resources.llm]
requests_per_window = 10
window_ms = 0
"#,
    );

    let config = SluiceConfig::from_file(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    match err.kind() {
        SluiceErrorKind::Config(e) => assert!(e.message.contains("resources.llm")),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_from_file_missing_is_error() {
    let result = SluiceConfig::from_file("/nonexistent/sluice.toml");
    assert!(matches!(result.unwrap_err().kind(), SluiceErrorKind::Config(_)));
}
