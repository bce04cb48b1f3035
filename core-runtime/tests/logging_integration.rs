//! Integration tests for logging system

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, redact_url_credentials, LogFormat, LoggingConfig,
};
use core_runtime::Error;
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mock! {
    pub Sink {}

    #[async_trait]
    impl LoggerSink for Sink {
        async fn log(&self, entry: LogEntry) -> BridgeResult<()>;
        fn min_level(&self) -> LogLevel;
    }
}

#[test]
fn test_global_init_forwards_to_sink_once_installed() {
    let forwarded = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&forwarded);

    let mut sink = MockSink::new();
    sink.expect_min_level().return_const(LogLevel::Info);
    sink.expect_log().returning(move |entry| {
        if entry.message == "catalog sync scheduled" {
            assert_eq!(entry.fields.get("password"), Some(&"[REDACTED]".to_string()));
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    });

    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Info)
        .with_logger_sink(Arc::new(sink));

    init_logging(config).expect("first initialization succeeds");

    tracing::info!(
        target: "core_sync::coordinator",
        source_id = "xtream-main",
        password = "hunter2",
        "catalog sync scheduled"
    );
    assert_eq!(forwarded.load(Ordering::SeqCst), 1);

    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::Logging(_))));
}

#[test]
fn test_secret_fields_are_redacted() {
    assert_eq!(redact_if_sensitive("password", "p4ss"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("session_token", "abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("API_KEY", "k"), "[REDACTED]");
}

#[test]
fn test_normal_values_pass_through() {
    assert_eq!(redact_if_sensitive("source_id", "xtream-main"), "xtream-main");
    assert_eq!(redact_if_sensitive("phase", "episodes"), "episodes");
    assert_eq!(redact_if_sensitive("batch_seq", "12"), "12");
}

#[test]
fn test_listing_api_url_is_redacted() {
    let url = "http://tv.example:8080/player_api.php?username=bob&password=hunter2&action=get_series";
    let redacted = redact_url_credentials(url);

    assert!(!redacted.contains("bob"));
    assert!(!redacted.contains("hunter2"));
    assert!(redacted.contains("action=get_series"));
    assert!(redacted.starts_with("http://tv.example:8080/player_api.php?"));
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_secret_redaction(false)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_secrets);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
