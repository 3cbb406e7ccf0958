//! Integration tests for logging initialization
//!
//! The global subscriber can be installed once per process, so everything
//! that depends on it lives in a single test.

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_url, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CollectingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

#[test]
fn test_init_logging_mirrors_into_sink_and_rejects_reinit() {
    let sink = Arc::new(CollectingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_filter("logging_integration=debug")
        .with_logger_sink(sink.clone());

    init_logging(config).unwrap();

    // No runtime here, so the sink is driven inline.
    tracing::debug!(
        url = %redact_url("https://media.example.net/t1.mp3?token=abc"),
        "Cache miss"
    );
    tracing::trace!("filtered out");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Cache miss");
        assert_eq!(
            entries[0].fields.get("url").map(String::as_str),
            Some("https://media.example.net/t1.mp3")
        );
    }

    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::Config(_))));
}
