//! One JSON object per line. Errors go to stderr, everything else to stdout.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde_json::Value;

use crate::constants::SERVICE_NAME;

static SILENT: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Serialize)]
struct LogLine<'a> {
    level: Level,
    service: &'static str,
    event: &'a str,
    message: &'a str,
    timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

/// Suppress all log output (benches and chatty tests).
pub fn set_silent(silent: bool) {
    SILENT.store(silent, Ordering::Relaxed);
}

fn render(level: Level, event: &str, message: &str, metadata: Option<Value>) -> String {
    let line = LogLine {
        level,
        service: SERVICE_NAME,
        event,
        message,
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
        metadata,
    };
    serde_json::to_string(&line).unwrap_or_else(|err| {
        format!(
            "{{\"level\":\"error\",\"event\":\"logging.serialize_failed\",\"message\":\"{err}\"}}"
        )
    })
}

fn emit(level: Level, event: &str, message: &str, metadata: Option<Value>) {
    if SILENT.load(Ordering::Relaxed) {
        return;
    }

    let payload = render(level, event, message, metadata);
    match level {
        Level::Error => eprintln!("{payload}"),
        Level::Info | Level::Warn => println!("{payload}"),
    }
}

pub fn info(event: &str, message: &str, metadata: Value) {
    emit(Level::Info, event, message, Some(metadata));
}

pub fn warn(event: &str, message: &str, metadata: Value) {
    emit(Level::Warn, event, message, Some(metadata));
}

pub fn error(event: &str, message: &str, metadata: Value) {
    emit(Level::Error, event, message, Some(metadata));
}

pub fn info_simple(event: &str, message: &str) {
    emit(Level::Info, event, message, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn line_carries_level_service_and_metadata() {
        let line = render(
            Level::Warn,
            "poller.symbol_failed",
            "Skipping symbol for this tick",
            Some(json!({ "symbol": "AAPL" })),
        );
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["level"], "warn");
        assert_eq!(parsed["service"], SERVICE_NAME);
        assert_eq!(parsed["event"], "poller.symbol_failed");
        assert_eq!(parsed["metadata"]["symbol"], "AAPL");
    }

    #[test]
    fn metadata_is_omitted_when_absent() {
        let parsed: Value =
            serde_json::from_str(&render(Level::Info, "server.stop", "Server stopped", None))
                .unwrap();
        assert!(parsed.get("metadata").is_none());
        assert!(parsed["timestamp_ms"].as_i64().unwrap() > 0);
    }
}
