//! One poll tick: fetch every live symbol and publish the successes.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::json;

use crate::broadcast::BroadcastSink;
use crate::logging;
use crate::model::Symbol;
use crate::service::StockService;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub symbols: usize,
    pub published: usize,
    pub failed: Vec<Symbol>,
}

/// Fetch `symbols` one at a time through the cache. Each success is
/// published immediately; a failure is logged and does not stop the rest.
pub async fn run_tick(
    service: &StockService,
    sink: &BroadcastSink,
    symbols: &BTreeSet<Symbol>,
) -> TickReport {
    let mut report = TickReport {
        symbols: symbols.len(),
        ..TickReport::default()
    };

    for symbol in symbols {
        match service.quote(symbol).await {
            Ok(quote) => {
                sink.publish(quote);
                report.published += 1;
            }
            Err(err) => {
                let event = if err.is_not_found() {
                    "poller.symbol_not_found"
                } else {
                    "poller.symbol_failed"
                };
                logging::warn(
                    event,
                    "Skipping symbol for this tick",
                    json!({ "symbol": symbol.as_str(), "error": err.to_string() }),
                );
                report.failed.push(symbol.clone());
            }
        }
    }

    report
}
