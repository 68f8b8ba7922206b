//! In-memory collaborators for driving the feed without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

pub use crate::clock::ManualClock;
use crate::clock::Clock;
use crate::error::FeedError;
use crate::model::Symbol;
use crate::provider::{QuoteProvider, RawClose, RawQuote};
use crate::service::StockService;

/// Provider answering from per-symbol scripts. Unscripted symbols are
/// `NotFound`. Every call is counted.
#[derive(Default)]
pub struct ScriptedProvider {
    quotes: Mutex<HashMap<Symbol, Result<RawQuote, FeedError>>>,
    history: Mutex<HashMap<Symbol, Result<Vec<RawClose>, FeedError>>>,
    quote_calls: AtomicUsize,
    history_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, symbol: &str, price: i64, previous_close: i64) -> Self {
        self.set_quote(
            symbol,
            Ok(RawQuote {
                symbol: Some(symbol.to_uppercase()),
                price: Decimal::from(price),
                previous_close: Some(Decimal::from(previous_close)),
                trading_day: None,
            }),
        );
        self
    }

    pub fn with_failure(self, symbol: &str, message: &str) -> Self {
        self.set_quote(symbol, Err(FeedError::upstream("scripted", message)));
        self
    }

    pub fn with_history(self, symbol: &str, closes: &[(&str, i64)]) -> Self {
        let closes = closes
            .iter()
            .map(|(date, close)| RawClose {
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("scripted date"),
                close: Decimal::from(*close),
            })
            .collect();
        self.history
            .lock()
            .expect("history script lock")
            .insert(symbol_of(symbol), Ok(closes));
        self
    }

    pub fn set_quote(&self, symbol: &str, response: Result<RawQuote, FeedError>) {
        self.quotes
            .lock()
            .expect("quote script lock")
            .insert(symbol_of(symbol), response);
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

fn symbol_of(raw: &str) -> Symbol {
    Symbol::parse(raw).expect("scripted symbol must not be blank")
}

#[async_trait]
impl QuoteProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<RawQuote, FeedError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.quotes
            .lock()
            .expect("quote script lock")
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| Err(FeedError::not_found(symbol.as_str())))
    }

    async fn fetch_history(&self, symbol: &Symbol) -> Result<Vec<RawClose>, FeedError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.history
            .lock()
            .expect("history script lock")
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| Err(FeedError::not_found(symbol.as_str())))
    }
}

/// Service over a scripted provider and a manual clock set to 2025-08-30.
pub fn scripted_service(
    provider: Arc<ScriptedProvider>,
    ttl: Duration,
) -> (Arc<StockService>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        NaiveDate::from_ymd_opt(2025, 8, 30).expect("valid date"),
    ));
    let service = StockService::new(provider, Arc::clone(&clock) as Arc<dyn Clock>, ttl);
    (Arc::new(service), clock)
}
