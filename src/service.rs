//! Quote and history lookups: provider calls normalised into canonical
//! records and deduplicated through the shared [`ResultCache`].

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use crate::cache::{CacheKey, CacheStats, ResultCache};
use crate::clock::Clock;
use crate::error::FeedError;
use crate::model::{calculate_change, format_price, HistoryPoint, Quote, Symbol};
use crate::provider::{QuoteProvider, RawClose, RawQuote};

pub struct StockService {
    provider: Arc<dyn QuoteProvider>,
    clock: Arc<dyn Clock>,
    quotes: ResultCache<Quote>,
    history: ResultCache<Vec<HistoryPoint>>,
    ttl: Duration,
}

impl StockService {
    pub fn new(provider: Arc<dyn QuoteProvider>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            provider,
            quotes: ResultCache::new(Arc::clone(&clock)),
            history: ResultCache::new(Arc::clone(&clock)),
            clock,
            ttl,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Latest quote, served from cache while fresh.
    pub async fn quote(&self, symbol: &Symbol) -> Result<Quote, FeedError> {
        self.quotes
            .get_or_fetch(&CacheKey::quote(symbol), self.ttl, || self.fetch_quote(symbol))
            .await
    }

    /// Daily closes in ascending date order, served from cache while fresh.
    pub async fn history(&self, symbol: &Symbol) -> Result<Vec<HistoryPoint>, FeedError> {
        self.history
            .get_or_fetch(&CacheKey::history(symbol), self.ttl, || {
                self.fetch_history(symbol)
            })
            .await
    }

    /// One upstream call, no cache.
    pub async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, FeedError> {
        let raw = self.provider.fetch_quote(symbol).await?;
        build_quote(raw, symbol, self.clock.today())
    }

    /// One upstream call, no cache.
    pub async fn fetch_history(&self, symbol: &Symbol) -> Result<Vec<HistoryPoint>, FeedError> {
        let closes = self.provider.fetch_history(symbol).await?;
        Ok(build_history(closes))
    }

    pub async fn cache_stats(&self) -> CacheStats {
        let quotes = self.quotes.stats().await;
        let history = self.history.stats().await;
        CacheStats {
            hits: quotes.hits + history.hits,
            misses: quotes.misses + history.misses,
            entries: quotes.entries + history.entries,
        }
    }
}

/// Missing previous close falls back to the current price (zero change).
/// Prices whose change cannot be represented count as no data.
pub fn build_quote(
    raw: RawQuote,
    requested: &Symbol,
    today: NaiveDate,
) -> Result<Quote, FeedError> {
    let previous = raw.previous_close.unwrap_or(raw.price);
    let change = calculate_change(raw.price, previous)
        .ok_or_else(|| FeedError::not_found(requested.as_str()))?;
    let symbol = raw
        .symbol
        .as_deref()
        .and_then(Symbol::parse)
        .unwrap_or_else(|| requested.clone());

    Ok(Quote {
        symbol: symbol.to_string(),
        price: format_price(raw.price),
        change: change.change,
        percent_change: change.percent_change,
        last_updated: raw.trading_day.unwrap_or(today),
    })
}

/// Upstream order is not trusted; output is sorted by date.
pub fn build_history(mut closes: Vec<RawClose>) -> Vec<HistoryPoint> {
    closes.sort_by_key(|close| close.date);
    closes
        .into_iter()
        .map(|close| HistoryPoint {
            date: close.date,
            price: format_price(close.close),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{scripted_service, ScriptedProvider};
    use rust_decimal::Decimal;

    fn day(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).unwrap()
    }

    #[test]
    fn quote_uses_previous_close() {
        let raw = RawQuote {
            symbol: Some("aapl".into()),
            price: Decimal::from(150),
            previous_close: Some(Decimal::from(145)),
            trading_day: None,
        };
        let quote = build_quote(raw, &symbol("AAPL"), day("2025-08-30")).unwrap();
        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.price, "150.00");
        assert_eq!(quote.change, "5.00");
        assert_eq!(quote.percent_change, "3.45");
        assert_eq!(quote.last_updated, day("2025-08-30"));
    }

    #[test]
    fn missing_previous_close_yields_zero_change() {
        let raw = RawQuote {
            symbol: None,
            price: Decimal::new(12345, 2),
            previous_close: None,
            trading_day: Some(day("2025-08-29")),
        };
        let quote = build_quote(raw, &symbol("msft"), day("2025-08-30")).unwrap();
        assert_eq!(quote.symbol, "MSFT");
        assert_eq!(quote.change, "0.00");
        assert_eq!(quote.percent_change, "0.00");
        assert_eq!(quote.last_updated, day("2025-08-29"));
    }

    #[test]
    fn unrepresentable_change_is_not_found() {
        let raw = RawQuote {
            symbol: Some("HUGE".into()),
            price: Decimal::MAX,
            previous_close: Some(Decimal::NEGATIVE_ONE),
            trading_day: None,
        };
        let err = build_quote(raw, &symbol("HUGE"), day("2025-08-30")).unwrap_err();
        assert_eq!(err, FeedError::not_found("HUGE"));
    }

    #[tokio::test]
    async fn not_found_quote_is_not_cached() {
        let provider = Arc::new(ScriptedProvider::new());
        let (service, _) = scripted_service(Arc::clone(&provider), Duration::from_secs(60));

        for _ in 0..2 {
            let err = service.quote(&symbol("NOPE")).await.unwrap_err();
            assert!(err.is_not_found());
        }

        assert_eq!(provider.quote_calls(), 2);
        assert_eq!(service.cache_stats().await.entries, 0);
    }

    #[tokio::test]
    async fn fresh_quote_is_served_from_cache() {
        let provider = Arc::new(ScriptedProvider::new().with_price("AAPL", 150, 145));
        let (service, clock) = scripted_service(Arc::clone(&provider), Duration::from_secs(60));

        service.quote(&symbol("AAPL")).await.unwrap();
        service.quote(&symbol("AAPL")).await.unwrap();
        assert_eq!(provider.quote_calls(), 1);

        clock.advance(Duration::from_secs(60));
        service.quote(&symbol("AAPL")).await.unwrap();
        assert_eq!(provider.quote_calls(), 2);
    }

    #[test]
    fn history_is_sorted_ascending() {
        let closes = vec![
            RawClose {
                date: day("2025-08-30"),
                close: Decimal::from(150),
            },
            RawClose {
                date: day("2025-08-29"),
                close: Decimal::from(145),
            },
        ];
        let points = build_history(closes);
        let rendered: Vec<_> = points
            .iter()
            .map(|p| (p.date.to_string(), p.price.as_str()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("2025-08-29".to_string(), "145.00"),
                ("2025-08-30".to_string(), "150.00")
            ]
        );
    }
}
