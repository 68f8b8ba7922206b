use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{close_entry, parse_day, usable_price, HttpUpstream, QuoteProvider, RawClose, RawQuote};
use crate::error::FeedError;
use crate::model::Symbol;

const PROVIDER: &str = "alpha_vantage";

/// Alpha Vantage: `GLOBAL_QUOTE` and `TIME_SERIES_DAILY` (compact, ~100 days).
#[derive(Debug, Clone)]
pub struct AlphaVantageProvider {
    http: HttpUpstream,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<Value>,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: Option<String>,
    #[serde(rename = "08. previous close")]
    previous_close: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<HashMap<String, DailyBar>>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "4. close")]
    close: Option<Value>,
}

impl AlphaVantageProvider {
    pub fn new(http: HttpUpstream, base_url: String, api_key: String) -> Self {
        Self {
            http,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl QuoteProvider for AlphaVantageProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<RawQuote, FeedError> {
        let response: GlobalQuoteResponse = self
            .http
            .get_json(
                PROVIDER,
                &self.base_url,
                &[
                    ("function", "GLOBAL_QUOTE"),
                    ("symbol", symbol.as_str()),
                    ("apikey", self.api_key.as_str()),
                ],
            )
            .await?;

        response
            .global_quote
            .and_then(normalize_quote)
            .ok_or_else(|| FeedError::not_found(symbol.as_str()))
    }

    async fn fetch_history(&self, symbol: &Symbol) -> Result<Vec<RawClose>, FeedError> {
        let response: TimeSeriesResponse = self
            .http
            .get_json(
                PROVIDER,
                &self.base_url,
                &[
                    ("function", "TIME_SERIES_DAILY"),
                    ("symbol", symbol.as_str()),
                    ("outputsize", "compact"),
                    ("apikey", self.api_key.as_str()),
                ],
            )
            .await?;

        let series = response
            .time_series
            .ok_or_else(|| FeedError::not_found(symbol.as_str()))?;
        Ok(series
            .iter()
            .filter_map(|(date, bar)| {
                close_entry(PROVIDER, symbol, Some(date.as_str()), bar.close.as_ref())
            })
            .collect())
    }
}

fn normalize_quote(quote: GlobalQuote) -> Option<RawQuote> {
    let price = usable_price(quote.price.as_ref())?;
    Some(RawQuote {
        symbol: quote.symbol,
        price,
        previous_close: usable_price(quote.previous_close.as_ref()),
        trading_day: quote.latest_trading_day.as_deref().and_then(parse_day),
    })
}
