use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use super::{close_entry, usable_price, HttpUpstream, QuoteProvider, RawClose, RawQuote};
use crate::error::FeedError;
use crate::model::Symbol;

const PROVIDER: &str = "fmp";

/// Financial Modeling Prep: `/quote/{symbol}` and `/historical-price-full/{symbol}`.
#[derive(Debug, Clone)]
pub struct FmpProvider {
    http: HttpUpstream,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct QuoteRow {
    symbol: Option<String>,
    price: Option<Value>,
    #[serde(rename = "previousClose")]
    previous_close: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    historical: Option<Vec<HistoryRow>>,
}

#[derive(Debug, Deserialize)]
struct HistoryRow {
    date: Option<Value>,
    close: Option<Value>,
}

impl FmpProvider {
    pub fn new(http: HttpUpstream, base_url: String, api_key: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// `{base}/{resource}/{symbol}` with the symbol as one encoded path segment.
    fn endpoint(&self, resource: &str, symbol: &Symbol) -> Result<Url, FeedError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| FeedError::upstream(PROVIDER, format!("invalid base url: {err}")))?;
        url.path_segments_mut()
            .map_err(|()| FeedError::upstream(PROVIDER, "base url cannot take a path"))?
            .pop_if_empty()
            .extend([resource, symbol.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl QuoteProvider for FmpProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<RawQuote, FeedError> {
        let url = self.endpoint("quote", symbol)?;
        let rows: Vec<QuoteRow> = self
            .http
            .get_json(PROVIDER, url.as_str(), &[("apikey", self.api_key.as_str())])
            .await?;

        normalize_quote(rows).ok_or_else(|| FeedError::not_found(symbol.as_str()))
    }

    async fn fetch_history(&self, symbol: &Symbol) -> Result<Vec<RawClose>, FeedError> {
        let url = self.endpoint("historical-price-full", symbol)?;
        let response: HistoryResponse = self
            .http
            .get_json(PROVIDER, url.as_str(), &[("apikey", self.api_key.as_str())])
            .await?;

        let rows = response
            .historical
            .ok_or_else(|| FeedError::not_found(symbol.as_str()))?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let date = row.date.as_ref().and_then(Value::as_str);
                close_entry(PROVIDER, symbol, date, row.close.as_ref())
            })
            .collect())
    }
}

fn normalize_quote(rows: Vec<QuoteRow>) -> Option<RawQuote> {
    let row = rows.into_iter().next()?;
    let price = usable_price(row.price.as_ref())?;
    Some(RawQuote {
        symbol: row.symbol,
        price,
        previous_close: usable_price(row.previous_close.as_ref()),
        trading_day: None,
    })
}
