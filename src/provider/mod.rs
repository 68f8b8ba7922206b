//! Upstream quote providers.
//!
//! Each adapter turns its provider's payload shape into [`RawQuote`] /
//! [`RawClose`]. Canonical formatting, fallbacks and ordering happen in
//! [`crate::service`], so nothing outside this module knows provider field
//! names.

pub mod alpha_vantage;
pub mod fmp;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::FeedError;
use crate::logging;
use crate::model::Symbol;

pub use alpha_vantage::AlphaVantageProvider;
pub use fmp::FmpProvider;

/// Latest price as reported upstream, before any policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQuote {
    /// Symbol echoed by the provider, if any.
    pub symbol: Option<String>,
    pub price: Decimal,
    pub previous_close: Option<Decimal>,
    /// Provider-supplied trading day.
    pub trading_day: Option<NaiveDate>,
}

/// A daily close, in whatever order the provider returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawClose {
    pub date: NaiveDate,
    pub close: Decimal,
}

/// Upstream quote source. Every call issues exactly one upstream request.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<RawQuote, FeedError>;

    async fn fetch_history(&self, symbol: &Symbol) -> Result<Vec<RawClose>, FeedError>;
}

/// Build the provider selected by configuration.
pub fn from_config(config: &ProviderConfig) -> Result<Arc<dyn QuoteProvider>> {
    let http = HttpUpstream::new(config.timeout)?;
    let provider: Arc<dyn QuoteProvider> = match config.kind {
        ProviderKind::Fmp => Arc::new(FmpProvider::new(
            http,
            config.base_url.clone(),
            config.api_key.clone(),
        )),
        ProviderKind::AlphaVantage => Arc::new(AlphaVantageProvider::new(
            http,
            config.base_url.clone(),
            config.api_key.clone(),
        )),
    };
    Ok(provider)
}

/// Thin reqwest wrapper with a bounded timeout and uniform error mapping.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build upstream http client")?;
        Ok(Self { client })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        provider: &'static str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FeedError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|err| transport_error(provider, &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::upstream(
                provider,
                format!("upstream returned status {}", status.as_u16()),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| FeedError::upstream(provider, format!("undecodable body: {err}")))
    }
}

fn transport_error(provider: &'static str, err: &reqwest::Error) -> FeedError {
    if err.is_timeout() {
        FeedError::upstream(provider, "request timed out")
    } else {
        FeedError::upstream(provider, format!("transport error: {err}"))
    }
}

/// Reads a price that may arrive as a JSON number or a numeric string.
pub(crate) fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => parse_decimal(&number.to_string()),
        Value::String(text) => parse_decimal(text),
        _ => None,
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Absent, unparseable, zero and negative all mean "no price".
pub(crate) fn usable_price(value: Option<&Value>) -> Option<Decimal> {
    value
        .and_then(decimal_from_value)
        .filter(|price| price.is_sign_positive() && !price.is_zero())
}

pub(crate) fn parse_day(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

/// Builds a close entry, logging and dropping rows that cannot be parsed.
pub(crate) fn close_entry(
    provider: &'static str,
    symbol: &Symbol,
    date: Option<&str>,
    close: Option<&Value>,
) -> Option<RawClose> {
    let parsed = date
        .and_then(parse_day)
        .zip(close.and_then(decimal_from_value));
    if parsed.is_none() {
        logging::warn(
            "provider.history.skip_row",
            "Dropping unparseable history row",
            json!({ "provider": provider, "symbol": symbol.as_str(), "date": date }),
        );
    }
    parsed.map(|(date, close)| RawClose { date, close })
}
