//! Error kinds surfaced by quote and history lookups.
//!
//! Both kinds are contained: request handlers turn them into 404/500
//! responses and the poller logs them and moves on to the next symbol.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The upstream has no usable price or series for the symbol.
    #[error("no data available for {symbol}")]
    NotFound { symbol: String },

    /// Transport failure, non-2xx status, timeout or an undecodable body.
    #[error("upstream {provider} failed: {message}")]
    Upstream { provider: String, message: String },
}

impl FeedError {
    pub fn not_found(symbol: impl Into<String>) -> Self {
        FeedError::NotFound {
            symbol: symbol.into(),
        }
    }

    pub fn upstream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        FeedError::Upstream {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FeedError::NotFound { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            FeedError::NotFound { .. } => StatusCode::NOT_FOUND,
            FeedError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
