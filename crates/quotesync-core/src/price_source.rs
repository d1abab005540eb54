//! Price source contract and its error type.
//!
//! A [`PriceSource`] turns a ticker and an API key into the latest close
//! price. It performs exactly one upstream request per call and never retries;
//! retry timing belongs to the controller.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::http_client::HttpError;
use crate::Ticker;

/// Fetch failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    RateLimited,
    Provider,
    Decode,
    NoData,
    InvalidPrice,
    Transport,
}

/// Structured price fetch error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("rate limit exceeded for ticker {ticker}")]
    RateLimited { ticker: Ticker },

    #[error("provider request failed with status {status}, body: {body}")]
    Provider { status: u16, body: String },

    #[error("failed to decode provider response: {message}")]
    Decode { message: String },

    #[error("no price data available for ticker {ticker}")]
    NoData { ticker: Ticker },

    #[error("invalid price ({price} <= 0) received for ticker {ticker}")]
    InvalidPrice { ticker: Ticker, price: f64 },

    #[error("transport error: {0}")]
    Transport(#[from] HttpError),
}

impl FetchError {
    pub const fn kind(&self) -> FetchErrorKind {
        match self {
            Self::RateLimited { .. } => FetchErrorKind::RateLimited,
            Self::Provider { .. } => FetchErrorKind::Provider,
            Self::Decode { .. } => FetchErrorKind::Decode,
            Self::NoData { .. } => FetchErrorKind::NoData,
            Self::InvalidPrice { .. } => FetchErrorKind::InvalidPrice,
            Self::Transport(_) => FetchErrorKind::Transport,
        }
    }
}

/// Upstream quote provider contract.
pub trait PriceSource: Send + Sync {
    /// Short provider name used in logs and events.
    fn name(&self) -> &'static str;

    /// Latest close price for `ticker`; always strictly positive on success.
    fn latest_close<'a>(
        &'a self,
        ticker: &'a Ticker,
        api_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<f64, FetchError>> + Send + 'a>>;
}
