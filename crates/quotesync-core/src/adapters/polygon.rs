use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::price_source::{FetchError, PriceSource};
use crate::Ticker;

pub const DEFAULT_POLYGON_BASE_URL: &str = "https://api.polygon.io";

const TOO_MANY_REQUESTS: u16 = 429;
const OK: u16 = 200;
const MAX_DIAGNOSTIC_BODY_CHARS: usize = 512;

/// Previous-day aggregate lookup against the Polygon.io REST API.
#[derive(Clone)]
pub struct PolygonPriceSource {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout: Duration,
}

impl Default for PolygonPriceSource {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::default()), DEFAULT_POLYGON_BASE_URL)
    }
}

impl PolygonPriceSource {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            http_client,
            base_url,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn previous_close_url(&self, ticker: &Ticker, api_key: &str) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/prev?adjusted=true&apiKey={}",
            self.base_url,
            ticker.as_str(),
            urlencoding::encode(api_key)
        )
    }

    async fn fetch_previous_close(&self, ticker: &Ticker, api_key: &str) -> Result<f64, FetchError> {
        let request =
            HttpRequest::get(self.previous_close_url(ticker, api_key)).with_timeout(self.timeout);

        let response = self.http_client.execute(request).await?;
        tracing::debug!(ticker = %ticker, status = response.status, "polygon responded");

        if response.status == TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                ticker: ticker.clone(),
            });
        }

        if response.status != OK {
            return Err(FetchError::Provider {
                status: response.status,
                body: truncate_body(&response.body),
            });
        }

        let payload: PolygonPrevResponse =
            serde_json::from_str(&response.body).map_err(|e| FetchError::Decode {
                message: e.to_string(),
            })?;

        let first = payload
            .results
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::NoData {
                ticker: ticker.clone(),
            })?;

        if first.close.is_nan() || first.close <= 0.0 {
            return Err(FetchError::InvalidPrice {
                ticker: ticker.clone(),
                price: first.close,
            });
        }

        Ok(first.close)
    }
}

impl PriceSource for PolygonPriceSource {
    fn name(&self) -> &'static str {
        "polygon"
    }

    fn latest_close<'a>(
        &'a self,
        ticker: &'a Ticker,
        api_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<f64, FetchError>> + Send + 'a>> {
        Box::pin(self.fetch_previous_close(ticker, api_key))
    }
}

// Polygon previous-close response; only the close price is consumed.
#[derive(Debug, Clone, Deserialize)]
struct PolygonPrevResponse {
    #[serde(default)]
    results: Option<Vec<PolygonAggregate>>,
}

#[derive(Debug, Clone, Deserialize)]
struct PolygonAggregate {
    #[serde(rename = "c", default)]
    close: f64,
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_DIAGNOSTIC_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_owned(),
    }
}
