use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use urlencoding::encode;

use crate::domain::models::Quote;
use crate::error::QuoteError;

pub const DEFAULT_QUOTE_API_BASE: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const QUOTE_MODULES: &str = "price,summaryDetail";

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Fetches the current quote for one symbol. Missing optional upstream
    /// fields are defaulted, never reported as errors.
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, QuoteError>;
}

// quoteSummary response shape, restricted to the fields we read.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummary,
}

#[derive(Deserialize, Debug)]
struct QuoteSummary {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    price: Option<PriceModule>,
    summary_detail: Option<SummaryDetailModule>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    regular_market_price: Option<RawValue>,
    exchange: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct SummaryDetailModule {
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<RawValue>,
}

// Yahoo wraps numbers as {"raw": 1.0, "fmt": "1.00"}, or {} when absent.
#[derive(Deserialize, Debug, Default)]
struct RawValue {
    raw: Option<f64>,
}

#[derive(Debug, Clone)]
struct CrumbData {
    cookie: String,
    crumb: String,
}

pub struct YahooQuoteProvider {
    client: Client,
    base_url: String,
    cookie_url: String,
    timeout: Duration,
    crumb: Mutex<Option<CrumbData>>,
}

impl YahooQuoteProvider {
    pub fn new(timeout: Duration) -> Result<Self, QuoteError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| QuoteError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: DEFAULT_QUOTE_API_BASE.to_string(),
            cookie_url: DEFAULT_COOKIE_URL.to_string(),
            timeout,
            crumb: Mutex::new(None),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_cookie_url(mut self, cookie_url: impl Into<String>) -> Self {
        self.cookie_url = cookie_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_error(&self, e: reqwest::Error) -> QuoteError {
        if e.is_timeout() {
            QuoteError::Timeout(self.timeout)
        } else if e.is_decode() {
            QuoteError::Malformed(e.to_string())
        } else {
            QuoteError::Transport(e.to_string())
        }
    }

    // Held across the handshake: concurrent fetches wait on a single exchange.
    async fn crumb(&self) -> Result<CrumbData, QuoteError> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }
        let fresh = self.fetch_crumb().await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    async fn clear_crumb(&self) {
        *self.crumb.lock().await = None;
    }

    async fn fetch_crumb(&self) -> Result<CrumbData, QuoteError> {
        let response = self
            .client
            .get(&self.cookie_url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.split_once(';').map(|(v, _)| v).unwrap_or(s).to_string())
            .ok_or_else(|| QuoteError::Auth("no session cookie issued".to_string()))?;

        let response = self
            .client
            .get(format!("{}/v1/test/getcrumb", self.base_url))
            .header(header::COOKIE, &cookie)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        if !response.status().is_success() {
            return Err(QuoteError::Auth(format!(
                "crumb request returned HTTP {}",
                response.status().as_u16()
            )));
        }
        let crumb = response
            .text()
            .await
            .map_err(|e| self.request_error(e))?
            .trim()
            .to_string();
        if crumb.is_empty() {
            return Err(QuoteError::Auth("empty crumb".to_string()));
        }
        debug!("obtained quote API crumb");
        Ok(CrumbData { cookie, crumb })
    }
}

#[async_trait]
impl QuoteProvider for YahooQuoteProvider {
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, QuoteError> {
        let crumb = self.crumb().await?;
        let url = format!("{}/v10/finance/quoteSummary/{}", self.base_url, encode(symbol));

        let response = self
            .client
            .get(&url)
            .header(header::COOKIE, &crumb.cookie)
            .query(&[("modules", QUOTE_MODULES), ("crumb", crumb.crumb.as_str())])
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                // next fetch performs a fresh handshake
                self.clear_crumb().await;
                return Err(QuoteError::Auth(format!(
                    "HTTP {}",
                    response.status().as_u16()
                )));
            }
            StatusCode::NOT_FOUND => return Err(QuoteError::SymbolNotFound),
            s if !s.is_success() => return Err(QuoteError::Status(s.as_u16())),
            _ => {}
        }

        let parsed: QuoteSummaryResponse = response
            .json()
            .await
            .map_err(|e| QuoteError::Malformed(e.to_string()))?;
        let result = parsed
            .quote_summary
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or(QuoteError::SymbolNotFound)?;
        quote_from_result(result)
    }
}

fn decimal_from_raw(value: Option<&RawValue>) -> Option<Decimal> {
    value.and_then(|v| v.raw).and_then(Decimal::from_f64)
}

/// Applies the default-substitution rules: price 0, exchange and P/E "N/A".
fn quote_from_result(result: QuoteSummaryResult) -> Result<Quote, QuoteError> {
    let price = result.price.unwrap_or_default();

    let current_price = match price.regular_market_price.as_ref().and_then(|v| v.raw) {
        None => Decimal::ZERO,
        Some(raw) => Decimal::from_f64(raw)
            .filter(|p| !p.is_sign_negative())
            .ok_or_else(|| QuoteError::Malformed(format!("invalid price {}", raw)))?,
    };

    let mut quote = Quote::new(current_price);
    if let Some(exchange) = price.exchange.filter(|e| !e.trim().is_empty()) {
        quote = quote.with_exchange(exchange);
    }
    let trailing_pe = result
        .summary_detail
        .as_ref()
        .and_then(|d| d.trailing_pe.as_ref());
    if let Some(pe_ratio) = decimal_from_raw(trailing_pe) {
        quote = quote.with_pe_ratio(pe_ratio);
    }
    Ok(quote)
}

#[cfg(test)]
pub use mock::MockQuoteProvider;
