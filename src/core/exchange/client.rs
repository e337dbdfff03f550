//! Shared HTTP client for the metadata (Gamma) and order-book (CLOB) APIs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::Client as HttpClient;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::auth::ClobAuth;
use super::dto::{BookDto, MarketDto, TradeDto};
use super::retry::RetryPolicy;
use crate::core::domain::{Book, TokenId};
use crate::error::{Error, Result};

/// Page size used for market pagination.
pub const MARKET_PAGE_LIMIT: usize = 100;

/// Hard safety cap on pagination depth; protects against an upstream that
/// never returns a short page.
pub const MAX_PAGINATION_OFFSET: usize = 10_000;

/// Outbound request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client over both upstream APIs.
///
/// One instance is shared process-wide: it owns the pooled HTTP client, the
/// retry policy, the semaphore bounding concurrent book/trade fetches, and
/// the optional CLOB credentials.
pub struct UpstreamClient {
    http: HttpClient,
    gamma_url: String,
    clob_url: String,
    retry: RetryPolicy,
    fetch_permits: Arc<Semaphore>,
    auth: Option<ClobAuth>,
    rate_limit_hits: AtomicU64,
}

impl UpstreamClient {
    /// Build the shared client.
    ///
    /// `fetch_concurrency` bounds simultaneous order-book and per-token
    /// trade fetches to avoid upstream 429s.
    #[must_use]
    pub fn new(
        gamma_url: impl Into<String>,
        clob_url: impl Into<String>,
        retry: RetryPolicy,
        fetch_concurrency: usize,
        auth: Option<ClobAuth>,
    ) -> Self {
        let http = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });

        Self {
            http,
            gamma_url: gamma_url.into(),
            clob_url: clob_url.into(),
            retry,
            fetch_permits: Arc::new(Semaphore::new(fetch_concurrency.max(1))),
            auth,
            rate_limit_hits: AtomicU64::new(0),
        }
    }

    /// True when CLOB credentials are configured.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }

    /// Number of 429 responses observed since startup.
    #[must_use]
    pub fn rate_limit_hits(&self) -> u64 {
        self.rate_limit_hits.load(Ordering::Relaxed)
    }

    async fn try_get<T>(&self, url: &str, headers: Option<HeaderMap>) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut request = self.http.get(url);
        if let Some(headers) = headers {
            request = request.headers(headers);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
            return Err(Error::RateLimited(format!("429 from {url}")));
        }
        if status.is_server_error() {
            return Err(Error::UpstreamServer {
                status: status.as_u16(),
                message: format!("GET {url}"),
            });
        }
        if status.is_client_error() {
            return Err(Error::UpstreamClient {
                status: status.as_u16(),
                message: format!("GET {url}"),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::Parse(format!("decoding GET {url}: {e}")))
    }

    /// GET with the retry contract: transport errors, 429s, and 5xx retry
    /// with exponential backoff and jitter; other errors fail fast.
    async fn get_json<T>(&self, url: &str, headers: Option<HeaderMap>) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            match self.try_get(url, headers.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts.max(1) || !err.is_retryable() {
                        return Err(err);
                    }
                    let delay = self.retry.delay_for(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Upstream request failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// One page of active, non-closed markets from the metadata API.
    pub async fn markets_page(&self, limit: usize, offset: usize) -> Result<Vec<MarketDto>> {
        let url = format!(
            "{}/markets?limit={limit}&offset={offset}&active=true&closed=false",
            self.gamma_url
        );
        self.get_json(&url, None).await
    }

    /// All active markets, paginating until a short page or the safety cap.
    pub async fn all_markets(&self) -> Result<Vec<MarketDto>> {
        let mut all = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.markets_page(MARKET_PAGE_LIMIT, offset).await?;
            let page_len = page.len();
            all.extend(page);

            if page_len < MARKET_PAGE_LIMIT {
                break;
            }
            offset += MARKET_PAGE_LIMIT;
            if offset > MAX_PAGINATION_OFFSET {
                warn!(offset, "Hit safety cap on market pagination");
                break;
            }
        }

        debug!(count = all.len(), "Fetched markets");
        Ok(all)
    }

    /// Fetch one token's order book under the shared fetch semaphore.
    pub async fn order_book(&self, token_id: &TokenId) -> Result<Book> {
        let _permit = self
            .fetch_permits
            .acquire()
            .await
            .map_err(|_| Error::Transport("fetch semaphore closed".into()))?;
        let url = format!("{}/book?token_id={token_id}", self.clob_url);
        let dto: BookDto = self.get_json(&url, None).await?;
        Ok(dto.into_book(token_id.clone()))
    }

    /// One page of the public recent-trades feed.
    pub async fn recent_trades(&self, limit: usize, offset: usize) -> Result<Vec<TradeDto>> {
        let url = if offset == 0 {
            format!("{}/trades?limit={limit}", self.clob_url)
        } else {
            format!("{}/trades?limit={limit}&offset={offset}", self.clob_url)
        };
        self.get_json(&url, None).await
    }

    /// Trades for one token via the authenticated endpoint, under the shared
    /// fetch semaphore.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when no credentials are configured.
    pub async fn trades_for_token(&self, token_id: &TokenId, limit: usize) -> Result<Vec<TradeDto>> {
        let auth = self
            .auth
            .as_ref()
            .ok_or_else(|| Error::Config("CLOB credentials not configured".into()))?;

        let _permit = self
            .fetch_permits
            .acquire()
            .await
            .map_err(|_| Error::Transport("fetch semaphore closed".into()))?;

        let headers = auth.headers(Utc::now().timestamp(), "GET", "/trades")?;
        let url = format!("{}/trades?token_id={token_id}&limit={limit}", self.clob_url);
        self.get_json(&url, Some(headers)).await
    }
}
