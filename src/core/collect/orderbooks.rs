//! Order-book collection: fan out over every tracked (token, market) pair.

use std::sync::Arc;

use diesel::Connection;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{info, warn};

use crate::core::domain::{MarketId, TokenId};
use crate::core::exchange::UpstreamClient;
use crate::core::store::{markets as market_store, orderbooks as book_store, Store};
use crate::error::{Error, Result};

/// Collects a snapshot plus the latest-raw ladder for every tracked token.
pub struct OrderBookCollector {
    client: Arc<UpstreamClient>,
    store: Store,
}

impl OrderBookCollector {
    #[must_use]
    pub fn new(client: Arc<UpstreamClient>, store: Store) -> Self {
        Self { client, store }
    }

    /// The (token, market) pairs currently eligible for collection.
    fn tracked_pairs(&self) -> Result<Vec<(TokenId, MarketId)>> {
        let mut conn = self.store.conn()?;
        let markets = market_store::active_with_order_book(&mut conn)?;
        Ok(markets
            .iter()
            .flat_map(|m| {
                m.token_ids()
                    .into_iter()
                    .map(|t| (TokenId::new(t), m.id.clone()))
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    /// Fetch every tracked book and persist snapshot + latest raw.
    ///
    /// Fetches run concurrently, bounded by the client's fetch semaphore.
    /// Per-token failures are logged and skipped; the pass reports how many
    /// snapshots landed.
    pub async fn run(&self) -> Result<usize> {
        let pairs = self.tracked_pairs()?;
        if pairs.is_empty() {
            info!("No order-book-enabled markets to collect");
            return Ok(0);
        }

        let tasks = pairs.into_iter().map(|(token, market)| {
            let client = Arc::clone(&self.client);
            let store = self.store.clone();
            async move {
                let result = Self::collect_one(&client, &store, &token, &market).await;
                (token, result)
            }
        });

        let mut count = 0;
        for (token, result) in join_all(tasks).await {
            match result {
                Ok(()) => count += 1,
                Err(err) => warn!(token = %token, error = %err, "Order book fetch failed"),
            }
        }

        info!(collected = count, "Order book collection complete");
        Ok(count)
    }

    async fn collect_one(
        client: &UpstreamClient,
        store: &Store,
        token: &TokenId,
        market: &MarketId,
    ) -> std::result::Result<(), Error> {
        let book = client.order_book(token).await?;
        let now = Utc::now().naive_utc();
        let metrics = book.metrics();

        let snapshot = book_store::snapshot_row(token.as_str(), Some(market.as_str()), now, &metrics);
        let raw = book_store::latest_raw_row(&book, Some(market.as_str()), now)?;

        let mut conn = store.conn()?;
        conn.transaction(|conn| {
            book_store::insert_snapshot(conn, &snapshot)?;
            book_store::upsert_latest_raw(conn, &raw)
        })
    }
}
