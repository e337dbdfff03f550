//! Trade collection: one paginated sweep of the public recent-trades feed,
//! filtered locally against the tracked token set.
//!
//! Per-token probes would cost O(tokens) requests every cycle; the sweep
//! costs at most [`MAX_TRADE_PAGES`]. The authenticated per-token endpoint
//! remains as a bounded fallback for when the public feed returns nothing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::core::db::model::NewTradeRow;
use crate::core::domain::{Trade, TokenId};
use crate::core::exchange::dto::TradeDto;
use crate::core::exchange::UpstreamClient;
use crate::core::store::{markets as market_store, trades as trade_store, Store};
use crate::error::Result;

/// Page size for the public trades sweep.
pub const TRADE_PAGE_LIMIT: usize = 500;

/// Maximum pages per sweep.
pub const MAX_TRADE_PAGES: usize = 5;

/// Result of one collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub new_trades: usize,
    pub duplicates: usize,
}

/// Locally-filtered candidate set from one sweep.
#[derive(Debug, Default)]
pub struct FilteredTrades {
    pub trades: Vec<Trade>,
    /// In-memory duplicates by effective id.
    pub duplicates: usize,
    /// Records failing the validity predicate.
    pub invalid: usize,
    /// Records for tokens outside the tracked set or the lookback window.
    pub skipped: usize,
}

/// Filter sweep records down to valid, in-window trades on tracked tokens,
/// deduplicating by effective id within the batch.
#[must_use]
pub fn filter_trades(
    dtos: Vec<TradeDto>,
    token_to_market: &HashMap<String, String>,
    now: NaiveDateTime,
    lookback: Duration,
) -> FilteredTrades {
    let cutoff = now - lookback;
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = FilteredTrades::default();

    for dto in dtos {
        let Some(token) = dto.token_id() else {
            out.skipped += 1;
            continue;
        };
        let Some(market_id) = token_to_market.get(token) else {
            out.skipped += 1;
            continue;
        };
        let Some(trade) = dto.into_trade(Some(market_id.as_str())) else {
            out.skipped += 1;
            continue;
        };
        match trade.timestamp {
            Some(ts) if ts >= cutoff => {}
            _ => {
                out.skipped += 1;
                continue;
            }
        }
        if !trade.is_valid(now) {
            out.invalid += 1;
            continue;
        }
        if !seen.insert(trade.effective_id()) {
            out.duplicates += 1;
            continue;
        }
        out.trades.push(trade);
    }
    out
}

/// Collects recent trades for all tracked tokens.
pub struct TradeCollector {
    client: Arc<UpstreamClient>,
    store: Store,
    lookback: Duration,
}

impl TradeCollector {
    #[must_use]
    pub fn new(client: Arc<UpstreamClient>, store: Store) -> Self {
        Self {
            client,
            store,
            lookback: Duration::hours(1),
        }
    }

    #[must_use]
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    /// One collection pass. Returns (new, duplicate) counts.
    pub async fn run(&self) -> Result<SweepOutcome> {
        let token_to_market = self.tracked_tokens()?;
        if token_to_market.is_empty() {
            info!("No tracked tokens for trade collection");
            return Ok(SweepOutcome {
                new_trades: 0,
                duplicates: 0,
            });
        }

        let mut dtos = self.sweep_public_feed().await?;
        if dtos.is_empty() && self.client.is_authenticated() {
            debug!("Public trade sweep returned nothing, trying per-token fallback");
            dtos = self.per_token_fallback(&token_to_market).await;
        }

        let now = Utc::now().naive_utc();
        let filtered = filter_trades(dtos, &token_to_market, now, self.lookback);
        if filtered.invalid > 0 || filtered.skipped > 0 {
            debug!(
                invalid = filtered.invalid,
                skipped = filtered.skipped,
                "Dropped sweep records"
            );
        }

        let mut duplicates = filtered.duplicates;

        // Pre-check which ids the store already has in one query, so the
        // common all-duplicates case does no insert work at all.
        let mut conn = self.store.conn()?;
        let ids: Vec<String> = filtered.trades.iter().map(Trade::effective_id).collect();
        let existing = trade_store::existing_ids(&mut conn, &ids)?;

        let mut rows: Vec<NewTradeRow> = Vec::new();
        for trade in &filtered.trades {
            if existing.contains(&trade.effective_id()) {
                duplicates += 1;
            } else {
                rows.push(trade_store::to_row(trade)?);
            }
        }

        let new_trades = match trade_store::insert_ignore_bulk(&mut conn, &rows) {
            Ok(inserted) => {
                // Conflict-ignored rows lost a race with another writer.
                duplicates += rows.len() - inserted;
                inserted
            }
            Err(err) => {
                warn!(error = %err, "Bulk trade insert failed, falling back to per-row path");
                let inserted = trade_store::insert_each(&mut conn, &rows);
                duplicates += rows.len() - inserted;
                inserted
            }
        };

        info!(new_trades, duplicates, "Trade collection complete");
        Ok(SweepOutcome {
            new_trades,
            duplicates,
        })
    }

    fn tracked_tokens(&self) -> Result<HashMap<String, String>> {
        let mut conn = self.store.conn()?;
        let markets = market_store::active_with_order_book(&mut conn)?;
        let mut map = HashMap::new();
        for market in &markets {
            for token in market.token_ids() {
                map.insert(token.to_string(), market.id.to_string());
            }
        }
        Ok(map)
    }

    /// Paginate the public feed by offset, up to the page cap or until a
    /// short page.
    async fn sweep_public_feed(&self) -> Result<Vec<TradeDto>> {
        let mut all = Vec::new();
        for page_index in 0..MAX_TRADE_PAGES {
            let offset = page_index * TRADE_PAGE_LIMIT;
            let page = match self.client.recent_trades(TRADE_PAGE_LIMIT, offset).await {
                Ok(page) => page,
                Err(err) if !all.is_empty() => {
                    // Keep what earlier pages already returned.
                    warn!(error = %err, offset, "Trade page fetch failed mid-sweep");
                    break;
                }
                Err(err) => return Err(err),
            };
            let short = page.len() < TRADE_PAGE_LIMIT;
            all.extend(page);
            if short {
                break;
            }
        }
        Ok(all)
    }

    /// Bounded per-token sweep over the authenticated endpoint; concurrency
    /// is limited by the client's fetch semaphore. Failures are logged and
    /// the remaining tokens still contribute.
    async fn per_token_fallback(&self, token_to_market: &HashMap<String, String>) -> Vec<TradeDto> {
        let tasks = token_to_market.keys().map(|token| {
            let client = Arc::clone(&self.client);
            let token = TokenId::new(token.clone());
            async move {
                let result = client.trades_for_token(&token, 100).await;
                (token, result)
            }
        });

        let mut dtos = Vec::new();
        for (token, result) in join_all(tasks).await {
            match result {
                Ok(page) => dtos.extend(page),
                Err(err) => warn!(token = %token, error = %err, "Per-token trade fetch failed"),
            }
        }
        dtos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dto(id: Option<&str>, token: &str, price: f64, mins_ago: i64) -> TradeDto {
        let ts = (Utc::now() - Duration::minutes(mins_ago)).timestamp();
        serde_json::from_value(json!({
            "id": id,
            "asset": token,
            "price": price.to_string(),
            "size": "50",
            "side": "BUY",
            "timestamp": ts,
        }))
        .unwrap()
    }

    fn tracked() -> HashMap<String, String> {
        HashMap::from([("tok-a-00000001".to_string(), "m1".to_string())])
    }

    #[test]
    fn untracked_tokens_are_skipped() {
        let now = Utc::now().naive_utc();
        let dtos = vec![
            dto(Some("t1"), "tok-a-00000001", 0.5, 5),
            dto(Some("t2"), "tok-unknown-01", 0.5, 5),
        ];
        let out = filter_trades(dtos, &tracked(), now, Duration::hours(1));
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.skipped, 1);
        assert_eq!(out.trades[0].market_id.as_deref(), Some("m1"));
    }

    #[test]
    fn stale_trades_fall_outside_lookback() {
        let now = Utc::now().naive_utc();
        let dtos = vec![
            dto(Some("t1"), "tok-a-00000001", 0.5, 5),
            dto(Some("t2"), "tok-a-00000001", 0.5, 90),
        ];
        let out = filter_trades(dtos, &tracked(), now, Duration::hours(1));
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.skipped, 1);
    }

    #[test]
    fn invalid_prices_are_counted_not_fatal() {
        let now = Utc::now().naive_utc();
        let dtos = vec![
            dto(Some("t1"), "tok-a-00000001", 1.5, 5),
            dto(Some("t2"), "tok-a-00000001", 0.5, 5),
        ];
        let out = filter_trades(dtos, &tracked(), now, Duration::hours(1));
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.invalid, 1);
    }

    #[test]
    fn batch_duplicates_collapse_by_effective_id() {
        let now = Utc::now().naive_utc();
        let dtos = vec![
            dto(Some("t1"), "tok-a-00000001", 0.5, 5),
            dto(Some("t1"), "tok-a-00000001", 0.5, 5),
        ];
        let out = filter_trades(dtos, &tracked(), now, Duration::hours(1));
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.duplicates, 1);
    }

    #[test]
    fn missing_ids_get_stable_fallback_ids() {
        let now = Utc::now().naive_utc();
        // Two identical records without upstream ids: the fallback hash
        // makes them one trade.
        let a = dto(None, "tok-a-00000001", 0.5, 5);
        let out = filter_trades(vec![a.clone(), a], &tracked(), now, Duration::hours(1));
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.duplicates, 1);
        assert!(out.trades[0].trade_id.is_none());
        assert_eq!(out.trades[0].effective_id().len(), 32);
    }
}
