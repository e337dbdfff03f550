//! Wide-spread detection over the freshest snapshot per token.

use std::collections::HashMap;

use diesel::Connection;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::info;

use crate::core::domain::{
    spread_severity, token_dedup_key, Alert, AlertData, AlertKind, MarketId,
};
use crate::core::store::{
    alerts as alert_store, markets as market_store, orderbooks as book_store, Store,
};
use crate::error::Result;

/// Snapshots older than this many minutes are not alertable.
pub const MAX_SNAPSHOT_AGE_MINUTES: i64 = 30;

/// Flags tokens whose bid-ask spread fraction crosses the alert threshold.
pub struct SpreadAnalyzer {
    threshold: f64,
}

impl SpreadAnalyzer {
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl super::Analyzer for SpreadAnalyzer {
    fn name(&self) -> &'static str {
        "spread"
    }

    async fn analyze(&self, store: &Store) -> Result<usize> {
        let now = Utc::now().naive_utc();
        let cutoff = now - Duration::minutes(MAX_SNAPSHOT_AGE_MINUTES);
        let mut conn = store.conn()?;

        conn.transaction(|conn| {
            let markets = market_store::active_with_order_book(conn)?;
            let mut token_to_market: HashMap<String, MarketId> = HashMap::new();
            for market in &markets {
                for token in market.token_ids() {
                    token_to_market.insert(token.to_string(), market.id.clone());
                }
            }
            if token_to_market.is_empty() {
                return Ok(0);
            }

            let tokens: Vec<String> = token_to_market.keys().cloned().collect();
            let snapshots = book_store::latest_per_token(conn, &tokens)?;
            let existing = alert_store::active_dedup_keys(conn, AlertKind::SpreadAlert)?;

            let mut created = 0;
            for (token, market_id) in &token_to_market {
                let Some(snapshot) = snapshots.get(token) else {
                    continue;
                };
                if snapshot.timestamp < cutoff {
                    continue;
                }
                let Some(spread_pct) = snapshot.spread_pct else {
                    continue;
                };
                if spread_pct < self.threshold {
                    continue;
                }

                let dedup_key = token_dedup_key(market_id, token);
                if existing.contains(&dedup_key) {
                    continue;
                }

                let age_seconds = (now - snapshot.timestamp).num_seconds() as f64;
                let alert = Alert::for_market(
                    AlertKind::SpreadAlert,
                    spread_severity(spread_pct),
                    market_id.clone(),
                    format!("Wide spread: {:.1}%", spread_pct * 100.0),
                    format!(
                        "Bid {:.3} / ask {:.3}; spread is {:.1}% of mid",
                        snapshot.best_bid.unwrap_or(0.0),
                        snapshot.best_ask.unwrap_or(0.0),
                        spread_pct * 100.0
                    ),
                    AlertData::SpreadAlert {
                        token_id: token.clone(),
                        spread: snapshot.spread,
                        spread_pct,
                        best_bid: snapshot.best_bid,
                        best_ask: snapshot.best_ask,
                        snapshot_age_seconds: age_seconds,
                    },
                    dedup_key,
                );
                if alert_store::insert(conn, &alert, now)? {
                    info!(market = %market_id, token = %token, spread_pct, "Wide spread detected");
                    created += 1;
                }
            }
            Ok(created)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analysis::Analyzer;
    use crate::core::domain::{Book, Market, Outcome, PriceLevel, TokenId};
    use crate::core::store::testkit::memory_store;

    fn seed_market(store: &Store, id: &str, token: &str) {
        let market = Market {
            id: MarketId::new(id),
            condition_id: None,
            slug: None,
            question: format!("Q {id}?"),
            description: None,
            outcomes: vec![Outcome::new("Yes", token, Some(0.5))],
            end_date: None,
            volume: None,
            liquidity: None,
            active: true,
            enable_order_book: true,
            category: None,
        };
        let mut conn = store.conn().unwrap();
        let row = market_store::to_row(&market, Utc::now().naive_utc()).unwrap();
        market_store::upsert_bulk(&mut conn, &[row]).unwrap();
    }

    fn seed_snapshot(store: &Store, token: &str, market: &str, bid: f64, ask: f64, age_min: i64) {
        let book = Book::with_levels(
            TokenId::new(token),
            vec![PriceLevel::new(bid, 100.0)],
            vec![PriceLevel::new(ask, 100.0)],
        );
        let ts = Utc::now().naive_utc() - Duration::minutes(age_min);
        let row = book_store::snapshot_row(token, Some(market), ts, &book.metrics());
        let mut conn = store.conn().unwrap();
        book_store::insert_snapshot(&mut conn, &row).unwrap();
    }

    #[tokio::test]
    async fn wide_fresh_spread_alerts_once() {
        let store = memory_store();
        seed_market(&store, "m1", "tok-a-00000001");
        // Spread 0.10 over mid 0.50 -> 20%.
        seed_snapshot(&store, "tok-a-00000001", "m1", 0.45, 0.55, 5);

        let analyzer = SpreadAnalyzer::new(0.05);
        assert_eq!(analyzer.analyze(&store).await.unwrap(), 1);
        // Dedup: second pass creates nothing.
        assert_eq!(analyzer.analyze(&store).await.unwrap(), 0);

        let mut conn = store.conn().unwrap();
        let rows = alert_store::active_by_kind(&mut conn, AlertKind::SpreadAlert).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].severity, "high");
    }

    #[tokio::test]
    async fn stale_snapshot_is_skipped() {
        let store = memory_store();
        seed_market(&store, "m1", "tok-a-00000001");
        seed_snapshot(&store, "tok-a-00000001", "m1", 0.40, 0.60, 45);

        let analyzer = SpreadAnalyzer::new(0.05);
        assert_eq!(analyzer.analyze(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn tight_spread_is_quiet() {
        let store = memory_store();
        seed_market(&store, "m1", "tok-a-00000001");
        seed_snapshot(&store, "tok-a-00000001", "m1", 0.49, 0.50, 5);

        let analyzer = SpreadAnalyzer::new(0.05);
        assert_eq!(analyzer.analyze(&store).await.unwrap(), 0);
    }
}
