//! Market-maker pullback detection: a large drop in resting depth between
//! the oldest and newest snapshots of a lookback window.

use std::collections::HashMap;

use diesel::Connection;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::info;

use crate::core::db::model::SnapshotRow;
use crate::core::domain::{
    pullback_severity, token_dedup_key, Alert, AlertData, AlertKind, MarketId,
};
use crate::core::store::{
    alerts as alert_store, markets as market_store, orderbooks as book_store, Store,
};
use crate::error::Result;

/// Detects liquidity withdrawals across the depth bands the snapshots
/// persist (1% and 5% of best).
pub struct PullbackAnalyzer {
    lookback: Duration,
    drop_threshold: f64,
    max_snapshot_age: Duration,
    /// The two snapshots must span at least this much history.
    min_window: Duration,
}

impl Default for PullbackAnalyzer {
    fn default() -> Self {
        Self {
            lookback: Duration::hours(4),
            drop_threshold: 0.5,
            max_snapshot_age: Duration::minutes(30),
            min_window: Duration::hours(1),
        }
    }
}

/// The worst depth drop between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthDrop {
    pub drop: f64,
    pub level: &'static str,
    pub old_depth: f64,
    pub new_depth: f64,
}

/// Compare total (bid + ask) depth per band and return the worst drop.
/// Bands with no depth in the old snapshot are skipped.
#[must_use]
pub fn worst_depth_drop(oldest: &SnapshotRow, newest: &SnapshotRow) -> Option<DepthDrop> {
    let bands: [(&'static str, Option<f64>, Option<f64>, Option<f64>, Option<f64>); 2] = [
        (
            "1%",
            oldest.bid_depth_1pct,
            oldest.ask_depth_1pct,
            newest.bid_depth_1pct,
            newest.ask_depth_1pct,
        ),
        (
            "5%",
            oldest.bid_depth_5pct,
            oldest.ask_depth_5pct,
            newest.bid_depth_5pct,
            newest.ask_depth_5pct,
        ),
    ];

    let mut worst: Option<DepthDrop> = None;
    for (level, old_bid, old_ask, new_bid, new_ask) in bands {
        let old_depth = old_bid.unwrap_or(0.0) + old_ask.unwrap_or(0.0);
        if old_depth <= 0.0 {
            continue;
        }
        let new_depth = new_bid.unwrap_or(0.0) + new_ask.unwrap_or(0.0);
        let drop = 1.0 - new_depth / old_depth;
        if worst.as_ref().map_or(true, |w| drop > w.drop) {
            worst = Some(DepthDrop {
                drop,
                level,
                old_depth,
                new_depth,
            });
        }
    }
    worst
}

#[async_trait]
impl super::Analyzer for PullbackAnalyzer {
    fn name(&self) -> &'static str {
        "mm_pullback"
    }

    async fn analyze(&self, store: &Store) -> Result<usize> {
        let now = Utc::now().naive_utc();
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
            let oldest =
                book_store::oldest_per_token_since(conn, &tokens, now - self.lookback)?;
            let newest = book_store::latest_per_token(conn, &tokens)?;
            let existing = alert_store::active_dedup_keys(conn, AlertKind::MmPullback)?;

            let freshness_cutoff = now - self.max_snapshot_age;
            let mut created = 0;

            for (token, market_id) in &token_to_market {
                let (Some(old), Some(new)) = (oldest.get(token), newest.get(token)) else {
                    continue;
                };
                if old.id == new.id {
                    continue;
                }
                if new.timestamp - old.timestamp < self.min_window {
                    continue;
                }
                if new.timestamp < freshness_cutoff {
                    continue;
                }

                let dedup_key = token_dedup_key(market_id, token);
                if existing.contains(&dedup_key) {
                    continue;
                }

                let Some(worst) = worst_depth_drop(old, new) else {
                    continue;
                };
                if worst.drop < self.drop_threshold {
                    continue;
                }

                let alert = Alert::for_market(
                    AlertKind::MmPullback,
                    pullback_severity(worst.drop),
                    market_id.clone(),
                    format!(
                        "MM pullback: {:.0}% depth reduction at {}",
                        worst.drop * 100.0,
                        worst.level
                    ),
                    format!(
                        "Resting depth at {} fell from ${:.0} to ${:.0} over the lookback window",
                        worst.level, worst.old_depth, worst.new_depth
                    ),
                    AlertData::MmPullback {
                        token_id: token.clone(),
                        previous_depth: worst.old_depth,
                        current_depth: worst.new_depth,
                        depth_drop_pct: worst.drop,
                        depth_level: worst.level.to_string(),
                        lookback_hours: self.lookback.num_minutes() as f64 / 60.0,
                        oldest_snapshot_time: old.timestamp,
                        newest_snapshot_time: new.timestamp,
                    },
                    dedup_key,
                );
                if alert_store::insert(conn, &alert, now)? {
                    info!(
                        market = %market_id,
                        token = %token,
                        drop = worst.drop,
                        level = worst.level,
                        "MM pullback detected"
                    );
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
    use crate::core::db::model::NewSnapshotRow;
    use crate::core::domain::{Market, Outcome};
    use crate::core::store::testkit::memory_store;
    use chrono::NaiveDateTime;

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

    fn seed_depth_snapshot(
        store: &Store,
        token: &str,
        market: &str,
        ts: NaiveDateTime,
        depth_1: f64,
        depth_5: f64,
    ) {
        let row = NewSnapshotRow {
            token_id: token.to_string(),
            market_id: Some(market.to_string()),
            timestamp: ts,
            best_bid: Some(0.49),
            best_ask: Some(0.51),
            spread: Some(0.02),
            spread_pct: Some(0.04),
            mid_price: Some(0.50),
            bid_depth_1pct: Some(depth_1 / 2.0),
            ask_depth_1pct: Some(depth_1 / 2.0),
            bid_depth_5pct: Some(depth_5 / 2.0),
            ask_depth_5pct: Some(depth_5 / 2.0),
            imbalance: Some(0.0),
        };
        let mut conn = store.conn().unwrap();
        book_store::insert_snapshot(&mut conn, &row).unwrap();
    }

    #[tokio::test]
    async fn depth_drop_at_five_percent_band_fires() {
        let store = memory_store();
        seed_market(&store, "m1", "tok-a-00000001");
        let now = Utc::now().naive_utc();

        // 3 hours ago: $5000 bid + $5000 ask at 5%; now: $1000 + $1000.
        seed_depth_snapshot(&store, "tok-a-00000001", "m1", now - Duration::hours(3), 10_000.0, 10_000.0);
        seed_depth_snapshot(&store, "tok-a-00000001", "m1", now - Duration::minutes(5), 10_000.0, 2_000.0);

        let analyzer = PullbackAnalyzer::default();
        assert_eq!(analyzer.analyze(&store).await.unwrap(), 1);

        let mut conn = store.conn().unwrap();
        let rows = alert_store::active_by_kind(&mut conn, AlertKind::MmPullback).unwrap();
        let data: AlertData = serde_json::from_str(&rows[0].data).unwrap();
        match data {
            AlertData::MmPullback {
                depth_level,
                depth_drop_pct,
                ..
            } => {
                assert_eq!(depth_level, "5%");
                assert!((depth_drop_pct - 0.8).abs() < 1e-9);
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn short_window_is_skipped() {
        let store = memory_store();
        seed_market(&store, "m1", "tok-a-00000001");
        let now = Utc::now().naive_utc();

        seed_depth_snapshot(&store, "tok-a-00000001", "m1", now - Duration::minutes(40), 10_000.0, 10_000.0);
        seed_depth_snapshot(&store, "tok-a-00000001", "m1", now - Duration::minutes(5), 1_000.0, 1_000.0);

        let analyzer = PullbackAnalyzer::default();
        assert_eq!(analyzer.analyze(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stale_newest_snapshot_is_skipped() {
        let store = memory_store();
        seed_market(&store, "m1", "tok-a-00000001");
        let now = Utc::now().naive_utc();

        seed_depth_snapshot(&store, "tok-a-00000001", "m1", now - Duration::hours(3), 10_000.0, 10_000.0);
        seed_depth_snapshot(&store, "tok-a-00000001", "m1", now - Duration::minutes(45), 1_000.0, 1_000.0);

        let analyzer = PullbackAnalyzer::default();
        assert_eq!(analyzer.analyze(&store).await.unwrap(), 0);
    }

    #[test]
    fn worst_band_is_reported() {
        let old = SnapshotRow {
            id: 1,
            token_id: "t".into(),
            market_id: None,
            timestamp: Utc::now().naive_utc(),
            best_bid: None,
            best_ask: None,
            spread: None,
            spread_pct: None,
            mid_price: None,
            bid_depth_1pct: Some(100.0),
            ask_depth_1pct: Some(100.0),
            bid_depth_5pct: Some(500.0),
            ask_depth_5pct: Some(500.0),
            imbalance: None,
        };
        let mut new = old.clone();
        new.id = 2;
        // 1% band halves; 5% band drops 90%.
        new.bid_depth_1pct = Some(50.0);
        new.ask_depth_1pct = Some(50.0);
        new.bid_depth_5pct = Some(50.0);
        new.ask_depth_5pct = Some(50.0);

        let worst = worst_depth_drop(&old, &new).unwrap();
        assert_eq!(worst.level, "5%");
        assert!((worst.drop - 0.9).abs() < 1e-9);
    }
}
