//! Cross-market arbitrage over declared relationships.
//!
//! All detection is side-aware: legs being sold price at the bid with bid
//! depth, legs being bought price at the ask with ask depth. Every alert
//! expires 30 minutes after creation; opportunities this wide rarely
//! survive longer.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::{Connection, SqliteConnection};
use tracing::info;

use super::pricing::{market_prices, Side, SidePrice};
use crate::core::domain::{
    arbitrage_severity, Alert, AlertData, AlertKind, MarketId, MarketLeg, RelationshipKind,
};
use crate::core::store::{alerts as alert_store, relationships as relation_store, Store};
use crate::error::Result;

/// How long a cross-market opportunity alert stays active at most.
pub const ALERT_TTL_MINUTES: i64 = 30;

/// Freshness bound in minutes on order-book prices used for cross-market
/// checks.
pub const MAX_BOOK_AGE_MINUTES: i64 = 15;

/// Which leg of a (parent, child) edge the strategy sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SoldLeg {
    Parent,
    Child,
}

/// Detects mispricings across declared market relationships.
pub struct CrossMarketArbitrage {
    min_profit: f64,
    min_liquidity: f64,
}

fn leg(price: &SidePrice) -> MarketLeg {
    MarketLeg {
        yes_price: price.yes_price,
        liquidity: price.liquidity,
        source: price.source,
        assumed_yes_outcome: price.assumed_yes_outcome,
    }
}

impl CrossMarketArbitrage {
    #[must_use]
    pub fn new(min_profit: f64, min_liquidity: f64) -> Self {
        Self {
            min_profit,
            min_liquidity,
        }
    }

    /// Stamp the TTL, insert under a savepoint, and track the key so one
    /// pass never emits the same opportunity twice.
    fn insert(
        &self,
        conn: &mut SqliteConnection,
        existing: &mut HashSet<String>,
        mut alert: Alert,
        now: NaiveDateTime,
    ) -> Result<usize> {
        alert.expires_at = Some(now + Duration::minutes(ALERT_TTL_MINUTES));
        let key = alert.dedup_key.clone();
        if alert_store::insert(conn, &alert, now)? {
            existing.insert(key);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    /// Mutually-exclusive groups: sell-all when the bids sum above 1,
    /// buy-all when the asks sum below 1.
    fn detect_exclusive(
        &self,
        conn: &mut SqliteConnection,
        existing: &mut HashSet<String>,
        now: NaiveDateTime,
    ) -> Result<usize> {
        let groups = relation_store::exclusive_groups(conn)?;
        let mut created = 0;

        for (group_id, members) in groups {
            // An active legacy-format alert suppresses both split keys.
            if existing.contains(&format!("exclusive-{group_id}")) {
                continue;
            }
            let ids: Vec<String> = members.iter().cloned().collect();

            let sell_prices = market_prices(conn, &ids, Side::Sell, Duration::minutes(MAX_BOOK_AGE_MINUTES), now)?;
            let buy_prices = market_prices(conn, &ids, Side::Buy, Duration::minutes(MAX_BOOK_AGE_MINUTES), now)?;
            if sell_prices.len() < members.len() || buy_prices.len() < members.len() {
                continue;
            }

            let sell_key = format!("exclusive-sell-{group_id}");
            if !existing.contains(&sell_key) {
                let total: f64 = sell_prices.values().map(|p| p.yes_price).sum();
                let profit = total - 1.0;
                let min_liq = sell_prices
                    .values()
                    .map(|p| p.liquidity)
                    .fold(f64::INFINITY, f64::min);
                if total > 1.0 && profit >= self.min_profit && min_liq >= self.min_liquidity {
                    let alert = self.exclusive_alert(
                        &group_id,
                        &members,
                        &sell_prices,
                        total,
                        profit,
                        "sell_all_outcomes",
                        sell_key,
                    );
                    let inserted = self.insert(conn, existing, alert, now)?;
                    if inserted > 0 {
                        info!(group = %group_id, profit, "Mutually-exclusive sell-all opportunity");
                    }
                    created += inserted;
                }
            }

            let buy_key = format!("exclusive-buy-{group_id}");
            if !existing.contains(&buy_key) {
                let total: f64 = buy_prices.values().map(|p| p.yes_price).sum();
                let profit = 1.0 - total;
                let min_liq = buy_prices
                    .values()
                    .map(|p| p.liquidity)
                    .fold(f64::INFINITY, f64::min);
                if total < 1.0 && profit >= self.min_profit && min_liq >= self.min_liquidity {
                    let alert = self.exclusive_alert(
                        &group_id,
                        &members,
                        &buy_prices,
                        total,
                        profit,
                        "buy_all_outcomes",
                        buy_key,
                    );
                    let inserted = self.insert(conn, existing, alert, now)?;
                    if inserted > 0 {
                        info!(group = %group_id, profit, "Mutually-exclusive buy-all opportunity");
                    }
                    created += inserted;
                }
            }
        }
        Ok(created)
    }

    #[allow(clippy::too_many_arguments)]
    fn exclusive_alert(
        &self,
        group_id: &str,
        members: &BTreeSet<String>,
        prices: &HashMap<String, SidePrice>,
        total: f64,
        profit: f64,
        strategy: &str,
        dedup_key: String,
    ) -> Alert {
        let verb = if strategy == "sell_all_outcomes" {
            "Sell"
        } else {
            "Buy"
        };
        let legs: BTreeMap<String, MarketLeg> = members
            .iter()
            .filter_map(|id| prices.get(id).map(|p| (id.clone(), leg(p))))
            .collect();
        Alert::for_related(
            AlertKind::Arbitrage,
            arbitrage_severity(profit),
            members.iter().map(MarketId::new).collect(),
            format!(
                "Cross-market: {:.1}% profit ({} all)",
                profit * 100.0,
                verb.to_lowercase()
            ),
            format!(
                "{verb} all {} mutually exclusive outcomes; combined probability {:.1}%",
                members.len(),
                total * 100.0
            ),
            AlertData::MutuallyExclusive {
                group_id: group_id.to_string(),
                markets: legs,
                total_probability: total,
                profit_estimate: profit,
                strategy: strategy.to_string(),
            },
            dedup_key,
        )
    }

    /// Shared shape of the three pairwise detectors: one leg is sold at the
    /// bid, the other bought at the ask, and the edge is violated when the
    /// sold leg prices above the bought leg.
    #[allow(clippy::too_many_arguments)]
    fn detect_pairwise(
        &self,
        conn: &mut SqliteConnection,
        existing: &mut HashSet<String>,
        now: NaiveDateTime,
        kind: RelationshipKind,
        sold_leg: SoldLeg,
        key_prefix: &str,
        build: impl Fn(&str, &SidePrice, &str, &SidePrice, f64) -> AlertData,
        title_of: impl Fn(f64) -> String,
        description_of: impl Fn(f64, f64) -> String,
    ) -> Result<usize> {
        let mut created = 0;
        for edge in relation_store::by_kind(conn, kind)? {
            let parent = edge.parent_market_id.as_str();
            let child = edge.child_market_id.as_str();
            let key = format!("{key_prefix}-{parent}-{child}");
            if existing.contains(&key) {
                continue;
            }

            let (sell_id, buy_id) = match sold_leg {
                SoldLeg::Parent => (parent, child),
                SoldLeg::Child => (child, parent),
            };

            let sell = market_prices(
                conn,
                std::slice::from_ref(&sell_id.to_string()),
                Side::Sell,
                Duration::minutes(MAX_BOOK_AGE_MINUTES),
                now,
            )?;
            let buy = market_prices(
                conn,
                std::slice::from_ref(&buy_id.to_string()),
                Side::Buy,
                Duration::minutes(MAX_BOOK_AGE_MINUTES),
                now,
            )?;
            let (Some(sell_price), Some(buy_price)) = (sell.get(sell_id), buy.get(buy_id)) else {
                continue;
            };

            // No violation while the sold leg prices at or below the
            // bought leg.
            if sell_price.yes_price <= buy_price.yes_price {
                continue;
            }
            let profit = sell_price.yes_price - buy_price.yes_price;
            if profit < self.min_profit {
                continue;
            }
            if sell_price.liquidity.min(buy_price.liquidity) < self.min_liquidity {
                continue;
            }

            let (parent_price, child_price) = match sold_leg {
                SoldLeg::Parent => (sell_price, buy_price),
                SoldLeg::Child => (buy_price, sell_price),
            };
            let alert = Alert::for_related(
                AlertKind::Arbitrage,
                arbitrage_severity(profit),
                vec![MarketId::new(parent), MarketId::new(child)],
                title_of(profit),
                description_of(sell_price.yes_price, buy_price.yes_price),
                build(parent, parent_price, child, child_price, profit),
                key,
            );
            let inserted = self.insert(conn, existing, alert, now)?;
            if inserted > 0 {
                info!(kind = %kind, parent, child, profit, "Cross-market opportunity");
            }
            created += inserted;
        }
        Ok(created)
    }
}

#[async_trait]
impl super::Analyzer for CrossMarketArbitrage {
    fn name(&self) -> &'static str {
        "cross_arbitrage"
    }

    async fn analyze(&self, store: &Store) -> Result<usize> {
        let now = Utc::now().naive_utc();
        let mut conn = store.conn()?;

        conn.transaction(|conn| {
            let mut existing = alert_store::active_dedup_keys(conn, AlertKind::Arbitrage)?;
            let mut created = 0;

            created += self.detect_exclusive(conn, &mut existing, now)?;

            // Conditional: the child event requires the parent, so the
            // child's YES must not price above the parent's.
            created += self.detect_pairwise(
                conn,
                &mut existing,
                now,
                RelationshipKind::Conditional,
                SoldLeg::Child,
                "conditional",
                |parent, parent_price, child, child_price, profit| AlertData::Conditional {
                    parent_market_id: parent.to_string(),
                    parent_price: parent_price.yes_price,
                    child_market_id: child.to_string(),
                    child_price: child_price.yes_price,
                    profit_estimate: profit,
                    strategy: "buy_parent_sell_child".to_string(),
                },
                |profit| format!("Conditional violation: {:.1}% profit", profit * 100.0),
                |sell, buy| {
                    format!(
                        "Child market priced higher than parent. Sell child @ {:.1}%, buy parent @ {:.1}%",
                        sell * 100.0,
                        buy * 100.0
                    )
                },
            )?;

            // Time sequence: parent is the earlier deadline; an earlier
            // event must not price above the later one.
            created += self.detect_pairwise(
                conn,
                &mut existing,
                now,
                RelationshipKind::TimeSequence,
                SoldLeg::Parent,
                "time",
                |earlier, earlier_price, later, later_price, profit| AlertData::TimeSequence {
                    earlier_market_id: earlier.to_string(),
                    earlier_price: earlier_price.yes_price,
                    later_market_id: later.to_string(),
                    later_price: later_price.yes_price,
                    profit_estimate: profit,
                    strategy: "sell_earlier_buy_later".to_string(),
                },
                |profit| format!("Time inversion: {:.1}% profit", profit * 100.0),
                |sell, buy| {
                    format!(
                        "Earlier deadline priced higher than later. Sell earlier @ {:.1}%, buy later @ {:.1}%",
                        sell * 100.0,
                        buy * 100.0
                    )
                },
            )?;

            // Subset: parent is the general outcome; the specific variant
            // must not price above it.
            created += self.detect_pairwise(
                conn,
                &mut existing,
                now,
                RelationshipKind::Subset,
                SoldLeg::Child,
                "subset",
                |general, general_price, specific, specific_price, profit| AlertData::Subset {
                    general_market_id: general.to_string(),
                    general_price: general_price.yes_price,
                    specific_market_id: specific.to_string(),
                    specific_price: specific_price.yes_price,
                    profit_estimate: profit,
                    strategy: "sell_specific_buy_general".to_string(),
                },
                |profit| format!("Subset mispricing: {:.1}% profit", profit * 100.0),
                |sell, buy| {
                    format!(
                        "Specific outcome priced higher than general. Sell specific @ {:.1}%, buy general @ {:.1}%",
                        sell * 100.0,
                        buy * 100.0
                    )
                },
            )?;

            Ok(created)
        })
    }
}
