//! Intra-market arbitrage: both sides of a binary market priced so that
//! buying both guarantees profit at settlement.
//!
//! Fresh order-book asks are authoritative: when both sides are fresh and
//! show no opportunity, the cached market prices are NOT consulted. The
//! cache is a fallback for missing or stale books only.

use diesel::Connection;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use tracing::info;

use crate::core::domain::{
    arbitrage_severity, related_dedup_key, Alert, AlertData, AlertKind, Market, PriceSource,
};
use crate::core::store::{alerts as alert_store, markets as market_store, orderbooks as book_store, Store};
use crate::error::Result;

/// Freshness bound in minutes for order-book prices; arbitrage needs
/// tight data.
pub const MAX_BOOK_AGE_MINUTES: i64 = 15;

/// Result of checking one binary market against fresh book prices.
#[derive(Debug, Clone, PartialEq)]
pub enum BookCheck {
    /// Both sides fresh and mispriced; buy both.
    Opportunity { ask1: f64, ask2: f64, profit: f64 },
    /// Both sides fresh, no mispricing. Authoritative; do not fall back.
    NoOpportunity,
    /// A side is missing or stale; the cache may decide.
    Unavailable,
}

/// Decide from order-book asks alone.
#[must_use]
pub fn check_book_prices(
    side1: Option<(f64, NaiveDateTime)>,
    side2: Option<(f64, NaiveDateTime)>,
    now: NaiveDateTime,
    min_profit: f64,
) -> BookCheck {
    let cutoff = now - Duration::minutes(MAX_BOOK_AGE_MINUTES);
    let (Some((ask1, ts1)), Some((ask2, ts2))) = (side1, side2) else {
        return BookCheck::Unavailable;
    };
    if ts1 < cutoff || ts2 < cutoff {
        return BookCheck::Unavailable;
    }

    let total = ask1 + ask2;
    let profit = 1.0 - total;
    if profit >= min_profit {
        BookCheck::Opportunity { ask1, ask2, profit }
    } else {
        BookCheck::NoOpportunity
    }
}

/// Detects two-sided mispricing inside single binary markets.
pub struct IntraMarketArbitrage {
    min_profit: f64,
}

impl IntraMarketArbitrage {
    #[must_use]
    pub fn new(min_profit: f64) -> Self {
        Self { min_profit }
    }

    fn build_alert(&self, market: &Market, prices: [f64; 2], source: PriceSource) -> Alert {
        let [price1, price2] = prices;
        let total = price1 + price2;
        let profit = 1.0 - total;
        let o1 = &market.outcomes[0];
        let o2 = &market.outcomes[1];
        Alert::for_related(
            AlertKind::Arbitrage,
            arbitrage_severity(profit),
            vec![market.id.clone()],
            format!("Arbitrage: {:.1}% profit", profit * 100.0),
            format!(
                "Buy both {} (${:.3}) and {} (${:.3}) for guaranteed ${:.3} profit per share",
                o1.name, price1, o2.name, price2, profit
            ),
            AlertData::IntraMarket {
                outcome1_name: o1.name.clone(),
                outcome1_price: price1,
                outcome1_token_id: o1.token_id.clone(),
                outcome2_name: o2.name.clone(),
                outcome2_price: price2,
                outcome2_token_id: o2.token_id.clone(),
                total,
                profit_estimate: profit,
                strategy: "buy_both_sides".to_string(),
                price_source: source,
            },
            related_dedup_key(std::slice::from_ref(&market.id)),
        )
    }

    /// Cached-price fallback, same profit gate.
    fn check_cached(&self, market: &Market) -> Option<[f64; 2]> {
        let price1 = market.outcomes[0].price?;
        let price2 = market.outcomes[1].price?;
        let profit = 1.0 - (price1 + price2);
        (profit >= self.min_profit).then_some([price1, price2])
    }
}

#[async_trait]
impl super::Analyzer for IntraMarketArbitrage {
    fn name(&self) -> &'static str {
        "intra_arbitrage"
    }

    async fn analyze(&self, store: &Store) -> Result<usize> {
        let now = Utc::now().naive_utc();
        let mut conn = store.conn()?;

        conn.transaction(|conn| {
            let binary_markets: Vec<Market> = market_store::active(conn)?
                .into_iter()
                .filter(Market::is_binary)
                .collect();
            if binary_markets.is_empty() {
                return Ok(0);
            }

            let tokens: Vec<String> = binary_markets
                .iter()
                .flat_map(|m| m.token_ids().into_iter().map(str::to_string).collect::<Vec<_>>())
                .collect();
            let snapshots = book_store::latest_per_token(conn, &tokens)?;

            // A market already covered by ANY active arbitrage alert
            // (including cross-market ones) is not re-flagged.
            let covered = alert_store::active_related_ids(conn, AlertKind::Arbitrage)?;
            let existing_keys = alert_store::active_dedup_keys(conn, AlertKind::Arbitrage)?;

            let mut created = 0;
            for market in &binary_markets {
                if covered.contains(market.id.as_str()) {
                    continue;
                }
                let key = related_dedup_key(std::slice::from_ref(&market.id));
                if existing_keys.contains(&key) {
                    continue;
                }

                let ask_of = |token: &str| -> Option<(f64, NaiveDateTime)> {
                    let snap = snapshots.get(token)?;
                    Some((snap.best_ask?, snap.timestamp))
                };
                let side1 = ask_of(&market.outcomes[0].token_id);
                let side2 = ask_of(&market.outcomes[1].token_id);

                let alert = match check_book_prices(side1, side2, now, self.min_profit) {
                    BookCheck::Opportunity { ask1, ask2, .. } => {
                        Some(self.build_alert(market, [ask1, ask2], PriceSource::Orderbook))
                    }
                    BookCheck::NoOpportunity => None,
                    BookCheck::Unavailable => self
                        .check_cached(market)
                        .map(|prices| self.build_alert(market, prices, PriceSource::MarketCache)),
                };

                if let Some(alert) = alert {
                    if alert_store::insert(conn, &alert, now)? {
                        info!(market = %market.id, "Intra-market arbitrage detected");
                        created += 1;
                    }
                }
            }
            Ok(created)
        })
    }
}
