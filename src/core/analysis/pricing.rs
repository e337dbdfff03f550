//! Side-aware YES pricing shared by the arbitrage detectors.
//!
//! Selling a YES token hits the bids (best bid, bid depth); buying hits the
//! asks. When no fresh order book exists for a market's YES token, pricing
//! falls back to the cached outcome price from the market record, tagged
//! with its weaker provenance.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use diesel::SqliteConnection;

use crate::core::domain::{Market, PriceSource};
use crate::core::store::{markets as market_store, orderbooks as book_store};
use crate::error::Result;

/// Which way the strategy trades the YES token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// Price and liquidity for one market's YES side.
#[derive(Debug, Clone, PartialEq)]
pub struct SidePrice {
    pub yes_price: f64,
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
    /// Depth at 1% on the side being hit; cached market liquidity when the
    /// source is the market record.
    pub liquidity: f64,
    pub source: PriceSource,
    /// True when the first outcome was assumed to be YES because no outcome
    /// carried the literal name.
    pub assumed_yes_outcome: bool,
}

/// Resolve YES prices for a set of markets on one side.
///
/// Order-book snapshots newer than `max_age` win; markets without one fall
/// back to the cached outcome price. Markets with neither are absent from
/// the result.
pub fn market_prices(
    conn: &mut SqliteConnection,
    market_ids: &[String],
    side: Side,
    max_age: Duration,
    now: NaiveDateTime,
) -> Result<HashMap<String, SidePrice>> {
    let markets = market_store::by_ids(conn, market_ids)?;
    let by_id: HashMap<String, &Market> =
        markets.iter().map(|m| (m.id.to_string(), m)).collect();

    let mut token_to_market: HashMap<String, String> = HashMap::new();
    for market in &markets {
        if let Some(token) = market.yes_token() {
            token_to_market.insert(token.to_string(), market.id.to_string());
        }
    }

    let tokens: Vec<String> = token_to_market.keys().cloned().collect();
    let cutoff = now - max_age;
    let snapshots = book_store::latest_per_token_since(conn, &tokens, cutoff)?;

    let mut prices: HashMap<String, SidePrice> = HashMap::new();
    for (token, snapshot) in &snapshots {
        let Some(market_id) = token_to_market.get(token) else {
            continue;
        };
        let (price, liquidity) = match side {
            Side::Sell => (snapshot.best_bid, snapshot.bid_depth_1pct),
            Side::Buy => (snapshot.best_ask, snapshot.ask_depth_1pct),
        };
        let Some(price) = price else {
            continue;
        };
        prices.insert(
            market_id.clone(),
            SidePrice {
                yes_price: price,
                bid_price: snapshot.best_bid,
                ask_price: snapshot.best_ask,
                liquidity: liquidity.unwrap_or(0.0),
                source: PriceSource::Orderbook,
                assumed_yes_outcome: false,
            },
        );
    }

    for (market_id, market) in &by_id {
        if prices.contains_key(market_id) {
            continue;
        }
        let Some(yes_price) = market.yes_price() else {
            continue;
        };
        prices.insert(
            market_id.clone(),
            SidePrice {
                yes_price,
                bid_price: None,
                ask_price: None,
                liquidity: market.liquidity.unwrap_or(0.0),
                source: PriceSource::MarketCache,
                assumed_yes_outcome: !market.has_explicit_yes(),
            },
        );
    }

    Ok(prices)
}
