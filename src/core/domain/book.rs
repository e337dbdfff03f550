//! Order book ladders and derived metrics.
//!
//! Ladders arrive sorted best-first: bids descending, asks ascending. A
//! level is valid when both price and size are positive; invalid levels are
//! skipped, not treated as zero.
//!
//! Depth is measured in dollars. Upstream sizes are shares, so every level
//! contributes `price * size`.

use serde::{Deserialize, Serialize};

use super::id::TokenId;

/// A single price level in an order book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

impl PriceLevel {
    #[must_use]
    pub const fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }

    /// A level counts only when both price and size are positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.price > 0.0 && self.size > 0.0
    }

    /// Dollar capacity of the level (`price * size`).
    #[must_use]
    pub fn dollars(&self) -> f64 {
        self.price * self.size
    }
}

/// Order book for a single tradeable token.
///
/// Bids are sorted by price descending, asks ascending (best first).
#[derive(Debug, Clone)]
pub struct Book {
    token_id: TokenId,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

/// Metrics derived from one book observation; what a historical snapshot
/// persists instead of the raw ladders.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BookMetrics {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub spread: Option<f64>,
    /// `spread / mid`, a fraction in [0, ~2], not a percentage.
    pub spread_pct: Option<f64>,
    pub mid_price: Option<f64>,
    pub bid_depth_1pct: Option<f64>,
    pub ask_depth_1pct: Option<f64>,
    pub bid_depth_5pct: Option<f64>,
    pub ask_depth_5pct: Option<f64>,
    /// `(bid_depth_1pct - ask_depth_1pct) / (bid_depth_1pct + ask_depth_1pct)`,
    /// zero when both sides are empty.
    pub imbalance: Option<f64>,
}

/// Result of walking the asks ladder with a dollar-denominated buy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlippageEstimate {
    /// Volume-weighted fill price across consumed levels.
    pub expected_price: f64,
    /// `|expected_price - best_ask| / best_ask`.
    pub slippage_pct: f64,
    pub filled_dollars: f64,
    pub filled_shares: f64,
    /// Dollars that could not be filled by the ladder.
    pub unfilled_dollars: f64,
    pub levels_consumed: usize,
}

impl Book {
    /// Creates a new empty order book.
    #[must_use]
    pub const fn new(token_id: TokenId) -> Self {
        Self {
            token_id,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Creates a book with initial price levels.
    ///
    /// Bids should be sorted by price descending, asks by price ascending.
    #[must_use]
    pub const fn with_levels(
        token_id: TokenId,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
    ) -> Self {
        Self {
            token_id,
            bids,
            asks,
        }
    }

    #[must_use]
    pub const fn token_id(&self) -> &TokenId {
        &self.token_id
    }

    #[must_use]
    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    #[must_use]
    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    /// Best bid price: the first valid bid level.
    #[must_use]
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.iter().find(|l| l.is_valid()).map(|l| l.price)
    }

    /// Best ask price: the first valid ask level.
    #[must_use]
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.iter().find(|l| l.is_valid()).map(|l| l.price)
    }

    /// Dollar depth of bids within `pct` of the best bid.
    ///
    /// Counts levels with `price >= best_bid * (1 - pct)`.
    #[must_use]
    pub fn bid_depth(&self, pct: f64) -> Option<f64> {
        let best = self.best_bid()?;
        let threshold = best * (1.0 - pct);
        Some(
            self.bids
                .iter()
                .filter(|l| l.is_valid() && l.price >= threshold)
                .map(PriceLevel::dollars)
                .sum(),
        )
    }

    /// Dollar depth of asks within `pct` of the best ask.
    ///
    /// Counts levels with `price <= best_ask * (1 + pct)`.
    #[must_use]
    pub fn ask_depth(&self, pct: f64) -> Option<f64> {
        let best = self.best_ask()?;
        let threshold = best * (1.0 + pct);
        Some(
            self.asks
                .iter()
                .filter(|l| l.is_valid() && l.price <= threshold)
                .map(PriceLevel::dollars)
                .sum(),
        )
    }

    /// Derive all snapshot metrics from the current ladders.
    #[must_use]
    pub fn metrics(&self) -> BookMetrics {
        let best_bid = self.best_bid();
        let best_ask = self.best_ask();

        let (spread, mid_price, spread_pct) = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => {
                let spread = ask - bid;
                let mid = (ask + bid) / 2.0;
                let pct = if mid > 0.0 { Some(spread / mid) } else { None };
                (Some(spread), Some(mid), pct)
            }
            _ => (None, None, None),
        };

        let bid_depth_1pct = self.bid_depth(0.01);
        let ask_depth_1pct = self.ask_depth(0.01);

        let imbalance = match (bid_depth_1pct, ask_depth_1pct) {
            (Some(bid), Some(ask)) => {
                let total = bid + ask;
                if total > 0.0 {
                    Some((bid - ask) / total)
                } else {
                    Some(0.0)
                }
            }
            _ => None,
        };

        BookMetrics {
            best_bid,
            best_ask,
            spread,
            spread_pct,
            mid_price,
            bid_depth_1pct,
            ask_depth_1pct,
            bid_depth_5pct: self.bid_depth(0.05),
            ask_depth_5pct: self.ask_depth(0.05),
            imbalance,
        }
    }

    /// Walk the asks ladder with a dollar-denominated buy of `dollars`.
    ///
    /// Each level can absorb `price * size` dollars; the final partial level
    /// fills `remaining / price` shares. Returns `None` when the ladder has
    /// no valid asks or the order size is not positive.
    #[must_use]
    pub fn buy_slippage(&self, dollars: f64) -> Option<SlippageEstimate> {
        if dollars <= 0.0 {
            return None;
        }
        let best_ask = self.best_ask()?;

        let mut remaining = dollars;
        let mut total_shares = 0.0_f64;
        let mut total_spent = 0.0_f64;
        let mut levels_consumed = 0_usize;

        for level in self.asks.iter().filter(|l| l.is_valid()) {
            let capacity = level.dollars();
            levels_consumed += 1;
            if remaining <= capacity {
                total_shares += remaining / level.price;
                total_spent += remaining;
                remaining = 0.0;
                break;
            }
            total_shares += level.size;
            total_spent += capacity;
            remaining -= capacity;
        }

        if total_shares <= 0.0 {
            return None;
        }

        let expected_price = total_spent / total_shares;
        Some(SlippageEstimate {
            expected_price,
            slippage_pct: (expected_price - best_ask).abs() / best_ask,
            filled_dollars: total_spent,
            filled_shares: total_shares,
            unfilled_dollars: remaining,
            levels_consumed,
        })
    }
}
