//! Market and outcome types.
//!
//! A market is the unit of tracking: a question with a sequence of outcomes,
//! each outcome carrying the token id that joins it to order books and
//! trades. Binary markets (exactly two outcomes with valid token ids) are
//! the only ones eligible for intra-market arbitrage checks.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::id::{MarketId, TokenId};

/// A single market outcome with its order-book join key and cached price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub token_id: String,
    pub price: Option<f64>,
}

impl Outcome {
    pub fn new(name: impl Into<String>, token_id: impl Into<String>, price: Option<f64>) -> Self {
        Self {
            name: name.into(),
            token_id: token_id.into(),
            price,
        }
    }

    /// True when the outcome carries a usable token id.
    #[must_use]
    pub fn has_valid_token(&self) -> bool {
        TokenId::new(self.token_id.clone()).is_valid()
    }
}

/// A tracked prediction market.
#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    pub id: MarketId,
    pub condition_id: Option<String>,
    pub slug: Option<String>,
    pub question: String,
    pub description: Option<String>,
    pub outcomes: Vec<Outcome>,
    pub end_date: Option<NaiveDateTime>,
    pub volume: Option<f64>,
    pub liquidity: Option<f64>,
    pub active: bool,
    pub enable_order_book: bool,
    pub category: Option<String>,
}

impl Market {
    /// Token ids of all outcomes with a usable token id.
    #[must_use]
    pub fn token_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.has_valid_token())
            .map(|o| o.token_id.as_str())
            .collect()
    }

    /// True for markets with exactly two outcomes, both with valid tokens.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.outcomes.len() == 2 && self.outcomes.iter().all(Outcome::has_valid_token)
    }

    /// True when some outcome is literally named "Yes" (case-insensitive).
    #[must_use]
    pub fn has_explicit_yes(&self) -> bool {
        self.outcomes.iter().any(|o| o.name.eq_ignore_ascii_case("yes"))
    }

    /// The YES-side outcome: the one named "Yes" if present, else the first.
    ///
    /// Callers that fall back to the first outcome should tag derived prices
    /// with `assumed_yes_outcome` (see [`Market::has_explicit_yes`]).
    #[must_use]
    pub fn yes_outcome(&self) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case("yes"))
            .or_else(|| self.outcomes.first())
    }

    /// Token id of the YES-side outcome, if it has one.
    #[must_use]
    pub fn yes_token(&self) -> Option<&str> {
        self.yes_outcome()
            .filter(|o| o.has_valid_token())
            .map(|o| o.token_id.as_str())
    }

    /// Cached YES-side price from the market record.
    #[must_use]
    pub fn yes_price(&self) -> Option<f64> {
        self.yes_outcome().and_then(|o| o.price)
    }
}
