//! Alert types emitted by the analyzers.
//!
//! An alert targets either a single market (`market_id`) or an ordered set
//! of related markets (`related_market_ids`), never both. The payload is a
//! tagged union serialized into one column; readers discriminate on the
//! `type` tag.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::id::MarketId;

/// Alert families, one per analyzer (both arbitrage analyzers share one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    VolumeSpike,
    SpreadAlert,
    MmPullback,
    Arbitrage,
}

impl AlertKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VolumeSpike => "volume_spike",
            Self::SpreadAlert => "spread_alert",
            Self::MmPullback => "mm_pullback",
            Self::Arbitrage => "arbitrage",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Where a YES-side price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Orderbook,
    MarketCache,
}

/// One market's leg inside a cross-market opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketLeg {
    pub yes_price: f64,
    pub liquidity: f64,
    pub source: PriceSource,
    /// Set when no outcome was literally named "Yes" and the first outcome
    /// was assumed to be the YES side.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub assumed_yes_outcome: bool,
}

/// Tagged alert payload, one variant per logical condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertData {
    VolumeSpike {
        token_id: String,
        current_volume: f64,
        average_volume: f64,
        ratio: f64,
        /// `standard` (1h window) or `flash` (15m window).
        spike_kind: String,
    },
    SpreadAlert {
        token_id: String,
        spread: Option<f64>,
        spread_pct: f64,
        best_bid: Option<f64>,
        best_ask: Option<f64>,
        snapshot_age_seconds: f64,
    },
    MmPullback {
        token_id: String,
        previous_depth: f64,
        current_depth: f64,
        depth_drop_pct: f64,
        /// Which depth band showed the worst drop, e.g. `5%`.
        depth_level: String,
        lookback_hours: f64,
        oldest_snapshot_time: NaiveDateTime,
        newest_snapshot_time: NaiveDateTime,
    },
    IntraMarket {
        outcome1_name: String,
        outcome1_price: f64,
        outcome1_token_id: String,
        outcome2_name: String,
        outcome2_price: f64,
        outcome2_token_id: String,
        total: f64,
        profit_estimate: f64,
        strategy: String,
        price_source: PriceSource,
    },
    MutuallyExclusive {
        group_id: String,
        markets: BTreeMap<String, MarketLeg>,
        total_probability: f64,
        profit_estimate: f64,
        /// `sell_all_outcomes` or `buy_all_outcomes`.
        strategy: String,
    },
    Conditional {
        parent_market_id: String,
        parent_price: f64,
        child_market_id: String,
        child_price: f64,
        profit_estimate: f64,
        strategy: String,
    },
    TimeSequence {
        earlier_market_id: String,
        earlier_price: f64,
        later_market_id: String,
        later_price: f64,
        profit_estimate: f64,
        strategy: String,
    },
    Subset {
        general_market_id: String,
        general_price: f64,
        specific_market_id: String,
        specific_price: f64,
        profit_estimate: f64,
        strategy: String,
    },
}

/// A fully-formed alert ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub market_id: Option<MarketId>,
    pub related_market_ids: Vec<MarketId>,
    pub data: AlertData,
    /// The analyzer's at-most-one-active key, unique per kind.
    pub dedup_key: String,
    pub expires_at: Option<NaiveDateTime>,
}

impl Alert {
    /// Single-market alert; `related_market_ids` stays empty.
    pub fn for_market(
        kind: AlertKind,
        severity: Severity,
        market_id: MarketId,
        title: impl Into<String>,
        description: impl Into<String>,
        data: AlertData,
        dedup_key: String,
    ) -> Self {
        Self {
            kind,
            severity,
            title: title.into(),
            description: description.into(),
            market_id: Some(market_id),
            related_market_ids: Vec::new(),
            data,
            dedup_key,
            expires_at: None,
        }
    }

    /// Cross-market alert over an ordered list of related markets.
    pub fn for_related(
        kind: AlertKind,
        severity: Severity,
        related: Vec<MarketId>,
        title: impl Into<String>,
        description: impl Into<String>,
        data: AlertData,
        dedup_key: String,
    ) -> Self {
        Self {
            kind,
            severity,
            title: title.into(),
            description: description.into(),
            market_id: None,
            related_market_ids: related,
            data,
            dedup_key,
            expires_at: None,
        }
    }

    /// Exactly one of `market_id` / non-empty `related_market_ids`.
    #[must_use]
    pub fn targets_are_consistent(&self) -> bool {
        self.market_id.is_some() != !self.related_market_ids.is_empty()
    }
}

/// Severity of an arbitrage opportunity by profit estimate.
#[must_use]
pub fn arbitrage_severity(profit: f64) -> Severity {
    if profit >= 0.05 {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// Severity of a volume spike by ratio to the hourly baseline.
#[must_use]
pub fn volume_severity(ratio: f64) -> Severity {
    if ratio >= 5.0 {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// Severity of a wide spread by its fraction of mid.
#[must_use]
pub fn spread_severity(spread_pct: f64) -> Severity {
    if spread_pct >= 0.10 {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// Severity of a liquidity pullback by the worst observed drop.
#[must_use]
pub fn pullback_severity(drop: f64) -> Severity {
    if drop >= 0.75 {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// Dedup key for per-token alerts: `(market_id, token_id)`.
#[must_use]
pub fn token_dedup_key(market_id: &MarketId, token_id: &str) -> String {
    format!("{market_id}:{token_id}")
}

/// Dedup key for intra-market arbitrage: the sorted related market ids.
#[must_use]
pub fn related_dedup_key(market_ids: &[MarketId]) -> String {
    let mut ids: Vec<&str> = market_ids.iter().map(MarketId::as_str).collect();
    ids.sort_unstable();
    ids.join("|")
}
