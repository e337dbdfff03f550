//! Aggregated volume windows.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Aggregation period granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Hour,
    Day,
    Week,
}

impl PeriodType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One aggregated (token, period) window, unique on
/// `(token_id, period_type, period_start)`.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeWindow {
    pub market_id: String,
    pub token_id: String,
    pub period_start: NaiveDateTime,
    pub period_end: NaiveDateTime,
    pub period_type: PeriodType,
    pub volume: f64,
    pub trade_count: i32,
    pub avg_trade_size: Option<f64>,
    pub price_open: Option<f64>,
    pub price_close: Option<f64>,
    pub price_high: Option<f64>,
    pub price_low: Option<f64>,
    pub buy_volume: Option<f64>,
    pub sell_volume: Option<f64>,
}

impl VolumeWindow {
    /// Fold a window's trades into aggregate stats.
    ///
    /// Trades must belong to one (market, token) pair; OHLC follows the
    /// trades' timestamp order, which this function sorts for.
    #[must_use]
    pub fn from_trades(
        market_id: &str,
        token_id: &str,
        mut trades: Vec<(NaiveDateTime, f64, f64, Option<String>)>,
        period_start: NaiveDateTime,
        period_end: NaiveDateTime,
        period_type: PeriodType,
    ) -> Self {
        trades.sort_by_key(|(ts, _, _, _)| *ts);

        let trade_count = trades.len() as i32;
        let volume: f64 = trades.iter().map(|(_, _, size, _)| size).sum();
        let buy_volume: f64 = trades
            .iter()
            .filter(|(_, _, _, side)| side.as_deref() == Some("buy"))
            .map(|(_, _, size, _)| size)
            .sum();
        let sell_volume: f64 = trades
            .iter()
            .filter(|(_, _, _, side)| side.as_deref() == Some("sell"))
            .map(|(_, _, size, _)| size)
            .sum();

        let prices: Vec<f64> = trades.iter().map(|(_, price, _, _)| *price).collect();

        Self {
            market_id: market_id.to_string(),
            token_id: token_id.to_string(),
            period_start,
            period_end,
            period_type,
            volume,
            trade_count,
            avg_trade_size: (trade_count > 0).then(|| volume / f64::from(trade_count)),
            price_open: prices.first().copied(),
            price_close: prices.last().copied(),
            price_high: prices.iter().copied().fold(None, |acc: Option<f64>, p| {
                Some(acc.map_or(p, |a| a.max(p)))
            }),
            price_low: prices.iter().copied().fold(None, |acc: Option<f64>, p| {
                Some(acc.map_or(p, |a| a.min(p)))
            }),
            buy_volume: (buy_volume > 0.0).then_some(buy_volume),
            sell_volume: (sell_volume > 0.0).then_some(sell_volume),
        }
    }
}
