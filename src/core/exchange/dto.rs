//! Wire types for the upstream APIs.
//!
//! Upstream payloads are field-tolerant by necessity: numbers arrive as
//! strings, parallel arrays arrive JSON-encoded inside strings, and field
//! names drift between snake_case and camelCase. These DTOs keep loose
//! `Value` fields and expose typed accessors.

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;

use crate::core::domain::{Book, Outcome, PriceLevel, TokenId, Trade};

/// Parse a numeric value that may arrive as a JSON number or string.
#[must_use]
pub fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Decode an array that may arrive as a JSON array or as a JSON-encoded
/// string (`"[\"a\", \"b\"]"`).
#[must_use]
pub fn string_array(value: &Value) -> Vec<String> {
    let items: Option<Vec<Value>> = match value {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => serde_json::from_str(s).ok(),
        _ => None,
    };
    items
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

/// Parse a timestamp that may be an ISO-8601 string, Unix seconds, or Unix
/// milliseconds (values above 10^12 are milliseconds). Returns naive UTC.
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<NaiveDateTime> {
    fn from_unix(n: f64) -> Option<NaiveDateTime> {
        if !n.is_finite() || n <= 0.0 {
            return None;
        }
        let (secs, millis) = if n > 1e12 {
            ((n / 1000.0).trunc(), n % 1000.0)
        } else {
            (n.trunc(), (n.fract() * 1000.0).round())
        };
        DateTime::from_timestamp(secs as i64, (millis as u32) * 1_000_000)
            .map(|dt| dt.naive_utc())
    }

    match value {
        Value::Number(n) => n.as_f64().and_then(from_unix),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.naive_utc());
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
            s.parse::<f64>().ok().and_then(from_unix)
        }
        _ => None,
    }
}

/// One outcome token inside a market's explicit `tokens` array.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenDto {
    #[serde(default, alias = "tokenId")]
    pub token_id: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub price: Option<Value>,
}

/// A market record from the metadata API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketDto {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "conditionId")]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default, alias = "enableOrderBook")]
    pub enable_order_book: Option<bool>,
    #[serde(default, alias = "acceptingOrders")]
    pub accepting_orders: Option<bool>,
    /// Explicit outcome tokens; preferred over the parallel arrays.
    #[serde(default)]
    pub tokens: Option<Vec<TokenDto>>,
    /// Parallel array of outcome names; may be a JSON-encoded string.
    #[serde(default)]
    pub outcomes: Option<Value>,
    #[serde(default, alias = "outcomePrices")]
    pub outcome_prices: Option<Value>,
    #[serde(default, alias = "clobTokenIds")]
    pub clob_token_ids: Option<Value>,
    #[serde(default)]
    pub volume: Option<Value>,
    #[serde(default, alias = "volumeNum")]
    pub volume_num: Option<f64>,
    #[serde(default)]
    pub liquidity: Option<Value>,
    #[serde(default, alias = "liquidityNum")]
    pub liquidity_num: Option<f64>,
    #[serde(default, alias = "endDate")]
    pub end_date: Option<Value>,
    #[serde(default, alias = "resolutionDate")]
    pub resolution_date: Option<Value>,
}

impl MarketDto {
    /// Stable market id: `id`, falling back to the condition id.
    #[must_use]
    pub fn market_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or(self.condition_id.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Derive outcomes, preferring the explicit `tokens` array and falling
    /// back to the parallel `clobTokenIds` / `outcomes` / `outcomePrices`
    /// arrays. Token ids are not length-filtered here; the collector does
    /// that.
    #[must_use]
    pub fn derive_outcomes(&self) -> Vec<Outcome> {
        if let Some(tokens) = &self.tokens {
            let derived: Vec<Outcome> = tokens
                .iter()
                .filter(|t| !t.token_id.is_empty())
                .map(|t| {
                    let name = if t.outcome.is_empty() {
                        "Unknown".to_string()
                    } else {
                        t.outcome.clone()
                    };
                    Outcome::new(name, t.token_id.clone(), t.price.as_ref().and_then(lenient_f64))
                })
                .collect();
            if !derived.is_empty() {
                return derived;
            }
        }

        let token_ids = self
            .clob_token_ids
            .as_ref()
            .map(string_array)
            .unwrap_or_default();
        let names = self.outcomes.as_ref().map(string_array).unwrap_or_default();
        let prices: Vec<Option<f64>> = self
            .outcome_prices
            .as_ref()
            .map(|v| {
                string_array(v)
                    .iter()
                    .map(|p| p.parse().ok())
                    .collect()
            })
            .unwrap_or_default();

        token_ids
            .into_iter()
            .enumerate()
            .map(|(i, token_id)| {
                let name = names.get(i).cloned().unwrap_or_else(|| match i {
                    0 => "Yes".to_string(),
                    1 => "No".to_string(),
                    n => format!("Outcome {}", n + 1),
                });
                Outcome::new(name, token_id, prices.get(i).copied().flatten())
            })
            .collect()
    }

    /// End date from `end_date` or `resolution_date`, whichever parses.
    #[must_use]
    pub fn parse_end_date(&self) -> Option<NaiveDateTime> {
        self.end_date
            .as_ref()
            .and_then(parse_timestamp)
            .or_else(|| self.resolution_date.as_ref().and_then(parse_timestamp))
    }

    #[must_use]
    pub fn volume_f64(&self) -> Option<f64> {
        self.volume
            .as_ref()
            .and_then(lenient_f64)
            .or(self.volume_num)
    }

    #[must_use]
    pub fn liquidity_f64(&self) -> Option<f64> {
        self.liquidity
            .as_ref()
            .and_then(lenient_f64)
            .or(self.liquidity_num)
    }
}

/// One ladder level with string-encoded numbers.
#[derive(Debug, Clone, Deserialize)]
pub struct LevelDto {
    pub price: Value,
    pub size: Value,
}

/// Order book response from `GET /book`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookDto {
    #[serde(default)]
    pub bids: Vec<LevelDto>,
    #[serde(default)]
    pub asks: Vec<LevelDto>,
}

impl BookDto {
    /// Parse ladders into a [`Book`], dropping unparseable levels and
    /// sorting best-first.
    #[must_use]
    pub fn into_book(self, token_id: TokenId) -> Book {
        let parse = |levels: Vec<LevelDto>| -> Vec<PriceLevel> {
            levels
                .into_iter()
                .filter_map(|l| {
                    Some(PriceLevel::new(lenient_f64(&l.price)?, lenient_f64(&l.size)?))
                })
                .collect()
        };
        let mut bids = parse(self.bids);
        let mut asks = parse(self.asks);
        bids.sort_by(|a, b| b.price.total_cmp(&a.price));
        asks.sort_by(|a, b| a.price.total_cmp(&b.price));
        Book::with_levels(token_id, bids, asks)
    }
}

/// A trade record from `GET /trades`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradeDto {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "asset_id", alias = "token_id")]
    pub asset: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub size: Option<Value>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub maker: Option<String>,
    #[serde(default)]
    pub taker: Option<String>,
}

impl TradeDto {
    /// Token id under any of its upstream names.
    #[must_use]
    pub fn token_id(&self) -> Option<&str> {
        self.asset.as_deref().filter(|s| !s.is_empty())
    }

    /// Convert to a domain trade, normalizing side to lowercase and the
    /// timestamp to naive UTC. Validity is the caller's concern.
    #[must_use]
    pub fn into_trade(self, market_id: Option<&str>) -> Option<Trade> {
        let token_id = self.token_id()?.to_string();
        let side = self
            .side
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        Some(Trade {
            trade_id: self.id.filter(|s| !s.is_empty()),
            token_id,
            market_id: market_id.map(str::to_string),
            price: self.price.as_ref().and_then(lenient_f64).unwrap_or(0.0),
            size: self.size.as_ref().and_then(lenient_f64).unwrap_or(0.0),
            side,
            timestamp: self.timestamp.as_ref().and_then(parse_timestamp),
            maker_address: self.maker.filter(|s| !s.is_empty()),
            taker_address: self.taker.filter(|s| !s.is_empty()),
        })
    }
}
