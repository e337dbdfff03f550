//! Trade records and their ingest validity predicate.

use chrono::{Duration, NaiveDateTime};
use sha2::{Digest, Sha256};

/// Sides a trade may carry; anything else fails validation.
pub const VALID_SIDES: [&str; 2] = ["buy", "sell"];

/// An individual trade observed on the venue.
///
/// `timestamp` is optional here because upstream records sometimes carry
/// unparseable values; such trades fail [`Trade::is_valid`] and are skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    /// Upstream trade id when provided; otherwise filled with
    /// [`Trade::fallback_id`] before insert.
    pub trade_id: Option<String>,
    pub token_id: String,
    pub market_id: Option<String>,
    pub price: f64,
    pub size: f64,
    /// Lowercased side, `buy` or `sell`, when upstream reported one.
    pub side: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub maker_address: Option<String>,
    pub taker_address: Option<String>,
}

impl Trade {
    /// Validity predicate applied before any trade reaches the store.
    ///
    /// Requires price in (0, 1], positive size, a parsed timestamp no more
    /// than one hour in the future (clock-skew allowance), and a side of
    /// `buy`, `sell`, or absent.
    #[must_use]
    pub fn is_valid(&self, now: NaiveDateTime) -> bool {
        if !(self.price > 0.0 && self.price <= 1.0) {
            return false;
        }
        if self.size <= 0.0 {
            return false;
        }
        if let Some(side) = &self.side {
            if !VALID_SIDES.contains(&side.as_str()) {
                return false;
            }
        }
        match self.timestamp {
            Some(ts) => ts <= now + Duration::hours(1),
            None => false,
        }
    }

    /// Deterministic fallback id for records the API delivered without one.
    ///
    /// SHA-256 over `(token, price, size, side, timestamp)`, truncated to 32
    /// hex characters. Stable across restarts so re-collection of the same
    /// upstream window cannot duplicate rows.
    #[must_use]
    pub fn fallback_id(&self) -> String {
        let ts = self
            .timestamp
            .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            .unwrap_or_default();
        let side = self.side.as_deref().unwrap_or("");
        let key = format!(
            "{}:{}:{}:{}:{}",
            self.token_id, self.price, self.size, side, ts
        );
        let digest = Sha256::digest(key.as_bytes());
        hex::encode(digest)[..32].to_string()
    }

    /// The id used for store-level deduplication.
    #[must_use]
    pub fn effective_id(&self) -> String {
        self.trade_id.clone().unwrap_or_else(|| self.fallback_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trade() -> Trade {
        Trade {
            trade_id: None,
            token_id: "tok-0000000001".into(),
            market_id: Some("m1".into()),
            price: 0.55,
            size: 120.0,
            side: Some("buy".into()),
            timestamp: Some(Utc::now().naive_utc()),
            maker_address: None,
            taker_address: None,
        }
    }

    #[test]
    fn valid_trade_passes() {
        let now = Utc::now().naive_utc();
        assert!(trade().is_valid(now));
    }

    #[test]
    fn price_must_be_a_probability() {
        let now = Utc::now().naive_utc();
        let mut t = trade();
        t.price = 0.0;
        assert!(!t.is_valid(now));
        t.price = 1.0;
        assert!(t.is_valid(now));
        t.price = 1.01;
        assert!(!t.is_valid(now));
        t.price = -0.3;
        assert!(!t.is_valid(now));
    }

    #[test]
    fn size_must_be_positive() {
        let now = Utc::now().naive_utc();
        let mut t = trade();
        t.size = 0.0;
        assert!(!t.is_valid(now));
        t.size = -10.0;
        assert!(!t.is_valid(now));
    }

    #[test]
    fn side_must_be_buy_sell_or_absent() {
        let now = Utc::now().naive_utc();
        let mut t = trade();
        t.side = None;
        assert!(t.is_valid(now));
        t.side = Some("sell".into());
        assert!(t.is_valid(now));
        t.side = Some("short".into());
        assert!(!t.is_valid(now));
    }

    #[test]
    fn timestamp_must_exist_and_not_be_far_future() {
        let now = Utc::now().naive_utc();
        let mut t = trade();
        t.timestamp = None;
        assert!(!t.is_valid(now));
        t.timestamp = Some(now + Duration::minutes(59));
        assert!(t.is_valid(now));
        t.timestamp = Some(now + Duration::minutes(61));
        assert!(!t.is_valid(now));
    }

    #[test]
    fn fallback_id_is_deterministic_and_distinct() {
        let t = trade();
        assert_eq!(t.fallback_id(), t.fallback_id());
        assert_eq!(t.fallback_id().len(), 32);

        let mut other = trade();
        other.price = 0.56;
        assert_ne!(t.fallback_id(), other.fallback_id());
    }

    #[test]
    fn effective_id_prefers_upstream_id() {
        let mut t = trade();
        t.trade_id = Some("upstream-1".into());
        assert_eq!(t.effective_id(), "upstream-1");
        t.trade_id = None;
        assert_eq!(t.effective_id(), t.fallback_id());
    }
}
