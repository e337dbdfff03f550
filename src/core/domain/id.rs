//! Domain identifier newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Minimum length of a real CLOB token id; shorter values are placeholder
/// junk from the metadata API and are filtered at ingest.
pub const MIN_TOKEN_ID_LEN: usize = 10;

/// Order-book token identifier - newtype for type safety.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(String);

impl TokenId {
    /// Create a new `TokenId` from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the token ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is long enough to be a real CLOB token id.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.0.len() >= MIN_TOKEN_ID_LEN
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TokenId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Market identifier - newtype for type safety.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(String);

impl MarketId {
    /// Create a new `MarketId` from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the market ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MarketId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for MarketId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_id_validity_is_length_based() {
        assert!(TokenId::new("0123456789abcdef").is_valid());
        assert!(!TokenId::new("short").is_valid());
        assert!(!TokenId::new("").is_valid());
    }

    #[test]
    fn ids_display_inner_value() {
        assert_eq!(TokenId::new("tok").to_string(), "tok");
        assert_eq!(MarketId::new("mkt").to_string(), "mkt");
    }
}
