//! Declared and detected relationships between markets.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::id::MarketId;

/// How two markets relate for cross-market pricing checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// The markets cannot both resolve YES; groups share a `group_id`.
    MutuallyExclusive,
    /// Child requires parent, so child probability must not exceed parent's.
    Conditional,
    /// Parent is the earlier deadline; it must not price above the later.
    TimeSequence,
    /// Child is the specific variant; it must not price above the general.
    Subset,
}

impl RelationshipKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MutuallyExclusive => "mutually_exclusive",
            Self::Conditional => "conditional",
            Self::TimeSequence => "time_sequence",
            Self::Subset => "subset",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A heuristically-detected candidate edge, proposed for manual review.
///
/// The detector never writes these; confirmed relationships are created
/// explicitly through the relationship engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipCandidate {
    pub kind: RelationshipKind,
    /// Parent first: general / earlier / conditional parent. For mutually
    /// exclusive groups, all members in detection order.
    pub market_ids: Vec<MarketId>,
    pub group_id: Option<String>,
    pub confidence: f64,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_match_store_values() {
        assert_eq!(RelationshipKind::MutuallyExclusive.as_str(), "mutually_exclusive");
        assert_eq!(RelationshipKind::Conditional.as_str(), "conditional");
        assert_eq!(RelationshipKind::TimeSequence.as_str(), "time_sequence");
        assert_eq!(RelationshipKind::Subset.as_str(), "subset");
    }
}
