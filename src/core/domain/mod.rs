//! Pure domain types shared across collectors, analyzers, and the scorer.

pub mod alert;
pub mod book;
pub mod id;
pub mod job;
pub mod market;
pub mod relation;
pub mod stats;
pub mod trade;

pub use alert::{
    arbitrage_severity, pullback_severity, related_dedup_key, spread_severity, token_dedup_key,
    volume_severity, Alert, AlertData, AlertKind, MarketLeg, PriceSource, Severity,
};
pub use book::{Book, BookMetrics, PriceLevel, SlippageEstimate};
pub use id::{MarketId, TokenId};
pub use job::JobStatus;
pub use market::{Market, Outcome};
pub use relation::{RelationshipCandidate, RelationshipKind};
pub use stats::{PeriodType, VolumeWindow};
pub use trade::Trade;
