//! The relationship engine: declared edges plus a heuristic detector that
//! proposes candidates for manual confirmation.
//!
//! The detector only reads; confirmed relationships are written through
//! [`confirm`], which routes through the store's unique-triple upsert.

pub mod detect;

use chrono::Utc;
use diesel::SqliteConnection;

use crate::core::domain::{MarketId, RelationshipCandidate, RelationshipKind};
use crate::core::store::relationships as relation_store;
use crate::error::{Error, Result};

pub use detect::RelationshipDetector;

/// Persist a confirmed candidate as declared edges. Returns how many edges
/// were created (existing edges are conflict-ignored).
pub fn confirm(conn: &mut SqliteConnection, candidate: &RelationshipCandidate) -> Result<usize> {
    let now = Utc::now().naive_utc();
    match candidate.kind {
        RelationshipKind::MutuallyExclusive => {
            let group = candidate
                .group_id
                .as_deref()
                .ok_or_else(|| Error::Validation("exclusive group requires a group id".into()))?;
            relation_store::create_mutually_exclusive(
                conn,
                &candidate.market_ids,
                group,
                Some(&candidate.reason),
                candidate.confidence,
                now,
            )
        }
        RelationshipKind::Conditional | RelationshipKind::TimeSequence | RelationshipKind::Subset => {
            let [parent, child] = candidate.market_ids.as_slice() else {
                return Err(Error::Validation(format!(
                    "{} candidate needs exactly two markets",
                    candidate.kind
                )));
            };
            let created = relation_store::create_edge(
                conn,
                candidate.kind,
                parent,
                child,
                candidate.group_id.as_deref(),
                Some(&candidate.reason),
                candidate.confidence,
                now,
            )?;
            Ok(usize::from(created))
        }
    }
}

/// Declare a mutually exclusive group directly (manual operation).
pub fn declare_exclusive_group(
    conn: &mut SqliteConnection,
    market_ids: &[MarketId],
    group_id: &str,
    notes: Option<&str>,
) -> Result<usize> {
    relation_store::create_mutually_exclusive(
        conn,
        market_ids,
        group_id,
        notes,
        1.0,
        Utc::now().naive_utc(),
    )
}
