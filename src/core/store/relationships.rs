//! Declared market relationship edges.
//!
//! Edges are unique on `(parent, child, kind)`; creation is conflict-ignore
//! so re-declaring a relationship is a no-op.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::core::db::model::{NewRelationshipRow, RelationshipRow};
use crate::core::db::schema::market_relationships;
use crate::core::domain::{MarketId, RelationshipKind};
use crate::error::Result;

/// Insert one edge; returns false when the (parent, child, kind) triple
/// already exists.
pub fn insert_ignore(conn: &mut SqliteConnection, row: &NewRelationshipRow) -> Result<bool> {
    let inserted = diesel::insert_or_ignore_into(market_relationships::table)
        .values(row)
        .execute(conn)?;
    Ok(inserted > 0)
}

/// Create a single declared edge.
pub fn create_edge(
    conn: &mut SqliteConnection,
    kind: RelationshipKind,
    parent: &MarketId,
    child: &MarketId,
    group_id: Option<&str>,
    notes: Option<&str>,
    confidence: f64,
    now: NaiveDateTime,
) -> Result<bool> {
    insert_ignore(
        conn,
        &NewRelationshipRow {
            relationship_type: kind.as_str().to_string(),
            parent_market_id: parent.to_string(),
            child_market_id: child.to_string(),
            group_id: group_id.map(str::to_string),
            notes: notes.map(str::to_string),
            confidence,
            created_at: now,
            updated_at: now,
        },
    )
}

/// Expand a mutually-exclusive group of N markets into its N·(N−1)/2
/// pairwise edges, all sharing `group_id`. Returns the number created.
pub fn create_mutually_exclusive(
    conn: &mut SqliteConnection,
    market_ids: &[MarketId],
    group_id: &str,
    notes: Option<&str>,
    confidence: f64,
    now: NaiveDateTime,
) -> Result<usize> {
    let mut created = 0;
    for (i, parent) in market_ids.iter().enumerate() {
        for child in &market_ids[i + 1..] {
            if create_edge(
                conn,
                RelationshipKind::MutuallyExclusive,
                parent,
                child,
                Some(group_id),
                notes,
                confidence,
                now,
            )? {
                created += 1;
            }
        }
    }
    Ok(created)
}

/// All edges of one kind.
pub fn by_kind(
    conn: &mut SqliteConnection,
    kind: RelationshipKind,
) -> Result<Vec<RelationshipRow>> {
    let rows: Vec<RelationshipRow> = market_relationships::table
        .filter(market_relationships::relationship_type.eq(kind.as_str()))
        .load(conn)?;
    Ok(rows)
}

/// Mutually-exclusive groups: `group_id` to the set of member market ids.
/// Edges without a group id are skipped (a group is required to price the
/// whole set together).
pub fn exclusive_groups(
    conn: &mut SqliteConnection,
) -> Result<HashMap<String, BTreeSet<String>>> {
    let rows = by_kind(conn, RelationshipKind::MutuallyExclusive)?;
    let mut groups: HashMap<String, BTreeSet<String>> = HashMap::new();
    for row in rows {
        if let Some(group) = row.group_id {
            let members = groups.entry(group).or_default();
            members.insert(row.parent_market_id);
            members.insert(row.child_market_id);
        }
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::testkit::memory_store;
    use chrono::Utc;

    #[test]
    fn triple_uniqueness_is_conflict_ignored() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let now = Utc::now().naive_utc();

        let parent = MarketId::new("p");
        let child = MarketId::new("c");
        assert!(create_edge(
            &mut conn,
            RelationshipKind::Conditional,
            &parent,
            &child,
            None,
            Some("primary before general"),
            1.0,
            now,
        )
        .unwrap());
        // Same triple again: ignored.
        assert!(!create_edge(
            &mut conn,
            RelationshipKind::Conditional,
            &parent,
            &child,
            None,
            None,
            0.8,
            now,
        )
        .unwrap());
        // Different kind between the same markets is a new edge.
        assert!(create_edge(
            &mut conn,
            RelationshipKind::Subset,
            &parent,
            &child,
            None,
            None,
            1.0,
            now,
        )
        .unwrap());

        assert_eq!(by_kind(&mut conn, RelationshipKind::Conditional).unwrap().len(), 1);
        assert_eq!(by_kind(&mut conn, RelationshipKind::Subset).unwrap().len(), 1);
    }

    #[test]
    fn exclusive_group_expands_pairwise() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let now = Utc::now().naive_utc();

        let ids: Vec<MarketId> = ["a", "b", "c"].iter().map(|m| MarketId::new(*m)).collect();
        let created =
            create_mutually_exclusive(&mut conn, &ids, "group-1", Some("who wins"), 1.0, now)
                .unwrap();
        assert_eq!(created, 3);

        let groups = exclusive_groups(&mut conn).unwrap();
        let members = &groups["group-1"];
        assert_eq!(members.len(), 3);
        assert!(members.contains("a") && members.contains("b") && members.contains("c"));
    }
}
