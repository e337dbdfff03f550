//! Market persistence: idempotent sync upserts and tracked-market scans.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::upsert::excluded;
use tracing::warn;

use crate::core::db::model::{MarketChangeset, MarketRow};
use crate::core::db::schema::markets;
use crate::core::domain::{Market, MarketId, Outcome};
use crate::error::Result;

use super::IN_CHUNK;

/// Convert a domain market to its row, serializing outcomes to JSON.
pub fn to_row(market: &Market, now: NaiveDateTime) -> Result<MarketRow> {
    Ok(MarketRow {
        id: market.id.to_string(),
        condition_id: market.condition_id.clone(),
        slug: market.slug.clone(),
        question: market.question.clone(),
        description: market.description.clone(),
        outcomes: serde_json::to_string(&market.outcomes)?,
        end_date: market.end_date,
        volume: market.volume,
        liquidity: market.liquidity,
        active: market.active,
        enable_order_book: market.enable_order_book,
        category: market.category.clone(),
        created_at: now,
        updated_at: now,
    })
}

/// Convert a row back to the domain market.
pub fn from_row(row: MarketRow) -> Result<Market> {
    let outcomes: Vec<Outcome> = serde_json::from_str(&row.outcomes)?;
    Ok(Market {
        id: MarketId::new(row.id),
        condition_id: row.condition_id,
        slug: row.slug,
        question: row.question,
        description: row.description,
        outcomes,
        end_date: row.end_date,
        volume: row.volume,
        liquidity: row.liquidity,
        active: row.active,
        enable_order_book: row.enable_order_book,
        category: row.category,
    })
}

/// Clear `enable_order_book` on every market so a following sync re-enables
/// only the currently tradeable ones.
pub fn reset_order_book_flags(conn: &mut SqliteConnection) -> Result<usize> {
    let updated = diesel::update(markets::table.filter(markets::enable_order_book.eq(true)))
        .set(markets::enable_order_book.eq(false))
        .execute(conn)?;
    Ok(updated)
}

/// Bulk upsert by id, updating mutable attributes only (`created_at` is
/// preserved for existing rows).
pub fn upsert_bulk(conn: &mut SqliteConnection, rows: &[MarketRow]) -> Result<usize> {
    conn.transaction(|conn| {
        let mut count = 0;
        for row in rows {
            count += diesel::insert_into(markets::table)
                .values(row)
                .on_conflict(markets::id)
                .do_update()
                .set((
                    markets::condition_id.eq(excluded(markets::condition_id)),
                    markets::slug.eq(excluded(markets::slug)),
                    markets::question.eq(excluded(markets::question)),
                    markets::description.eq(excluded(markets::description)),
                    markets::outcomes.eq(excluded(markets::outcomes)),
                    markets::end_date.eq(excluded(markets::end_date)),
                    markets::volume.eq(excluded(markets::volume)),
                    markets::liquidity.eq(excluded(markets::liquidity)),
                    markets::active.eq(excluded(markets::active)),
                    markets::enable_order_book.eq(excluded(markets::enable_order_book)),
                    markets::category.eq(excluded(markets::category)),
                    markets::updated_at.eq(excluded(markets::updated_at)),
                ))
                .execute(conn)?;
        }
        Ok(count)
    })
}

/// Per-row fallback for when the bulk upsert fails.
///
/// Preloads existing ids in one query (no per-row existence probes), then
/// inserts or updates each row under its own savepoint so one bad row
/// cannot poison the rest.
pub fn upsert_each(conn: &mut SqliteConnection, rows: &[MarketRow]) -> Result<usize> {
    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    let mut existing: HashSet<String> = HashSet::new();
    for chunk in ids.chunks(IN_CHUNK) {
        let found: Vec<String> = markets::table
            .filter(markets::id.eq_any(chunk))
            .select(markets::id)
            .load(conn)?;
        existing.extend(found);
    }

    let mut count = 0;
    for row in rows {
        let result = conn.transaction(|conn| {
            if existing.contains(&row.id) {
                diesel::update(markets::table.find(&row.id))
                    .set(MarketChangeset::from(row))
                    .execute(conn)
            } else {
                diesel::insert_into(markets::table).values(row).execute(conn)
            }
        });
        match result {
            Ok(_) => count += 1,
            Err(e) => warn!(market_id = %row.id, error = %e, "Skipping market row"),
        }
    }
    Ok(count)
}

/// All active markets.
pub fn active(conn: &mut SqliteConnection) -> Result<Vec<Market>> {
    let rows: Vec<MarketRow> = markets::table
        .filter(markets::active.eq(true))
        .load(conn)?;
    rows.into_iter().map(from_row).collect()
}

/// Active markets with the order book enabled; the tracked set for
/// order-book and trade collection.
pub fn active_with_order_book(conn: &mut SqliteConnection) -> Result<Vec<Market>> {
    let rows: Vec<MarketRow> = markets::table
        .filter(markets::active.eq(true))
        .filter(markets::enable_order_book.eq(true))
        .load(conn)?;
    rows.into_iter().map(from_row).collect()
}

/// Fetch a batch of markets by id.
pub fn by_ids(conn: &mut SqliteConnection, ids: &[String]) -> Result<Vec<Market>> {
    let mut out = Vec::new();
    for chunk in ids.chunks(IN_CHUNK) {
        let rows: Vec<MarketRow> = markets::table
            .filter(markets::id.eq_any(chunk))
            .load(conn)?;
        for row in rows {
            out.push(from_row(row)?);
        }
    }
    Ok(out)
}

/// Fetch one market by id.
pub fn get(conn: &mut SqliteConnection, id: &MarketId) -> Result<Option<Market>> {
    let row: Option<MarketRow> = markets::table
        .find(id.as_str())
        .first(conn)
        .optional()?;
    row.map(from_row).transpose()
}
