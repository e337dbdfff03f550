//! Trade persistence: at-most-once inserts by trade id and windowed volume
//! scans for the analyzers.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use diesel::dsl::{count_star, max, min, sum};
use diesel::prelude::*;
use tracing::warn;

use crate::core::db::model::{NewTradeRow, TradeRow};
use crate::core::db::schema::trades;
use crate::core::domain::Trade;
use crate::error::{Error, Result};

use super::IN_CHUNK;

/// Convert a validated domain trade to its insertable row.
///
/// # Errors
/// Returns [`Error::Validation`] when the trade has no timestamp; callers
/// must have applied [`Trade::is_valid`] first.
pub fn to_row(trade: &Trade) -> Result<NewTradeRow> {
    let timestamp = trade
        .timestamp
        .ok_or_else(|| Error::Validation("trade without timestamp".into()))?;
    Ok(NewTradeRow {
        trade_id: Some(trade.effective_id()),
        token_id: trade.token_id.clone(),
        market_id: trade.market_id.clone(),
        price: trade.price,
        size: trade.size,
        side: trade.side.clone(),
        timestamp,
        maker_address: trade.maker_address.clone(),
        taker_address: trade.taker_address.clone(),
    })
}

/// Which of the given trade ids already exist, resolved in one query per
/// chunk rather than per-id probes.
pub fn existing_ids(conn: &mut SqliteConnection, ids: &[String]) -> Result<HashSet<String>> {
    let mut found = HashSet::new();
    for chunk in ids.chunks(IN_CHUNK) {
        let rows: Vec<Option<String>> = trades::table
            .filter(trades::trade_id.eq_any(chunk.iter().map(|s| Some(s.as_str()))))
            .select(trades::trade_id)
            .load(conn)?;
        found.extend(rows.into_iter().flatten());
    }
    Ok(found)
}

/// Bulk insert with conflict-ignore on trade id. Returns the number of rows
/// actually inserted (conflicting rows count as ignored, not errors).
pub fn insert_ignore_bulk(conn: &mut SqliteConnection, rows: &[NewTradeRow]) -> Result<usize> {
    conn.transaction(|conn| {
        let mut inserted = 0;
        for chunk in rows.chunks(IN_CHUNK) {
            inserted += diesel::insert_or_ignore_into(trades::table)
                .values(chunk)
                .execute(conn)?;
        }
        Ok(inserted)
    })
}

/// Per-row fallback: each insert under its own savepoint so one bad row
/// cannot poison the batch. Returns the number inserted.
pub fn insert_each(conn: &mut SqliteConnection, rows: &[NewTradeRow]) -> usize {
    let mut inserted = 0;
    for row in rows {
        let result: Result<usize> = conn
            .transaction(|conn| {
                diesel::insert_or_ignore_into(trades::table)
                    .values(row)
                    .execute(conn)
            })
            .map_err(Error::from);
        match result {
            Ok(n) => inserted += n,
            Err(e) => warn!(
                trade_id = row.trade_id.as_deref().unwrap_or("<none>"),
                error = %e,
                "Skipping trade row"
            ),
        }
    }
    inserted
}

/// Total traded size per token over `[start, end)`.
pub fn volume_by_token(
    conn: &mut SqliteConnection,
    token_ids: &[String],
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<HashMap<String, f64>> {
    let mut out = HashMap::new();
    for chunk in token_ids.chunks(IN_CHUNK) {
        let rows: Vec<(String, Option<f64>)> = trades::table
            .filter(trades::token_id.eq_any(chunk))
            .filter(trades::timestamp.ge(start))
            .filter(trades::timestamp.lt(end))
            .group_by(trades::token_id)
            .select((trades::token_id, sum(trades::size)))
            .load(conn)?;
        out.extend(rows.into_iter().map(|(t, v)| (t, v.unwrap_or(0.0))));
    }
    Ok(out)
}

/// Baseline (total size, trade count) per token over `[start, end)`.
pub fn baseline_by_token(
    conn: &mut SqliteConnection,
    token_ids: &[String],
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<HashMap<String, (f64, i64)>> {
    let mut out = HashMap::new();
    for chunk in token_ids.chunks(IN_CHUNK) {
        let rows: Vec<(String, Option<f64>, i64)> = trades::table
            .filter(trades::token_id.eq_any(chunk))
            .filter(trades::timestamp.ge(start))
            .filter(trades::timestamp.lt(end))
            .group_by(trades::token_id)
            .select((trades::token_id, sum(trades::size), count_star()))
            .load(conn)?;
        out.extend(rows.into_iter().map(|(t, v, c)| (t, (v.unwrap_or(0.0), c))));
    }
    Ok(out)
}

/// Timestamp of the newest trade for a token.
pub fn latest_timestamp(
    conn: &mut SqliteConnection,
    token_id: &str,
) -> Result<Option<NaiveDateTime>> {
    let ts: Option<Option<NaiveDateTime>> = trades::table
        .filter(trades::token_id.eq(token_id))
        .select(max(trades::timestamp))
        .first(conn)
        .optional()?;
    Ok(ts.flatten())
}

/// (low, high) traded price per token since `since`. Used for recent price
/// move computation.
pub fn price_extremes_since(
    conn: &mut SqliteConnection,
    token_ids: &[String],
    since: NaiveDateTime,
) -> Result<HashMap<String, (f64, f64)>> {
    let mut out = HashMap::new();
    for chunk in token_ids.chunks(IN_CHUNK) {
        let rows: Vec<(String, Option<f64>, Option<f64>)> = trades::table
            .filter(trades::token_id.eq_any(chunk))
            .filter(trades::timestamp.ge(since))
            .group_by(trades::token_id)
            .select((trades::token_id, min(trades::price), max(trades::price)))
            .load(conn)?;
        for (token, low, high) in rows {
            if let (Some(low), Some(high)) = (low, high) {
                out.insert(token, (low, high));
            }
        }
    }
    Ok(out)
}

/// All trades in `[start, end)`, for volume aggregation.
pub fn between(
    conn: &mut SqliteConnection,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<TradeRow>> {
    let rows: Vec<TradeRow> = trades::table
        .filter(trades::timestamp.ge(start))
        .filter(trades::timestamp.lt(end))
        .load(conn)?;
    Ok(rows)
}
