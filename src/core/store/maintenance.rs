//! Retention primitives: TTL deletes, row caps, and storage reclaim.

use chrono::NaiveDateTime;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::sql_types::BigInt;

use crate::core::db::schema::{alerts, orderbook_snapshots, trades};
use crate::error::Result;

/// Delete snapshots older than `cutoff`. Returns rows deleted.
pub fn delete_snapshots_before(
    conn: &mut SqliteConnection,
    cutoff: NaiveDateTime,
) -> Result<usize> {
    let deleted = diesel::delete(
        orderbook_snapshots::table.filter(orderbook_snapshots::timestamp.lt(cutoff)),
    )
    .execute(conn)?;
    Ok(deleted)
}

/// Delete trades older than `cutoff`. Returns rows deleted.
pub fn delete_trades_before(conn: &mut SqliteConnection, cutoff: NaiveDateTime) -> Result<usize> {
    let deleted =
        diesel::delete(trades::table.filter(trades::timestamp.lt(cutoff))).execute(conn)?;
    Ok(deleted)
}

/// Delete inactive alerts dismissed before `cutoff`. Active alerts are
/// never deleted here.
pub fn delete_dismissed_alerts_before(
    conn: &mut SqliteConnection,
    cutoff: NaiveDateTime,
) -> Result<usize> {
    let deleted = diesel::delete(
        alerts::table
            .filter(alerts::is_active.eq(false))
            .filter(alerts::dismissed_at.lt(cutoff)),
    )
    .execute(conn)?;
    Ok(deleted)
}

pub fn snapshot_count(conn: &mut SqliteConnection) -> Result<i64> {
    Ok(orderbook_snapshots::table.select(count_star()).first(conn)?)
}

pub fn trade_count(conn: &mut SqliteConnection) -> Result<i64> {
    Ok(trades::table.select(count_star()).first(conn)?)
}

pub fn alert_count(conn: &mut SqliteConnection) -> Result<i64> {
    Ok(alerts::table.select(count_star()).first(conn)?)
}

/// Enforce a hard row cap on the snapshot table by deleting the oldest
/// rows beyond it. Returns rows deleted.
pub fn cap_snapshots(conn: &mut SqliteConnection, cap: i64) -> Result<usize> {
    let count = snapshot_count(conn)?;
    if count <= cap {
        return Ok(0);
    }
    let deleted = diesel::sql_query(
        "DELETE FROM orderbook_snapshots WHERE id IN \
         (SELECT id FROM orderbook_snapshots ORDER BY timestamp ASC LIMIT ?)",
    )
    .bind::<BigInt, _>(count - cap)
    .execute(conn)?;
    Ok(deleted)
}

/// Enforce a hard row cap on the trade table. Returns rows deleted.
pub fn cap_trades(conn: &mut SqliteConnection, cap: i64) -> Result<usize> {
    let count = trade_count(conn)?;
    if count <= cap {
        return Ok(0);
    }
    let deleted = diesel::sql_query(
        "DELETE FROM trades WHERE id IN \
         (SELECT id FROM trades ORDER BY timestamp ASC LIMIT ?)",
    )
    .bind::<BigInt, _>(count - cap)
    .execute(conn)?;
    Ok(deleted)
}

#[derive(QueryableByName)]
struct DbSize {
    #[diesel(sql_type = BigInt)]
    bytes: i64,
}

/// Current database size in bytes.
pub fn database_bytes(conn: &mut SqliteConnection) -> Result<i64> {
    let row: DbSize = diesel::sql_query(
        "SELECT page_count * page_size AS bytes FROM pragma_page_count(), pragma_page_size()",
    )
    .get_result(conn)?;
    Ok(row.bytes)
}

/// Reclaim storage after a sweep. Must run OUTSIDE a transaction; callers
/// hand this a connection with no transaction open.
pub fn vacuum_analyze(conn: &mut SqliteConnection) -> Result<()> {
    diesel::sql_query("VACUUM").execute(conn)?;
    diesel::sql_query("ANALYZE").execute(conn)?;
    Ok(())
}
