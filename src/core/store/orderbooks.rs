//! Order book persistence: append-only snapshots and the upserted
//! latest-raw ladder per token.
//!
//! Latest/oldest-per-token lookups ride on the autoincrement id: snapshots
//! are append-only within this process, so max(id) per token is the newest
//! row and min(id) within a window is the oldest.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::core::db::model::{LatestRawRow, NewSnapshotRow, SnapshotRow};
use crate::core::db::schema::{orderbook_latest_raw, orderbook_snapshots};
use crate::core::domain::{Book, BookMetrics, PriceLevel, TokenId};
use crate::error::Result;

use super::IN_CHUNK;

/// Build an insertable snapshot row from computed metrics.
#[must_use]
pub fn snapshot_row(
    token_id: &str,
    market_id: Option<&str>,
    timestamp: NaiveDateTime,
    metrics: &BookMetrics,
) -> NewSnapshotRow {
    NewSnapshotRow {
        token_id: token_id.to_string(),
        market_id: market_id.map(str::to_string),
        timestamp,
        best_bid: metrics.best_bid,
        best_ask: metrics.best_ask,
        spread: metrics.spread,
        spread_pct: metrics.spread_pct,
        mid_price: metrics.mid_price,
        bid_depth_1pct: metrics.bid_depth_1pct,
        ask_depth_1pct: metrics.ask_depth_1pct,
        bid_depth_5pct: metrics.bid_depth_5pct,
        ask_depth_5pct: metrics.ask_depth_5pct,
        imbalance: metrics.imbalance,
    }
}

/// Append one historical snapshot.
pub fn insert_snapshot(conn: &mut SqliteConnection, row: &NewSnapshotRow) -> Result<()> {
    diesel::insert_into(orderbook_snapshots::table)
        .values(row)
        .execute(conn)?;
    Ok(())
}

/// Upsert the raw ladder for a token; at most one row per token exists.
pub fn upsert_latest_raw(conn: &mut SqliteConnection, row: &LatestRawRow) -> Result<()> {
    diesel::replace_into(orderbook_latest_raw::table)
        .values(row)
        .execute(conn)?;
    Ok(())
}

/// Build the latest-raw row from a book.
pub fn latest_raw_row(
    book: &Book,
    market_id: Option<&str>,
    timestamp: NaiveDateTime,
) -> Result<LatestRawRow> {
    Ok(LatestRawRow {
        token_id: book.token_id().to_string(),
        market_id: market_id.map(str::to_string),
        timestamp,
        bids: serde_json::to_string(book.bids())?,
        asks: serde_json::to_string(book.asks())?,
    })
}

/// Fetch the raw ladder for a token and rebuild the book.
pub fn latest_raw(
    conn: &mut SqliteConnection,
    token_id: &str,
) -> Result<Option<(Book, NaiveDateTime)>> {
    let row: Option<LatestRawRow> = orderbook_latest_raw::table
        .find(token_id)
        .first(conn)
        .optional()?;
    row.map(|row| {
        let bids: Vec<PriceLevel> = serde_json::from_str(&row.bids)?;
        let asks: Vec<PriceLevel> = serde_json::from_str(&row.asks)?;
        Ok((
            Book::with_levels(TokenId::new(row.token_id), bids, asks),
            row.timestamp,
        ))
    })
    .transpose()
}

fn load_by_ids(conn: &mut SqliteConnection, ids: &[i32]) -> Result<Vec<SnapshotRow>> {
    let mut out = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(IN_CHUNK) {
        let rows: Vec<SnapshotRow> = orderbook_snapshots::table
            .filter(orderbook_snapshots::id.eq_any(chunk))
            .load(conn)?;
        out.extend(rows);
    }
    Ok(out)
}

/// Newest snapshot per token, keyed by token id.
pub fn latest_per_token(
    conn: &mut SqliteConnection,
    token_ids: &[String],
) -> Result<HashMap<String, SnapshotRow>> {
    let mut ids = Vec::new();
    for chunk in token_ids.chunks(IN_CHUNK) {
        let pairs: Vec<(String, Option<i32>)> = orderbook_snapshots::table
            .filter(orderbook_snapshots::token_id.eq_any(chunk))
            .group_by(orderbook_snapshots::token_id)
            .select((
                orderbook_snapshots::token_id,
                diesel::dsl::max(orderbook_snapshots::id),
            ))
            .load(conn)?;
        ids.extend(pairs.into_iter().filter_map(|(_, id)| id));
    }
    let rows = load_by_ids(conn, &ids)?;
    Ok(rows.into_iter().map(|r| (r.token_id.clone(), r)).collect())
}

/// Newest snapshot per token, restricted to snapshots at or after `cutoff`.
pub fn latest_per_token_since(
    conn: &mut SqliteConnection,
    token_ids: &[String],
    cutoff: NaiveDateTime,
) -> Result<HashMap<String, SnapshotRow>> {
    let mut ids = Vec::new();
    for chunk in token_ids.chunks(IN_CHUNK) {
        let pairs: Vec<(String, Option<i32>)> = orderbook_snapshots::table
            .filter(orderbook_snapshots::token_id.eq_any(chunk))
            .filter(orderbook_snapshots::timestamp.ge(cutoff))
            .group_by(orderbook_snapshots::token_id)
            .select((
                orderbook_snapshots::token_id,
                diesel::dsl::max(orderbook_snapshots::id),
            ))
            .load(conn)?;
        ids.extend(pairs.into_iter().filter_map(|(_, id)| id));
    }
    let rows = load_by_ids(conn, &ids)?;
    Ok(rows.into_iter().map(|r| (r.token_id.clone(), r)).collect())
}

/// Oldest snapshot per token inside the window starting at `after`.
pub fn oldest_per_token_since(
    conn: &mut SqliteConnection,
    token_ids: &[String],
    after: NaiveDateTime,
) -> Result<HashMap<String, SnapshotRow>> {
    let mut ids = Vec::new();
    for chunk in token_ids.chunks(IN_CHUNK) {
        let pairs: Vec<(String, Option<i32>)> = orderbook_snapshots::table
            .filter(orderbook_snapshots::token_id.eq_any(chunk))
            .filter(orderbook_snapshots::timestamp.ge(after))
            .group_by(orderbook_snapshots::token_id)
            .select((
                orderbook_snapshots::token_id,
                diesel::dsl::min(orderbook_snapshots::id),
            ))
            .load(conn)?;
        ids.extend(pairs.into_iter().filter_map(|(_, id)| id));
    }
    let rows = load_by_ids(conn, &ids)?;
    Ok(rows.into_iter().map(|r| (r.token_id.clone(), r)).collect())
}

/// Newest fresh snapshot per market, keyed by market id. Used by the
/// scorer's batch path.
pub fn latest_per_market_since(
    conn: &mut SqliteConnection,
    market_ids: &[String],
    cutoff: NaiveDateTime,
) -> Result<HashMap<String, SnapshotRow>> {
    let mut ids = Vec::new();
    for chunk in market_ids.chunks(IN_CHUNK) {
        let pairs: Vec<(Option<String>, Option<i32>)> = orderbook_snapshots::table
            .filter(orderbook_snapshots::market_id.eq_any(chunk.iter().map(|m| Some(m.as_str()))))
            .filter(orderbook_snapshots::timestamp.ge(cutoff))
            .group_by(orderbook_snapshots::market_id)
            .select((
                orderbook_snapshots::market_id,
                diesel::dsl::max(orderbook_snapshots::id),
            ))
            .load(conn)?;
        ids.extend(pairs.into_iter().filter_map(|(_, id)| id));
    }
    let rows = load_by_ids(conn, &ids)?;
    Ok(rows
        .into_iter()
        .filter_map(|r| r.market_id.clone().map(|m| (m, r)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::testkit::memory_store;
    use chrono::{Duration, Utc};

    fn metrics(bid: f64, ask: f64) -> BookMetrics {
        let book = Book::with_levels(
            TokenId::new("tok-0000000001"),
            vec![PriceLevel::new(bid, 100.0)],
            vec![PriceLevel::new(ask, 100.0)],
        );
        book.metrics()
    }

    #[test]
    fn latest_raw_has_one_row_per_token() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let now = Utc::now().naive_utc();

        let book = Book::with_levels(
            TokenId::new("tok-0000000001"),
            vec![PriceLevel::new(0.5, 100.0)],
            vec![PriceLevel::new(0.52, 50.0)],
        );
        let row = latest_raw_row(&book, Some("m1"), now).unwrap();
        upsert_latest_raw(&mut conn, &row).unwrap();

        let newer = Book::with_levels(
            TokenId::new("tok-0000000001"),
            vec![PriceLevel::new(0.51, 80.0)],
            vec![PriceLevel::new(0.53, 40.0)],
        );
        let row = latest_raw_row(&newer, Some("m1"), now + Duration::minutes(5)).unwrap();
        upsert_latest_raw(&mut conn, &row).unwrap();

        use diesel::dsl::count_star;
        let count: i64 = orderbook_latest_raw::table
            .select(count_star())
            .first(&mut conn)
            .unwrap();
        assert_eq!(count, 1);

        let (book, ts) = latest_raw(&mut conn, "tok-0000000001").unwrap().unwrap();
        assert_eq!(book.best_bid(), Some(0.51));
        assert_eq!(ts, now + Duration::minutes(5));
    }

    #[test]
    fn latest_and_oldest_per_token() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let now = Utc::now().naive_utc();
        let token = "tok-0000000001".to_string();

        for (mins_ago, bid) in [(180, 0.40), (120, 0.45), (5, 0.50)] {
            let row = snapshot_row(
                &token,
                Some("m1"),
                now - Duration::minutes(mins_ago),
                &metrics(bid, bid + 0.02),
            );
            insert_snapshot(&mut conn, &row).unwrap();
        }

        let tokens = vec![token.clone()];
        let latest = latest_per_token(&mut conn, &tokens).unwrap();
        assert_eq!(latest[&token].best_bid, Some(0.50));

        let oldest = oldest_per_token_since(&mut conn, &tokens, now - Duration::hours(4)).unwrap();
        assert_eq!(oldest[&token].best_bid, Some(0.40));

        // Window that excludes the oldest row.
        let oldest = oldest_per_token_since(&mut conn, &tokens, now - Duration::minutes(150)).unwrap();
        assert_eq!(oldest[&token].best_bid, Some(0.45));

        // Freshness cutoff that excludes everything.
        let fresh = latest_per_token_since(&mut conn, &tokens, now + Duration::minutes(1)).unwrap();
        assert!(fresh.is_empty());
    }

    #[test]
    fn latest_per_market_uses_market_key() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let now = Utc::now().naive_utc();

        for (market, token, bid) in [
            ("m1", "tok-a-00000001", 0.30),
            ("m1", "tok-a-00000001", 0.35),
            ("m2", "tok-b-00000001", 0.60),
        ] {
            let row = snapshot_row(token, Some(market), now, &metrics(bid, bid + 0.02));
            insert_snapshot(&mut conn, &row).unwrap();
        }

        let markets = vec!["m1".to_string(), "m2".to_string()];
        let by_market =
            latest_per_market_since(&mut conn, &markets, now - Duration::minutes(30)).unwrap();
        assert_eq!(by_market.len(), 2);
        assert_eq!(by_market["m1"].best_bid, Some(0.35));
        assert_eq!(by_market["m2"].best_bid, Some(0.60));
    }
}
