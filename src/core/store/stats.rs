//! Aggregated volume-window persistence, unique per
//! `(token_id, period_type, period_start)`.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::upsert::excluded;

use crate::core::db::model::{NewVolumeStatsRow, VolumeStatsRow};
use crate::core::db::schema::volume_stats;
use crate::core::domain::{PeriodType, VolumeWindow};
use crate::error::Result;

/// Convert a computed window to its insertable row.
#[must_use]
pub fn to_row(window: &VolumeWindow, now: NaiveDateTime) -> NewVolumeStatsRow {
    NewVolumeStatsRow {
        market_id: window.market_id.clone(),
        token_id: window.token_id.clone(),
        period_start: window.period_start,
        period_end: window.period_end,
        period_type: window.period_type.as_str().to_string(),
        volume: window.volume,
        trade_count: window.trade_count,
        avg_trade_size: window.avg_trade_size,
        price_open: window.price_open,
        price_close: window.price_close,
        price_high: window.price_high,
        price_low: window.price_low,
        buy_volume: window.buy_volume,
        sell_volume: window.sell_volume,
        created_at: now,
    }
}

/// Upsert on the unique window key, replacing the aggregates when a window
/// is recomputed.
pub fn upsert(conn: &mut SqliteConnection, row: &NewVolumeStatsRow) -> Result<()> {
    diesel::insert_into(volume_stats::table)
        .values(row)
        .on_conflict((
            volume_stats::token_id,
            volume_stats::period_type,
            volume_stats::period_start,
        ))
        .do_update()
        .set((
            volume_stats::period_end.eq(excluded(volume_stats::period_end)),
            volume_stats::volume.eq(excluded(volume_stats::volume)),
            volume_stats::trade_count.eq(excluded(volume_stats::trade_count)),
            volume_stats::avg_trade_size.eq(excluded(volume_stats::avg_trade_size)),
            volume_stats::price_open.eq(excluded(volume_stats::price_open)),
            volume_stats::price_close.eq(excluded(volume_stats::price_close)),
            volume_stats::price_high.eq(excluded(volume_stats::price_high)),
            volume_stats::price_low.eq(excluded(volume_stats::price_low)),
            volume_stats::buy_volume.eq(excluded(volume_stats::buy_volume)),
            volume_stats::sell_volume.eq(excluded(volume_stats::sell_volume)),
        ))
        .execute(conn)?;
    Ok(())
}

/// Windows for a token and period type, newest first.
pub fn for_token(
    conn: &mut SqliteConnection,
    token_id: &str,
    period_type: PeriodType,
    limit: i64,
) -> Result<Vec<VolumeStatsRow>> {
    let rows: Vec<VolumeStatsRow> = volume_stats::table
        .filter(volume_stats::token_id.eq(token_id))
        .filter(volume_stats::period_type.eq(period_type.as_str()))
        .order(volume_stats::period_start.desc())
        .limit(limit)
        .load(conn)?;
    Ok(rows)
}
