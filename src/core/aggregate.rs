//! Volume aggregation: folds raw trades into pre-computed windows.
//!
//! The hourly job aggregates the previous complete hour; at UTC midnight it
//! additionally rolls up the previous day. Windows are upserted on their
//! unique (token, period type, start) key, so re-running a window is safe.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime, Timelike, Utc};
use diesel::SqliteConnection;
use tracing::info;

use crate::core::domain::{PeriodType, VolumeWindow};
use crate::core::store::{stats as stats_store, trades as trade_store, Store};
use crate::error::Result;

/// Start of the previous complete window for a period type.
#[must_use]
pub fn previous_window(now: NaiveDateTime, period: PeriodType) -> (NaiveDateTime, NaiveDateTime) {
    match period {
        PeriodType::Hour => {
            let this_hour = now
                .date()
                .and_hms_opt(now.hour(), 0, 0)
                .unwrap_or(now);
            (this_hour - Duration::hours(1), this_hour)
        }
        PeriodType::Day => {
            let today = now.date().and_hms_opt(0, 0, 0).unwrap_or(now);
            (today - Duration::days(1), today)
        }
        PeriodType::Week => {
            let today = now.date().and_hms_opt(0, 0, 0).unwrap_or(now);
            (today - Duration::weeks(1), today)
        }
    }
}

/// Aggregate one period's window for every (market, token) pair with
/// trades in it. Returns the number of windows written.
pub fn aggregate_period(
    conn: &mut SqliteConnection,
    period: PeriodType,
    now: NaiveDateTime,
) -> Result<usize> {
    let (start, end) = previous_window(now, period);
    let trades = trade_store::between(conn, start, end)?;

    let mut grouped: HashMap<(String, String), Vec<(NaiveDateTime, f64, f64, Option<String>)>> =
        HashMap::new();
    for trade in trades {
        let market_id = trade.market_id.clone().unwrap_or_default();
        grouped
            .entry((market_id, trade.token_id.clone()))
            .or_default()
            .push((trade.timestamp, trade.price, trade.size, trade.side));
    }

    let mut written = 0;
    for ((market_id, token_id), rows) in grouped {
        let window =
            VolumeWindow::from_trades(&market_id, &token_id, rows, start, end, period);
        stats_store::upsert(conn, &stats_store::to_row(&window, now))?;
        written += 1;
    }

    info!(period = %period, windows = written, "Volume aggregation complete");
    Ok(written)
}

/// The hourly aggregation entry point: previous hour always, previous day
/// at UTC midnight.
pub fn run_hourly(store: &Store, now: NaiveDateTime) -> Result<usize> {
    let mut conn = store.conn()?;
    let mut written = aggregate_period(&mut conn, PeriodType::Hour, now)?;
    if now.hour() == 0 {
        written += aggregate_period(&mut conn, PeriodType::Day, now)?;
    }
    Ok(written)
}

/// Convenience for the scheduler.
pub fn run_now(store: &Store) -> Result<usize> {
    run_hourly(store, Utc::now().naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::model::NewTradeRow;
    use crate::core::store::testkit::memory_store;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 7, day)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    fn trade(id: &str, token: &str, at: NaiveDateTime, price: f64, size: f64) -> NewTradeRow {
        NewTradeRow {
            trade_id: Some(id.to_string()),
            token_id: token.to_string(),
            market_id: Some("m1".to_string()),
            price,
            size,
            side: Some("buy".to_string()),
            timestamp: at,
            maker_address: None,
            taker_address: None,
        }
    }

    #[test]
    fn previous_hour_window_is_aligned() {
        let now = ts(10, 14, 23);
        let (start, end) = previous_window(now, PeriodType::Hour);
        assert_eq!(start, ts(10, 13, 0));
        assert_eq!(end, ts(10, 14, 0));

        let (start, end) = previous_window(now, PeriodType::Day);
        assert_eq!(start, ts(9, 0, 0));
        assert_eq!(end, ts(10, 0, 0));
    }

    #[test]
    fn hourly_aggregation_covers_only_the_window() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let token = "tok-0000000001";

        let rows = vec![
            trade("in1", token, ts(10, 13, 10), 0.50, 100.0),
            trade("in2", token, ts(10, 13, 50), 0.54, 60.0),
            trade("outside", token, ts(10, 12, 30), 0.40, 999.0),
        ];
        trade_store::insert_ignore_bulk(&mut conn, &rows).unwrap();

        let written = aggregate_period(&mut conn, PeriodType::Hour, ts(10, 14, 5)).unwrap();
        assert_eq!(written, 1);

        let windows = stats_store::for_token(&mut conn, token, PeriodType::Hour, 5).unwrap();
        assert_eq!(windows.len(), 1);
        assert!((windows[0].volume - 160.0).abs() < 1e-9);
        assert_eq!(windows[0].trade_count, 2);
        assert_eq!(windows[0].price_open, Some(0.50));
        assert_eq!(windows[0].price_close, Some(0.54));
    }

    #[test]
    fn rerunning_a_window_is_idempotent() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let token = "tok-0000000001";

        trade_store::insert_ignore_bulk(
            &mut conn,
            &[trade("t1", token, ts(10, 13, 10), 0.50, 100.0)],
        )
        .unwrap();

        aggregate_period(&mut conn, PeriodType::Hour, ts(10, 14, 5)).unwrap();
        aggregate_period(&mut conn, PeriodType::Hour, ts(10, 14, 25)).unwrap();

        let windows = stats_store::for_token(&mut conn, token, PeriodType::Hour, 5).unwrap();
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn midnight_run_also_writes_the_day() {
        let store = memory_store();
        let token = "tok-0000000001";
        {
            let mut conn = store.conn().unwrap();
            trade_store::insert_ignore_bulk(
                &mut conn,
                &[
                    trade("t1", token, ts(9, 23, 30), 0.50, 100.0),
                    trade("t2", token, ts(9, 11, 0), 0.45, 40.0),
                ],
            )
            .unwrap();
        }

        let written = run_hourly(&store, ts(10, 0, 4)).unwrap();
        assert_eq!(written, 2);

        let mut conn = store.conn().unwrap();
        let hours = stats_store::for_token(&mut conn, token, PeriodType::Hour, 5).unwrap();
        let days = stats_store::for_token(&mut conn, token, PeriodType::Day, 5).unwrap();
        assert_eq!(hours.len(), 1);
        assert_eq!(days.len(), 1);
        assert!((days[0].volume - 140.0).abs() < 1e-9);
    }
}
