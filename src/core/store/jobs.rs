//! Job run tracking: one row per scheduled invocation, transitioning
//! running → success | failed exactly once.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::core::db::model::{JobRunRow, NewJobRunRow};
use crate::core::db::schema::job_runs;
use crate::core::domain::job::{truncate_error, JobStatus};
use crate::error::Result;

/// Record the start of a run with its correlation id.
pub fn start(
    conn: &mut SqliteConnection,
    job_id: &str,
    run_id: &str,
    now: NaiveDateTime,
) -> Result<()> {
    diesel::insert_into(job_runs::table)
        .values(&NewJobRunRow {
            job_id: job_id.to_string(),
            run_id: run_id.to_string(),
            started_at: now,
            status: JobStatus::Running.as_str().to_string(),
        })
        .execute(conn)?;
    Ok(())
}

/// Mark a run successful.
pub fn mark_success(conn: &mut SqliteConnection, run_id: &str, now: NaiveDateTime) -> Result<()> {
    diesel::update(job_runs::table.filter(job_runs::run_id.eq(run_id)))
        .set((
            job_runs::status.eq(JobStatus::Success.as_str()),
            job_runs::completed_at.eq(now),
        ))
        .execute(conn)?;
    Ok(())
}

/// Mark a run failed with a truncated error message.
pub fn mark_failed(
    conn: &mut SqliteConnection,
    run_id: &str,
    error: &str,
    now: NaiveDateTime,
) -> Result<()> {
    diesel::update(job_runs::table.filter(job_runs::run_id.eq(run_id)))
        .set((
            job_runs::status.eq(JobStatus::Failed.as_str()),
            job_runs::completed_at.eq(now),
            job_runs::error_message.eq(truncate_error(error)),
        ))
        .execute(conn)?;
    Ok(())
}

/// Record how many records a run processed.
pub fn set_records(conn: &mut SqliteConnection, run_id: &str, records: i32) -> Result<()> {
    diesel::update(job_runs::table.filter(job_runs::run_id.eq(run_id)))
        .set(job_runs::records_processed.eq(records))
        .execute(conn)?;
    Ok(())
}

/// Newest run per job id.
pub fn latest_per_job(
    conn: &mut SqliteConnection,
    job_ids: &[&str],
) -> Result<HashMap<String, JobRunRow>> {
    let pairs: Vec<(String, Option<i32>)> = job_runs::table
        .filter(job_runs::job_id.eq_any(job_ids))
        .group_by(job_runs::job_id)
        .select((job_runs::job_id, diesel::dsl::max(job_runs::id)))
        .load(conn)?;
    let ids: Vec<i32> = pairs.into_iter().filter_map(|(_, id)| id).collect();

    let rows: Vec<JobRunRow> = job_runs::table
        .filter(job_runs::id.eq_any(&ids))
        .load(conn)?;
    Ok(rows.into_iter().map(|r| (r.job_id.clone(), r)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::testkit::memory_store;
    use chrono::{Duration, Utc};

    #[test]
    fn run_transitions_to_success_with_timing() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let started = Utc::now().naive_utc();

        start(&mut conn, "collect_markets", "run-1", started).unwrap();
        set_records(&mut conn, "run-1", 42).unwrap();
        mark_success(&mut conn, "run-1", started + Duration::seconds(3)).unwrap();

        let latest = latest_per_job(&mut conn, &["collect_markets"]).unwrap();
        let row = &latest["collect_markets"];
        assert_eq!(row.status, "success");
        assert_eq!(row.records_processed, Some(42));
        assert!(row.completed_at.unwrap() >= row.started_at);
        assert!(row.error_message.is_none());
    }

    #[test]
    fn failed_run_keeps_truncated_error() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let started = Utc::now().naive_utc();

        start(&mut conn, "collect_trades", "run-2", started).unwrap();
        let long_error = "upstream exploded ".repeat(60);
        mark_failed(&mut conn, "run-2", &long_error, started + Duration::seconds(1)).unwrap();

        let latest = latest_per_job(&mut conn, &["collect_trades"]).unwrap();
        let row = &latest["collect_trades"];
        assert_eq!(row.status, "failed");
        let msg = row.error_message.as_ref().unwrap();
        assert_eq!(msg.len(), 500);
    }

    #[test]
    fn latest_per_job_picks_newest_run() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let t0 = Utc::now().naive_utc();

        start(&mut conn, "run_analysis", "old", t0 - Duration::minutes(30)).unwrap();
        mark_success(&mut conn, "old", t0 - Duration::minutes(29)).unwrap();
        start(&mut conn, "run_analysis", "new", t0).unwrap();

        let latest = latest_per_job(&mut conn, &["run_analysis"]).unwrap();
        assert_eq!(latest["run_analysis"].run_id, "new");
        assert_eq!(latest["run_analysis"].status, "running");
    }
}
