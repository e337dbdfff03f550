//! Background job scheduling.
//!
//! One process owns the scheduler (`ENABLE_SCHEDULER=true`); every other
//! deployment serves reads only. Each job invocation is tracked as a
//! JobRun with a UUID correlation id that prefixes its log lines. Shutdown
//! is non-waiting: tasks are aborted and in-flight work is abandoned.

use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{error, info};
use uuid::Uuid;

use crate::app::context::AppContext;
use crate::core::analysis::{run_all, standard_analyzers};
use crate::core::collect::{MarketSync, OrderBookCollector, TradeCollector};
use crate::core::retention::RetentionSweeper;
use crate::core::store::jobs as job_store;
use crate::core::{aggregate, store::Store};
use crate::error::Result;

pub const JOB_COLLECT_MARKETS: &str = "collect_markets";
pub const JOB_COLLECT_ORDERBOOKS: &str = "collect_orderbooks";
pub const JOB_COLLECT_TRADES: &str = "collect_trades";
pub const JOB_RUN_ANALYSIS: &str = "run_analysis";
pub const JOB_AGGREGATE_VOLUME: &str = "aggregate_volume";
pub const JOB_CLEANUP: &str = "cleanup_old_data";

/// Analysis cadence is fixed: arbitrage windows vanish in minutes, so 15
/// minutes is the minimum useful rate.
const ANALYSIS_PERIOD: Duration = Duration::from_secs(15 * 60);

type JobFn = fn(AppContext) -> BoxFuture<'static, Result<usize>>;

/// Handle to the running job set.
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Register the periodic jobs plus the startup one-shots (markets at
    /// T+5s, order books at T+45s, trades at T+60s) so the first analysis
    /// pass has data to look at.
    #[must_use]
    pub fn start(ctx: AppContext) -> Self {
        let interval = Duration::from_secs(ctx.config.scheduler_interval_minutes * 60);
        let trade_interval = Duration::from_secs(ctx.config.trade_interval_minutes * 60);

        let handles = vec![
            spawn_periodic(ctx.clone(), JOB_COLLECT_MARKETS, interval, jobs::markets),
            spawn_periodic(ctx.clone(), JOB_COLLECT_ORDERBOOKS, interval, jobs::orderbooks),
            spawn_periodic(ctx.clone(), JOB_COLLECT_TRADES, trade_interval, jobs::trades),
            spawn_periodic(ctx.clone(), JOB_RUN_ANALYSIS, ANALYSIS_PERIOD, jobs::analysis),
            spawn_periodic(
                ctx.clone(),
                JOB_AGGREGATE_VOLUME,
                Duration::from_secs(60 * 60),
                jobs::aggregate_volume,
            ),
            spawn_periodic(
                ctx.clone(),
                JOB_CLEANUP,
                Duration::from_secs(24 * 60 * 60),
                jobs::cleanup,
            ),
            spawn_once(
                ctx.clone(),
                JOB_COLLECT_MARKETS,
                Duration::from_secs(5),
                jobs::markets,
            ),
            spawn_once(
                ctx.clone(),
                JOB_COLLECT_ORDERBOOKS,
                Duration::from_secs(45),
                jobs::orderbooks,
            ),
            spawn_once(
                ctx,
                JOB_COLLECT_TRADES,
                Duration::from_secs(60),
                jobs::trades,
            ),
        ];

        info!(jobs = handles.len(), "Scheduler started");
        Self { handles }
    }

    /// Abort every job task. In-flight work is abandoned.
    pub fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        info!("Scheduler stopped");
    }
}

fn spawn_periodic(
    ctx: AppContext,
    job_id: &'static str,
    period: Duration,
    job: JobFn,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // First firing is one period out; the startup one-shots cover the
        // initial collection.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_tracked(&ctx, job_id, job).await;
        }
    })
}

fn spawn_once(
    ctx: AppContext,
    job_id: &'static str,
    delay: Duration,
    job: JobFn,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        sleep(delay).await;
        run_tracked(&ctx, job_id, job).await;
    })
}

/// Wrap one invocation in JobRun bookkeeping: insert `running`, run, then
/// mark success (with the records count) or failed (with a truncated
/// message). A failure never escapes to the scheduler loop.
pub async fn run_tracked(ctx: &AppContext, job_id: &'static str, job: JobFn) {
    let run_id = Uuid::new_v4().to_string();
    let short = &run_id[..8];

    let started = Utc::now().naive_utc();
    let start_result = ctx
        .store
        .conn()
        .and_then(|mut conn| job_store::start(&mut conn, job_id, &run_id, started));
    if let Err(err) = start_result {
        error!(job = job_id, run = short, error = %err, "Failed to record job start");
        return;
    }

    info!(job = job_id, run = short, "Starting job");
    match job(ctx.clone()).await {
        Ok(records) => {
            let finished = Utc::now().naive_utc();
            let result = ctx.store.conn().and_then(|mut conn| {
                job_store::set_records(&mut conn, &run_id, records as i32)?;
                job_store::mark_success(&mut conn, &run_id, finished)
            });
            if let Err(err) = result {
                error!(job = job_id, run = short, error = %err, "Failed to record job success");
            }
            info!(job = job_id, run = short, records, "Completed job");
        }
        Err(err) => {
            let finished = Utc::now().naive_utc();
            let record = ctx.store.conn().and_then(|mut conn| {
                job_store::mark_failed(&mut conn, &run_id, &err.to_string(), finished)
            });
            if let Err(db_err) = record {
                error!(job = job_id, run = short, error = %db_err, "Failed to record job failure");
            }
            error!(job = job_id, run = short, error = %err, "Job failed");
        }
    }
}

/// The job bodies, as plain functions so the scheduler can hold them as
/// function pointers.
pub mod jobs {
    use super::*;

    pub fn markets(ctx: AppContext) -> BoxFuture<'static, Result<usize>> {
        Box::pin(async move {
            MarketSync::new(ctx.client.clone(), ctx.store.clone())
                .run()
                .await
        })
    }

    pub fn orderbooks(ctx: AppContext) -> BoxFuture<'static, Result<usize>> {
        Box::pin(async move {
            OrderBookCollector::new(ctx.client.clone(), ctx.store.clone())
                .run()
                .await
        })
    }

    pub fn trades(ctx: AppContext) -> BoxFuture<'static, Result<usize>> {
        Box::pin(async move {
            let outcome = TradeCollector::new(ctx.client.clone(), ctx.store.clone())
                .run()
                .await?;
            Ok(outcome.new_trades)
        })
    }

    /// All five analyzers in parallel, each in its own transaction;
    /// per-analyzer failures are logged without failing the job.
    pub fn analysis(ctx: AppContext) -> BoxFuture<'static, Result<usize>> {
        Box::pin(async move {
            let thresholds = ctx.config.thresholds;
            let analyzers = standard_analyzers(
                thresholds.volume_spike_threshold,
                thresholds.spread_alert_threshold,
                thresholds.arbitrage_min_profit,
                thresholds.arb_min_liquidity,
            );
            let results = run_all(&ctx.store, analyzers).await;
            let total = results
                .iter()
                .filter_map(|(_, result)| result.as_ref().ok())
                .sum();
            Ok(total)
        })
    }

    pub fn aggregate_volume(ctx: AppContext) -> BoxFuture<'static, Result<usize>> {
        Box::pin(async move { aggregate::run_now(&ctx.store) })
    }

    pub fn cleanup(ctx: AppContext) -> BoxFuture<'static, Result<usize>> {
        Box::pin(async move {
            let store: Store = ctx.store.clone();
            let report = RetentionSweeper::new(store, ctx.config.retention).run()?;
            Ok(report.alerts_expired)
        })
    }
}
