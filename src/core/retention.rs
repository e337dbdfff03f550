//! The retention sweeper: expiry, TTL deletes, row caps, and storage
//! reclaim.
//!
//! All mutations run in one transaction; VACUUM/ANALYZE runs afterwards on
//! a plain connection because SQLite refuses to vacuum inside one.

use chrono::{Duration, Utc};
use diesel::Connection;
use tracing::{info, warn};

use crate::core::store::{alerts as alert_store, maintenance, Store};
use crate::error::Result;

/// Per-table retention windows and hard row caps.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub orderbook_retention_days: i64,
    pub trade_retention_days: i64,
    pub alert_retention_days: i64,
    pub max_orderbook_rows: i64,
    pub max_trade_rows: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            orderbook_retention_days: 7,
            trade_retention_days: 30,
            alert_retention_days: 14,
            max_orderbook_rows: 500_000,
            max_trade_rows: 1_000_000,
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub alerts_expired: usize,
    pub snapshots_deleted: usize,
    pub trades_deleted: usize,
    pub alerts_deleted: usize,
    pub capped_snapshots: usize,
    pub capped_trades: usize,
}

impl SweepReport {
    #[must_use]
    pub fn total_removed(&self) -> usize {
        self.snapshots_deleted
            + self.trades_deleted
            + self.alerts_deleted
            + self.capped_snapshots
            + self.capped_trades
    }
}

/// Keeps the store bounded.
pub struct RetentionSweeper {
    store: Store,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    #[must_use]
    pub fn new(store: Store, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// One sweep: expire due alerts, apply TTLs, enforce row caps, then
    /// reclaim storage and log table sizes.
    pub fn run(&self) -> Result<SweepReport> {
        let now = Utc::now().naive_utc();
        let policy = self.policy;

        let mut conn = self.store.conn()?;
        let report = conn.transaction(|conn| {
            let alerts_expired = alert_store::expire_due(conn, now)?;

            let snapshots_deleted = maintenance::delete_snapshots_before(
                conn,
                now - Duration::days(policy.orderbook_retention_days),
            )?;
            let trades_deleted = maintenance::delete_trades_before(
                conn,
                now - Duration::days(policy.trade_retention_days),
            )?;
            let alerts_deleted = maintenance::delete_dismissed_alerts_before(
                conn,
                now - Duration::days(policy.alert_retention_days),
            )?;

            let capped_snapshots = maintenance::cap_snapshots(conn, policy.max_orderbook_rows)?;
            let capped_trades = maintenance::cap_trades(conn, policy.max_trade_rows)?;
            if capped_snapshots > 0 || capped_trades > 0 {
                warn!(
                    capped_snapshots,
                    capped_trades, "Row caps enforced; oldest rows dropped"
                );
            }

            Ok::<_, crate::error::Error>(SweepReport {
                alerts_expired,
                snapshots_deleted,
                trades_deleted,
                alerts_deleted,
                capped_snapshots,
                capped_trades,
            })
        })?;

        // Storage reclaim cannot run inside the transaction above.
        if let Err(err) = maintenance::vacuum_analyze(&mut conn) {
            warn!(error = %err, "Storage reclaim failed (non-fatal)");
        }

        let snapshots = maintenance::snapshot_count(&mut conn).unwrap_or(-1);
        let trades = maintenance::trade_count(&mut conn).unwrap_or(-1);
        let alerts = maintenance::alert_count(&mut conn).unwrap_or(-1);
        let bytes = maintenance::database_bytes(&mut conn).unwrap_or(-1);
        info!(
            expired = report.alerts_expired,
            removed = report.total_removed(),
            snapshots,
            trades,
            alerts,
            db_bytes = bytes,
            "Cleanup complete"
        );

        Ok(report)
    }
}
