//! Alert persistence.
//!
//! The at-most-one-active-per-key invariant is enforced by a partial unique
//! index on `(alert_type, dedup_key) WHERE is_active`. Inserts run under a
//! savepoint and treat a unique violation as "another run created it".

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::core::db::model::{AlertRow, NewAlertRow};
use crate::core::db::schema::alerts;
use crate::core::domain::{Alert, AlertKind};
use crate::error::{Error, Result};

/// Serialize an alert for insertion.
pub fn to_row(alert: &Alert, now: NaiveDateTime) -> Result<NewAlertRow> {
    debug_assert!(alert.targets_are_consistent());
    let related = if alert.related_market_ids.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&alert.related_market_ids)?)
    };
    Ok(NewAlertRow {
        alert_type: alert.kind.as_str().to_string(),
        severity: alert.severity.as_str().to_string(),
        title: alert.title.clone(),
        description: alert.description.clone(),
        market_id: alert.market_id.as_ref().map(ToString::to_string),
        related_market_ids: related,
        data: serde_json::to_string(&alert.data)?,
        dedup_key: alert.dedup_key.clone(),
        is_active: true,
        created_at: now,
        dismissed_at: None,
        expires_at: alert.expires_at,
    })
}

/// Insert one alert under a savepoint.
///
/// Returns `Ok(true)` when inserted, `Ok(false)` when an active alert with
/// the same (kind, dedup key) already exists (insertion race or dedup miss).
pub fn insert(conn: &mut SqliteConnection, alert: &Alert, now: NaiveDateTime) -> Result<bool> {
    let row = to_row(alert, now)?;
    let result: std::result::Result<usize, diesel::result::Error> =
        conn.transaction(|conn| diesel::insert_into(alerts::table).values(&row).execute(conn));
    match result.map_err(Error::from) {
        Ok(_) => Ok(true),
        Err(Error::Conflict(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Dedup keys of currently-active alerts of one kind.
pub fn active_dedup_keys(
    conn: &mut SqliteConnection,
    kind: AlertKind,
) -> Result<HashSet<String>> {
    let keys: Vec<String> = alerts::table
        .filter(alerts::alert_type.eq(kind.as_str()))
        .filter(alerts::is_active.eq(true))
        .select(alerts::dedup_key)
        .load(conn)?;
    Ok(keys.into_iter().collect())
}

/// Deactivate alerts whose `expires_at` has passed. Returns the count.
pub fn expire_due(conn: &mut SqliteConnection, now: NaiveDateTime) -> Result<usize> {
    let updated = diesel::update(
        alerts::table
            .filter(alerts::is_active.eq(true))
            .filter(alerts::expires_at.lt(now)),
    )
    .set((alerts::is_active.eq(false), alerts::dismissed_at.eq(now)))
    .execute(conn)?;
    Ok(updated)
}

/// Dismiss a single alert. Returns false when it was not active.
pub fn dismiss(conn: &mut SqliteConnection, alert_id: i32, now: NaiveDateTime) -> Result<bool> {
    let updated = diesel::update(
        alerts::table
            .find(alert_id)
            .filter(alerts::is_active.eq(true)),
    )
    .set((alerts::is_active.eq(false), alerts::dismissed_at.eq(now)))
    .execute(conn)?;
    Ok(updated > 0)
}

/// Textual JSON-array containment: true when `related_market_ids` contains
/// the quoted market id. SQLite has no native array-containment operator,
/// so the serialized list is matched on its quoted element.
fn related_pattern(market_id: &str) -> String {
    format!("%\"{market_id}\"%")
}

/// Distinct active alert kinds targeting a market, via `market_id` or
/// membership in `related_market_ids`.
pub fn signals_for_market(
    conn: &mut SqliteConnection,
    market_id: &str,
) -> Result<Vec<String>> {
    let kinds: Vec<String> = alerts::table
        .filter(alerts::is_active.eq(true))
        .filter(
            alerts::market_id
                .eq(market_id)
                .or(alerts::related_market_ids.like(related_pattern(market_id))),
        )
        .select(alerts::alert_type)
        .distinct()
        .load(conn)?;
    Ok(kinds)
}

/// All active alerts' targeting info in one query: distinct alert kinds per
/// market id, expanding cross-market alerts into each related market.
pub fn active_signal_map(conn: &mut SqliteConnection) -> Result<HashMap<String, HashSet<String>>> {
    let rows: Vec<(Option<String>, String, Option<String>)> = alerts::table
        .filter(alerts::is_active.eq(true))
        .select((
            alerts::market_id,
            alerts::alert_type,
            alerts::related_market_ids,
        ))
        .load(conn)?;

    let mut map: HashMap<String, HashSet<String>> = HashMap::new();
    for (market_id, kind, related) in rows {
        if let Some(market_id) = market_id {
            map.entry(market_id).or_default().insert(kind.clone());
        }
        if let Some(related) = related {
            if let Ok(ids) = serde_json::from_str::<Vec<String>>(&related) {
                for id in ids {
                    map.entry(id).or_default().insert(kind.clone());
                }
            }
        }
    }
    Ok(map)
}

/// Every market id referenced by an active alert of `kind` through its
/// related-market list, flattened.
pub fn active_related_ids(
    conn: &mut SqliteConnection,
    kind: AlertKind,
) -> Result<HashSet<String>> {
    let rows: Vec<Option<String>> = alerts::table
        .filter(alerts::alert_type.eq(kind.as_str()))
        .filter(alerts::is_active.eq(true))
        .select(alerts::related_market_ids)
        .load(conn)?;

    let mut ids = HashSet::new();
    for row in rows.into_iter().flatten() {
        if let Ok(parsed) = serde_json::from_str::<Vec<String>>(&row) {
            ids.extend(parsed);
        }
    }
    Ok(ids)
}

/// All currently-active alert rows of one kind.
pub fn active_by_kind(conn: &mut SqliteConnection, kind: AlertKind) -> Result<Vec<AlertRow>> {
    let rows: Vec<AlertRow> = alerts::table
        .filter(alerts::alert_type.eq(kind.as_str()))
        .filter(alerts::is_active.eq(true))
        .order(alerts::created_at.desc())
        .load(conn)?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        token_dedup_key, AlertData, MarketId, PriceSource, Severity,
    };
    use crate::core::store::testkit::memory_store;
    use chrono::{Duration, Utc};

    fn spread_alert(market: &str, token: &str) -> Alert {
        Alert::for_market(
            AlertKind::SpreadAlert,
            Severity::Medium,
            MarketId::new(market),
            "Wide spread",
            "spread too wide",
            AlertData::SpreadAlert {
                token_id: token.into(),
                spread: Some(0.05),
                spread_pct: 0.08,
                best_bid: Some(0.45),
                best_ask: Some(0.50),
                snapshot_age_seconds: 30.0,
            },
            token_dedup_key(&MarketId::new(market), token),
        )
    }

    fn cross_alert(markets: &[&str], key: &str) -> Alert {
        Alert::for_related(
            AlertKind::Arbitrage,
            Severity::Medium,
            markets.iter().map(|m| MarketId::new(*m)).collect(),
            "Cross-market",
            "desc",
            AlertData::Conditional {
                parent_market_id: markets[0].into(),
                parent_price: 0.4,
                child_market_id: markets[1].into(),
                child_price: 0.5,
                profit_estimate: 0.1,
                strategy: "buy_parent_sell_child".into(),
            },
            key.into(),
        )
    }

    #[test]
    fn duplicate_active_key_is_rejected_not_fatal() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let now = Utc::now().naive_utc();

        let alert = spread_alert("m1", "tok-0000000001");
        assert!(insert(&mut conn, &alert, now).unwrap());
        assert!(!insert(&mut conn, &alert, now).unwrap());

        let keys = active_dedup_keys(&mut conn, AlertKind::SpreadAlert).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains("m1:tok-0000000001"));
    }

    #[test]
    fn same_key_allowed_after_dismissal() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let now = Utc::now().naive_utc();

        let alert = spread_alert("m1", "tok-0000000001");
        assert!(insert(&mut conn, &alert, now).unwrap());

        let row = &active_by_kind(&mut conn, AlertKind::SpreadAlert).unwrap()[0];
        assert!(dismiss(&mut conn, row.id, now).unwrap());
        assert!(!dismiss(&mut conn, row.id, now).unwrap());

        assert!(insert(&mut conn, &alert, now).unwrap());
    }

    #[test]
    fn expiry_deactivates_due_alerts() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let now = Utc::now().naive_utc();

        let mut expiring = cross_alert(&["a", "b"], "conditional-a-b");
        expiring.expires_at = Some(now - Duration::minutes(1));
        insert(&mut conn, &expiring, now - Duration::minutes(40)).unwrap();

        let mut fresh = cross_alert(&["c", "d"], "conditional-c-d");
        fresh.expires_at = Some(now + Duration::minutes(30));
        insert(&mut conn, &fresh, now).unwrap();

        assert_eq!(expire_due(&mut conn, now).unwrap(), 1);
        let keys = active_dedup_keys(&mut conn, AlertKind::Arbitrage).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains("conditional-c-d"));
    }

    #[test]
    fn signals_union_direct_and_related() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let now = Utc::now().naive_utc();

        insert(&mut conn, &spread_alert("m1", "tok-0000000001"), now).unwrap();
        insert(&mut conn, &cross_alert(&["m1", "m2"], "conditional-m1-m2"), now).unwrap();

        let mut kinds = signals_for_market(&mut conn, "m1").unwrap();
        kinds.sort();
        assert_eq!(kinds, vec!["arbitrage", "spread_alert"]);

        let kinds = signals_for_market(&mut conn, "m2").unwrap();
        assert_eq!(kinds, vec!["arbitrage"]);

        let map = active_signal_map(&mut conn).unwrap();
        assert_eq!(map["m1"].len(), 2);
        assert_eq!(map["m2"].len(), 1);
    }

    #[test]
    fn intra_alert_payload_round_trips() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let now = Utc::now().naive_utc();

        let alert = Alert::for_related(
            AlertKind::Arbitrage,
            Severity::High,
            vec![MarketId::new("m9")],
            "Arbitrage: 8.0% profit",
            "buy both sides",
            AlertData::IntraMarket {
                outcome1_name: "Yes".into(),
                outcome1_price: 0.45,
                outcome1_token_id: "tok-a-00000001".into(),
                outcome2_name: "No".into(),
                outcome2_price: 0.47,
                outcome2_token_id: "tok-b-00000001".into(),
                total: 0.92,
                profit_estimate: 0.08,
                strategy: "buy_both_sides".into(),
                price_source: PriceSource::Orderbook,
            },
            "m9".into(),
        );
        insert(&mut conn, &alert, now).unwrap();

        let row = &active_by_kind(&mut conn, AlertKind::Arbitrage).unwrap()[0];
        let data: AlertData = serde_json::from_str(&row.data).unwrap();
        assert!(matches!(data, AlertData::IntraMarket { .. }));
        assert_eq!(row.related_market_ids.as_deref(), Some(r#"["m9"]"#));
        assert!(row.market_id.is_none());
    }
}
