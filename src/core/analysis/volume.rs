//! Volume spike detection.
//!
//! Compares the last hour (and the last 15 minutes, for flash moves)
//! against an hourly baseline derived from the previous 23 hours. Thin
//! histories are ignored: a baseline needs at least ten trades.

use std::collections::HashMap;

use diesel::Connection;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::info;

use crate::core::domain::{
    token_dedup_key, volume_severity, Alert, AlertData, AlertKind, MarketId,
};
use crate::core::store::{alerts as alert_store, markets as market_store, trades as trade_store, Store};
use crate::error::Result;

/// Minimum baseline trades for a meaningful ratio.
pub const MIN_BASELINE_TRADES: i64 = 10;

/// Flash ratio threshold: 15-minute volume against a quarter-hour slice of
/// the hourly baseline.
pub const FLASH_SPIKE_THRESHOLD: f64 = 5.0;

/// Detects tokens trading far above their own recent baseline.
pub struct VolumeAnalyzer {
    threshold: f64,
    recent_window: Duration,
    baseline_window: Duration,
    flash_window: Duration,
}

/// Outcome of the spike check for one token.
#[derive(Debug, Clone, PartialEq)]
pub struct Spike {
    pub ratio: f64,
    pub spike_kind: &'static str,
    pub recent_volume: f64,
    pub hourly_avg: f64,
}

/// Pure spike decision for one token's windows.
///
/// The standard condition compares the last hour to the hourly baseline;
/// the flash condition compares the last 15 minutes to a quarter of it.
/// Whichever ratio is larger names and sizes the alert.
#[must_use]
pub fn detect_spike(
    recent_volume: f64,
    flash_volume: f64,
    baseline_volume: f64,
    baseline_count: i64,
    baseline_hours: f64,
    threshold: f64,
) -> Option<Spike> {
    if baseline_count < MIN_BASELINE_TRADES {
        return None;
    }
    if baseline_hours <= 0.0 {
        return None;
    }
    let hourly_avg = baseline_volume / baseline_hours;
    if hourly_avg <= 0.0 {
        return None;
    }

    let standard_ratio = recent_volume / hourly_avg;
    let flash_ratio = flash_volume / (hourly_avg / 4.0);

    let standard_fired = standard_ratio >= threshold;
    let flash_fired = !standard_fired && flash_ratio >= FLASH_SPIKE_THRESHOLD;
    if !standard_fired && !flash_fired {
        return None;
    }

    let (ratio, spike_kind, volume) = if flash_ratio > standard_ratio {
        (flash_ratio, "flash_spike", flash_volume)
    } else {
        (standard_ratio, "standard_spike", recent_volume)
    };

    Some(Spike {
        ratio,
        spike_kind,
        recent_volume: volume,
        hourly_avg,
    })
}

impl VolumeAnalyzer {
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            recent_window: Duration::hours(1),
            baseline_window: Duration::hours(24),
            flash_window: Duration::minutes(15),
        }
    }
}

#[async_trait]
impl super::Analyzer for VolumeAnalyzer {
    fn name(&self) -> &'static str {
        "volume"
    }

    async fn analyze(&self, store: &Store) -> Result<usize> {
        let now = Utc::now().naive_utc();
        let mut conn = store.conn()?;

        conn.transaction(|conn| {
            let markets = market_store::active(conn)?;
            let mut token_to_market: HashMap<String, MarketId> = HashMap::new();
            for market in &markets {
                for token in market.token_ids() {
                    token_to_market.insert(token.to_string(), market.id.clone());
                }
            }
            if token_to_market.is_empty() {
                return Ok(0);
            }

            let tokens: Vec<String> = token_to_market.keys().cloned().collect();
            let recent_start = now - self.recent_window;
            let baseline_start = now - self.baseline_window;
            let flash_start = now - self.flash_window;

            let recent = trade_store::volume_by_token(conn, &tokens, recent_start, now)?;
            let flash = trade_store::volume_by_token(conn, &tokens, flash_start, now)?;
            let baseline =
                trade_store::baseline_by_token(conn, &tokens, baseline_start, recent_start)?;

            let existing = alert_store::active_dedup_keys(conn, AlertKind::VolumeSpike)?;
            let baseline_hours =
                (self.baseline_window - self.recent_window).num_minutes() as f64 / 60.0;

            let mut created = 0;
            for (token, market_id) in &token_to_market {
                let (baseline_volume, baseline_count) =
                    baseline.get(token).copied().unwrap_or((0.0, 0));
                let Some(spike) = detect_spike(
                    recent.get(token).copied().unwrap_or(0.0),
                    flash.get(token).copied().unwrap_or(0.0),
                    baseline_volume,
                    baseline_count,
                    baseline_hours,
                    self.threshold,
                ) else {
                    continue;
                };

                let dedup_key = token_dedup_key(market_id, token);
                if existing.contains(&dedup_key) {
                    continue;
                }

                let alert = Alert::for_market(
                    AlertKind::VolumeSpike,
                    volume_severity(spike.ratio),
                    market_id.clone(),
                    format!("Volume spike: {:.1}x normal", spike.ratio),
                    format!(
                        "Token traded ${:.0} against an hourly average of ${:.0}",
                        spike.recent_volume, spike.hourly_avg
                    ),
                    AlertData::VolumeSpike {
                        token_id: token.clone(),
                        current_volume: spike.recent_volume,
                        average_volume: spike.hourly_avg,
                        ratio: spike.ratio,
                        spike_kind: spike.spike_kind.to_string(),
                    },
                    dedup_key,
                );
                if alert_store::insert(conn, &alert, now)? {
                    info!(market = %market_id, token = %token, ratio = spike.ratio, "Volume spike detected");
                    created += 1;
                }
            }
            Ok(created)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thin_baseline_is_ignored() {
        assert!(detect_spike(100.0, 50.0, 90.0, 9, 23.0, 3.0).is_none());
    }

    #[test]
    fn standard_spike_fires_at_threshold() {
        // Baseline 230 over 23h -> hourly 10; recent 30 -> ratio 3.0.
        let spike = detect_spike(30.0, 0.0, 230.0, 23, 23.0, 3.0).unwrap();
        assert_eq!(spike.spike_kind, "standard_spike");
        assert!((spike.ratio - 3.0).abs() < 1e-9);

        assert!(detect_spike(29.0, 0.0, 230.0, 23, 23.0, 3.0).is_none());
    }

    #[test]
    fn flash_spike_uses_quarter_hour_baseline() {
        // 23 baseline trades of size 10 over 23h: hourly_avg = 10.
        // Flash window holds 5 trades of size 10: flash volume 50,
        // quarter-hour baseline 2.5, flash ratio 20.
        let spike = detect_spike(50.0, 50.0, 230.0, 23, 23.0, 3.0).unwrap();
        assert_eq!(spike.spike_kind, "flash_spike");
        assert!((spike.ratio - 20.0).abs() < 1e-9);
    }

    #[test]
    fn flash_below_its_threshold_does_not_fire() {
        // Recent ratio 1.0 (no standard spike); flash ratio 4.0 < 5.0.
        assert!(detect_spike(10.0, 10.0, 230.0, 23, 23.0, 3.0).is_none());
    }

    #[test]
    fn larger_ratio_names_the_alert() {
        // Standard fires at 5.0, but the flash ratio 20 is larger and wins.
        let spike = detect_spike(50.0, 50.0, 230.0, 23, 23.0, 3.0).unwrap();
        assert_eq!(spike.spike_kind, "flash_spike");

        // Standard fires and the flash window is quiet: standard wins.
        let spike = detect_spike(50.0, 2.0, 230.0, 23, 23.0, 3.0).unwrap();
        assert_eq!(spike.spike_kind, "standard_spike");
        assert!((spike.ratio - 5.0).abs() < 1e-9);
    }

    #[test]
    fn zero_baseline_volume_is_ignored() {
        assert!(detect_spike(50.0, 10.0, 0.0, 20, 23.0, 3.0).is_none());
    }
}
