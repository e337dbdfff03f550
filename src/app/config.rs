//! Application configuration from environment variables.
//!
//! Deployment passes everything through the environment (a `.env` file is
//! honored in development via `dotenvy`). Missing variables fall back to
//! defaults; malformed values are configuration errors, not silent
//! defaults.

use std::str::FromStr;
use std::time::Duration;

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

use crate::core::exchange::{ClobAuth, RetryPolicy};
use crate::core::retention::RetentionPolicy;
use crate::error::{Error, Result};

/// Analyzer thresholds, wired through to the analysis jobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisThresholds {
    pub arbitrage_min_profit: f64,
    pub volume_spike_threshold: f64,
    pub spread_alert_threshold: f64,
    pub arb_min_liquidity: f64,
}

impl Default for AnalysisThresholds {
    fn default() -> Self {
        Self {
            arbitrage_min_profit: 0.02,
            volume_spike_threshold: 3.0,
            spread_alert_threshold: 0.05,
            arb_min_liquidity: 1000.0,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_pool_size: u32,
    pub gamma_api_url: String,
    pub clob_api_url: String,
    /// CLOB credentials; absence disables authenticated endpoints.
    pub auth: Option<ClobAuth>,
    /// Exactly one deployed process may run the scheduler.
    pub enable_scheduler: bool,
    pub scheduler_interval_minutes: u64,
    pub trade_interval_minutes: u64,
    pub orderbook_concurrency: usize,
    pub retry: RetryPolicy,
    pub retention: RetentionPolicy,
    pub thresholds: AnalysisThresholds,
    pub log_level: String,
    pub log_format: String,
}

fn parse<T: FromStr>(key: &str, raw: String) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value for {key}: {raw:?}")))
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup (tests inject maps here).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn get<T: FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> Result<T> {
            match lookup(key) {
                Some(raw) if !raw.trim().is_empty() => parse(key, raw),
                _ => Ok(default),
            }
        }
        let get_str = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let auth = match (
            lookup("POLY_API_KEY"),
            lookup("POLY_API_SECRET"),
            lookup("POLY_PASSPHRASE"),
            lookup("POLY_ADDRESS"),
        ) {
            (Some(api_key), Some(secret), Some(passphrase), Some(address))
                if !api_key.is_empty()
                    && !secret.is_empty()
                    && !passphrase.is_empty()
                    && !address.is_empty() =>
            {
                Some(ClobAuth {
                    api_key,
                    secret,
                    passphrase,
                    address,
                })
            }
            _ => None,
        };

        let config = Self {
            database_url: get_str("DATABASE_URL", "edgewatch.db"),
            db_pool_size: get(&lookup, "DB_POOL_SIZE", 15)?,
            gamma_api_url: get_str("GAMMA_API_URL", "https://gamma-api.polymarket.com"),
            clob_api_url: get_str("CLOB_API_URL", "https://clob.polymarket.com"),
            auth,
            enable_scheduler: get(&lookup, "ENABLE_SCHEDULER", false)?,
            scheduler_interval_minutes: get(&lookup, "SCHEDULER_INTERVAL_MINUTES", 15)?,
            trade_interval_minutes: get(&lookup, "TRADE_COLLECTION_INTERVAL_MINUTES", 5)?,
            orderbook_concurrency: get(&lookup, "ORDERBOOK_CONCURRENCY", 10)?,
            retry: RetryPolicy {
                max_attempts: get(&lookup, "RETRY_MAX_ATTEMPTS", 3)?,
                base_delay: Duration::from_millis(get(&lookup, "RETRY_BASE_DELAY_MS", 500)?),
                max_delay: Duration::from_millis(get(&lookup, "RETRY_MAX_DELAY_MS", 10_000)?),
            },
            retention: RetentionPolicy {
                orderbook_retention_days: get(&lookup, "ORDERBOOK_RETENTION_DAYS", 7)?,
                trade_retention_days: get(&lookup, "DATA_RETENTION_DAYS", 30)?,
                alert_retention_days: get(&lookup, "ALERT_RETENTION_DAYS", 14)?,
                max_orderbook_rows: get(&lookup, "MAX_ORDERBOOK_ROWS", 500_000)?,
                max_trade_rows: get(&lookup, "MAX_TRADE_ROWS", 1_000_000)?,
            },
            thresholds: AnalysisThresholds {
                arbitrage_min_profit: get(&lookup, "ARBITRAGE_MIN_PROFIT", 0.02)?,
                volume_spike_threshold: get(&lookup, "VOLUME_SPIKE_THRESHOLD", 3.0)?,
                spread_alert_threshold: get(&lookup, "SPREAD_ALERT_THRESHOLD", 0.05)?,
                arb_min_liquidity: get(&lookup, "ARB_MIN_LIQUIDITY", 1000.0)?,
            },
            log_level: get_str("LOG_LEVEL", "info"),
            log_format: get_str("LOG_FORMAT", "pretty"),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            return Err(Error::Config("DATABASE_URL cannot be empty".into()));
        }
        if self.gamma_api_url.is_empty() || self.clob_api_url.is_empty() {
            return Err(Error::Config("upstream API URLs cannot be empty".into()));
        }
        if self.scheduler_interval_minutes == 0 || self.trade_interval_minutes == 0 {
            return Err(Error::Config("scheduler intervals must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.thresholds.arbitrage_min_profit) {
            return Err(Error::Config(
                "ARBITRAGE_MIN_PROFIT must be a fraction in [0, 1)".into(),
            ));
        }
        Ok(())
    }

    /// Install the global tracing subscriber.
    ///
    /// `RUST_LOG` wins when set; otherwise `LOG_LEVEL` applies. `LOG_FORMAT`
    /// selects json or pretty output.
    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.log_level));

        match self.log_format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database_url, "edgewatch.db");
        assert!(!config.enable_scheduler);
        assert_eq!(config.scheduler_interval_minutes, 15);
        assert_eq!(config.trade_interval_minutes, 5);
        assert_eq!(config.orderbook_concurrency, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.auth.is_none());
        assert_eq!(config.thresholds.arbitrage_min_profit, 0.02);
        assert_eq!(config.retention.trade_retention_days, 30);
    }

    #[test]
    fn values_override_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("ENABLE_SCHEDULER", "true"),
            ("SCHEDULER_INTERVAL_MINUTES", "30"),
            ("ORDERBOOK_CONCURRENCY", "3"),
            ("VOLUME_SPIKE_THRESHOLD", "4.5"),
        ]))
        .unwrap();
        assert!(config.enable_scheduler);
        assert_eq!(config.scheduler_interval_minutes, 30);
        assert_eq!(config.orderbook_concurrency, 3);
        assert_eq!(config.thresholds.volume_spike_threshold, 4.5);
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let err = Config::from_lookup(lookup_from(&[("SCHEDULER_INTERVAL_MINUTES", "soon")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Config::from_lookup(lookup_from(&[("ARBITRAGE_MIN_PROFIT", "2.0")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn credentials_require_all_four_parts() {
        let partial = Config::from_lookup(lookup_from(&[
            ("POLY_API_KEY", "key"),
            ("POLY_API_SECRET", "c2VjcmV0"),
        ]))
        .unwrap();
        assert!(partial.auth.is_none());

        let full = Config::from_lookup(lookup_from(&[
            ("POLY_API_KEY", "key"),
            ("POLY_API_SECRET", "c2VjcmV0"),
            ("POLY_PASSPHRASE", "phrase"),
            ("POLY_ADDRESS", "0xabc"),
        ]))
        .unwrap();
        assert!(full.auth.is_some());
    }
}
