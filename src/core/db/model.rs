//! Database row types for Diesel ORM.
//!
//! Tables with autoincrement ids get a `New*` insertable struct and a full
//! queryable row; tables keyed by a natural id use one struct for both.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use super::schema::{
    alerts, job_runs, market_relationships, markets, orderbook_latest_raw, orderbook_snapshots,
    trades, volume_stats,
};

/// Database row for a market (natural string key, insert and query).
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = markets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MarketRow {
    pub id: String,
    pub condition_id: Option<String>,
    pub slug: Option<String>,
    pub question: String,
    pub description: Option<String>,
    /// JSON array of `{name, token_id, price}` outcome records.
    pub outcomes: String,
    pub end_date: Option<NaiveDateTime>,
    pub volume: Option<f64>,
    pub liquidity: Option<f64>,
    pub active: bool,
    pub enable_order_book: bool,
    pub category: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Mutable market columns, applied on conflict during sync upserts.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = markets)]
#[diesel(treat_none_as_null = true)]
pub struct MarketChangeset {
    pub condition_id: Option<String>,
    pub slug: Option<String>,
    pub question: String,
    pub description: Option<String>,
    pub outcomes: String,
    pub end_date: Option<NaiveDateTime>,
    pub volume: Option<f64>,
    pub liquidity: Option<f64>,
    pub active: bool,
    pub enable_order_book: bool,
    pub category: Option<String>,
    pub updated_at: NaiveDateTime,
}

impl From<&MarketRow> for MarketChangeset {
    fn from(row: &MarketRow) -> Self {
        Self {
            condition_id: row.condition_id.clone(),
            slug: row.slug.clone(),
            question: row.question.clone(),
            description: row.description.clone(),
            outcomes: row.outcomes.clone(),
            end_date: row.end_date,
            volume: row.volume,
            liquidity: row.liquidity,
            active: row.active,
            enable_order_book: row.enable_order_book,
            category: row.category.clone(),
            updated_at: row.updated_at,
        }
    }
}

/// Insertable order book snapshot (id assigned by the database).
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = orderbook_snapshots)]
pub struct NewSnapshotRow {
    pub token_id: String,
    pub market_id: Option<String>,
    pub timestamp: NaiveDateTime,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub spread: Option<f64>,
    pub spread_pct: Option<f64>,
    pub mid_price: Option<f64>,
    pub bid_depth_1pct: Option<f64>,
    pub ask_depth_1pct: Option<f64>,
    pub bid_depth_5pct: Option<f64>,
    pub ask_depth_5pct: Option<f64>,
    pub imbalance: Option<f64>,
}

/// Queryable order book snapshot row.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = orderbook_snapshots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SnapshotRow {
    pub id: i32,
    pub token_id: String,
    pub market_id: Option<String>,
    pub timestamp: NaiveDateTime,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub spread: Option<f64>,
    pub spread_pct: Option<f64>,
    pub mid_price: Option<f64>,
    pub bid_depth_1pct: Option<f64>,
    pub ask_depth_1pct: Option<f64>,
    pub bid_depth_5pct: Option<f64>,
    pub ask_depth_5pct: Option<f64>,
    pub imbalance: Option<f64>,
}

/// Latest raw ladder per token (natural key, upserted each fetch).
#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = orderbook_latest_raw)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LatestRawRow {
    pub token_id: String,
    pub market_id: Option<String>,
    pub timestamp: NaiveDateTime,
    /// JSON array of `{price, size}` levels, best first.
    pub bids: String,
    pub asks: String,
}

/// Insertable trade record.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = trades)]
pub struct NewTradeRow {
    pub trade_id: Option<String>,
    pub token_id: String,
    pub market_id: Option<String>,
    pub price: f64,
    pub size: f64,
    pub side: Option<String>,
    pub timestamp: NaiveDateTime,
    pub maker_address: Option<String>,
    pub taker_address: Option<String>,
}

/// Queryable trade row.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = trades)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TradeRow {
    pub id: i32,
    pub trade_id: Option<String>,
    pub token_id: String,
    pub market_id: Option<String>,
    pub price: f64,
    pub size: f64,
    pub side: Option<String>,
    pub timestamp: NaiveDateTime,
    pub maker_address: Option<String>,
    pub taker_address: Option<String>,
}

/// Insertable alert record.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = alerts)]
pub struct NewAlertRow {
    pub alert_type: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub market_id: Option<String>,
    /// JSON array of market ids for cross-market alerts.
    pub related_market_ids: Option<String>,
    /// Tagged-union payload, discriminated by its `type` field.
    pub data: String,
    pub dedup_key: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub dismissed_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
}

/// Queryable alert row.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = alerts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AlertRow {
    pub id: i32,
    pub alert_type: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub market_id: Option<String>,
    pub related_market_ids: Option<String>,
    pub data: String,
    pub dedup_key: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub dismissed_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
}

/// Insertable relationship edge.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = market_relationships)]
pub struct NewRelationshipRow {
    pub relationship_type: String,
    pub parent_market_id: String,
    pub child_market_id: String,
    pub group_id: Option<String>,
    pub notes: Option<String>,
    pub confidence: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Queryable relationship row.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = market_relationships)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RelationshipRow {
    pub id: i32,
    pub relationship_type: String,
    pub parent_market_id: String,
    pub child_market_id: String,
    pub group_id: Option<String>,
    pub notes: Option<String>,
    pub confidence: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Insertable aggregated volume window.
#[derive(Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = volume_stats)]
pub struct NewVolumeStatsRow {
    pub market_id: String,
    pub token_id: String,
    pub period_start: NaiveDateTime,
    pub period_end: NaiveDateTime,
    pub period_type: String,
    pub volume: f64,
    pub trade_count: i32,
    pub avg_trade_size: Option<f64>,
    pub price_open: Option<f64>,
    pub price_close: Option<f64>,
    pub price_high: Option<f64>,
    pub price_low: Option<f64>,
    pub buy_volume: Option<f64>,
    pub sell_volume: Option<f64>,
    pub created_at: NaiveDateTime,
}

/// Queryable aggregated volume window.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = volume_stats)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct VolumeStatsRow {
    pub id: i32,
    pub market_id: String,
    pub token_id: String,
    pub period_start: NaiveDateTime,
    pub period_end: NaiveDateTime,
    pub period_type: String,
    pub volume: f64,
    pub trade_count: i32,
    pub avg_trade_size: Option<f64>,
    pub price_open: Option<f64>,
    pub price_close: Option<f64>,
    pub price_high: Option<f64>,
    pub price_low: Option<f64>,
    pub buy_volume: Option<f64>,
    pub sell_volume: Option<f64>,
    pub created_at: NaiveDateTime,
}

/// Insertable job run record.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = job_runs)]
pub struct NewJobRunRow {
    pub job_id: String,
    pub run_id: String,
    pub started_at: NaiveDateTime,
    pub status: String,
}

/// Queryable job run row.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = job_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobRunRow {
    pub id: i32,
    pub job_id: String,
    pub run_id: String,
    pub started_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub status: String,
    pub error_message: Option<String>,
    pub records_processed: Option<i32>,
}
