//! Market sync: fetch all active markets and upsert them.

use std::sync::Arc;

use diesel::Connection;

use chrono::Utc;
use tracing::{info, warn};

use crate::core::db::model::MarketRow;
use crate::core::domain::{Market, MarketId};
use crate::core::exchange::dto::MarketDto;
use crate::core::exchange::UpstreamClient;
use crate::core::store::{markets as market_store, Store};
use crate::error::Result;

/// Syncs the market universe from the metadata API into the store.
pub struct MarketSync {
    client: Arc<UpstreamClient>,
    store: Store,
}

/// Build a domain market from an upstream record.
///
/// Outcomes with token ids shorter than the CLOB minimum are dropped.
/// `enable_order_book` holds only when the market kept valid tokens, the
/// upstream order-book and accepting-orders flags are set, and the market
/// is not closed. Returns `None` for records without a usable id.
#[must_use]
pub fn build_market(dto: &MarketDto) -> Option<Market> {
    let id = dto.market_id()?.to_string();

    let outcomes: Vec<_> = dto
        .derive_outcomes()
        .into_iter()
        .filter(|o| o.has_valid_token())
        .collect();

    let closed = dto.closed.unwrap_or(false);
    let has_valid_tokens = !outcomes.is_empty();
    let enable_order_book = has_valid_tokens
        && dto.enable_order_book.unwrap_or(true)
        && dto.accepting_orders.unwrap_or(true)
        && !closed;

    Some(Market {
        id: MarketId::new(id),
        condition_id: dto.condition_id.clone().filter(|s| !s.is_empty()),
        slug: dto.slug.clone().filter(|s| !s.is_empty()),
        question: dto
            .question
            .clone()
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        description: dto.description.clone().filter(|s| !s.is_empty()),
        outcomes,
        end_date: dto.parse_end_date(),
        volume: dto.volume_f64(),
        liquidity: dto.liquidity_f64(),
        active: dto.active.unwrap_or(true) && !closed,
        enable_order_book,
        category: dto.category.clone().filter(|s| !s.is_empty()),
    })
}

impl MarketSync {
    #[must_use]
    pub fn new(client: Arc<UpstreamClient>, store: Store) -> Self {
        Self { client, store }
    }

    /// Fetch, transform, and upsert all active markets.
    ///
    /// Every existing market first has `enable_order_book` cleared so the
    /// upsert re-enables only currently tradeable ones. The bulk upsert and
    /// the flag reset share one transaction; on bulk failure the sync rolls
    /// back and retries row by row.
    pub async fn run(&self) -> Result<usize> {
        let dtos = self.client.all_markets().await?;

        let now = Utc::now().naive_utc();
        let mut skipped = 0_usize;
        let mut rows: Vec<MarketRow> = Vec::with_capacity(dtos.len());
        for dto in &dtos {
            match build_market(dto) {
                Some(market) => rows.push(market_store::to_row(&market, now)?),
                None => skipped += 1,
            }
        }

        let mut conn = self.store.conn()?;
        let bulk: Result<usize> = conn.transaction(|conn| {
            market_store::reset_order_book_flags(conn)?;
            market_store::upsert_bulk(conn, &rows)
        });

        let count = match bulk {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "Bulk market upsert failed, falling back to per-row path");
                conn.transaction(|conn| market_store::reset_order_book_flags(conn))?;
                market_store::upsert_each(&mut conn, &rows)?
            }
        };

        info!(synced = count, skipped, "Market sync complete");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dto(value: serde_json::Value) -> MarketDto {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn record_without_id_is_skipped() {
        assert!(build_market(&dto(json!({"question": "No id?"}))).is_none());
    }

    #[test]
    fn short_token_ids_are_filtered() {
        let market = build_market(&dto(json!({
            "id": "m1",
            "question": "Q?",
            "tokens": [
                {"token_id": "tok-good-000001", "outcome": "Yes"},
                {"token_id": "bad", "outcome": "No"},
            ],
        })))
        .unwrap();
        assert_eq!(market.outcomes.len(), 1);
        assert_eq!(market.outcomes[0].name, "Yes");
    }

    #[test]
    fn order_book_flag_composition() {
        // All conditions met.
        let enabled = build_market(&dto(json!({
            "id": "m1",
            "question": "Q?",
            "active": true,
            "closed": false,
            "enableOrderBook": true,
            "acceptingOrders": true,
            "tokens": [
                {"token_id": "tok-a-00000001", "outcome": "Yes"},
                {"token_id": "tok-b-00000001", "outcome": "No"},
            ],
        })))
        .unwrap();
        assert!(enabled.enable_order_book);

        // Upstream not accepting orders.
        let not_accepting = build_market(&dto(json!({
            "id": "m2",
            "question": "Q?",
            "acceptingOrders": false,
            "tokens": [{"token_id": "tok-a-00000001", "outcome": "Yes"}],
        })))
        .unwrap();
        assert!(!not_accepting.enable_order_book);

        // Closed market.
        let closed = build_market(&dto(json!({
            "id": "m3",
            "question": "Q?",
            "closed": true,
            "tokens": [{"token_id": "tok-a-00000001", "outcome": "Yes"}],
        })))
        .unwrap();
        assert!(!closed.enable_order_book);
        assert!(!closed.active);

        // No valid tokens.
        let no_tokens = build_market(&dto(json!({"id": "m4", "question": "Q?"}))).unwrap();
        assert!(!no_tokens.enable_order_book);
    }

    #[test]
    fn question_defaults_when_missing() {
        let market = build_market(&dto(json!({"id": "m1"}))).unwrap();
        assert_eq!(market.question, "Unknown");
    }
}
