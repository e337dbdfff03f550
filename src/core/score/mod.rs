//! Safety scoring: composes freshness, liquidity, spread, and signal
//! alignment into a 0-100 score with an explanation.
//!
//! Two profiles exist: the strict default, and a relaxed "learning" profile
//! used to supply fallback picks once the strict list is exhausted.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::SqliteConnection;

use crate::core::domain::{Market, Outcome, SlippageEstimate};
use crate::core::store::{
    alerts as alert_store, markets as market_store, orderbooks as book_store,
    trades as trade_store,
};
use crate::error::Result;

/// Dollar size used for the reference slippage estimate.
pub const SLIPPAGE_PROBE_DOLLARS: f64 = 100.0;

/// Baseline trades required before a volume ratio is meaningful.
pub const MIN_BASELINE_TRADES: i64 = 10;

/// Threshold profile for classifying a market as safe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyProfile {
    pub max_freshness_minutes: f64,
    pub min_depth: f64,
    pub max_spread: f64,
    pub min_signals: usize,
}

impl SafetyProfile {
    /// Strict defaults for the headline safe list.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            max_freshness_minutes: 30.0,
            min_depth: 500.0,
            max_spread: 0.05,
            min_signals: 2,
        }
    }

    /// Relaxed profile for learning picks.
    #[must_use]
    pub const fn learning() -> Self {
        Self {
            max_freshness_minutes: 60.0,
            min_depth: 300.0,
            max_spread: 0.07,
            min_signals: 1,
        }
    }
}

/// Raw metrics feeding the score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SafetyMetrics {
    pub last_trade_time: Option<NaiveDateTime>,
    pub last_orderbook_time: Option<NaiveDateTime>,
    pub freshness_minutes: Option<f64>,
    pub bid_depth_1pct: f64,
    pub ask_depth_1pct: f64,
    pub total_depth: f64,
    pub spread_pct: Option<f64>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub slippage_100: Option<f64>,
    pub active_signals: Vec<String>,
}

impl SafetyMetrics {
    #[must_use]
    pub fn signal_count(&self) -> usize {
        self.active_signals.len()
    }
}

/// Component breakdown of a computed score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentScores {
    pub freshness: i32,
    pub liquidity: i32,
    pub spread: i32,
    pub alignment: i32,
}

impl ComponentScores {
    #[must_use]
    pub const fn total(self) -> i32 {
        self.freshness + self.liquidity + self.spread + self.alignment
    }
}

/// A scored market with threshold flags and explanations.
#[derive(Debug, Clone)]
pub struct SafetyScore {
    pub total: i32,
    pub components: ComponentScores,
    pub metrics: SafetyMetrics,
    pub why_safe: String,
    pub what_could_go_wrong: String,
    pub passes_freshness: bool,
    pub passes_liquidity: bool,
    pub passes_spread: bool,
    pub passes_alignment: bool,
}

impl SafetyScore {
    /// Safe requires every threshold to hold at once.
    #[must_use]
    pub fn is_safe(&self) -> bool {
        self.passes_freshness && self.passes_liquidity && self.passes_spread && self.passes_alignment
    }
}

/// A ranked opportunity from the batch path.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub market_id: String,
    pub question: String,
    pub category: Option<String>,
    pub outcomes: Vec<Outcome>,
    pub score: SafetyScore,
    pub recent_price_move_pct: Option<f64>,
    pub last_updated: NaiveDateTime,
}

/// Freshness component: 30 under 15 minutes, 20 under 30, else 0.
#[must_use]
pub fn score_freshness(freshness_minutes: Option<f64>) -> i32 {
    match freshness_minutes {
        Some(minutes) if minutes < 15.0 => 30,
        Some(minutes) if minutes < 30.0 => 20,
        _ => 0,
    }
}

/// Liquidity component over total 1% depth: 30 at $2000, 20 at $500.
#[must_use]
pub fn score_liquidity(total_depth: f64) -> i32 {
    if total_depth >= 2000.0 {
        30
    } else if total_depth >= 500.0 {
        20
    } else {
        0
    }
}

/// Spread component: 20 under 3%, 10 under 5%.
#[must_use]
pub fn score_spread(spread_pct: Option<f64>) -> i32 {
    match spread_pct {
        Some(pct) if pct < 0.03 => 20,
        Some(pct) if pct < 0.05 => 10,
        _ => 0,
    }
}

/// Alignment component over DISTINCT active alert kinds: 20 at two or
/// more, 10 at one.
#[must_use]
pub fn score_alignment(signal_count: usize) -> i32 {
    match signal_count {
        0 => 0,
        1 => 10,
        _ => 20,
    }
}

fn explain_why_safe(metrics: &SafetyMetrics, total: i32) -> String {
    let mut reasons = Vec::new();
    match metrics.freshness_minutes {
        Some(minutes) if minutes < 15.0 => {
            reasons.push("Data is very fresh (updated within 15 minutes).".to_string());
        }
        Some(minutes) if minutes < 30.0 => {
            reasons.push("Data is recent (updated within 30 minutes).".to_string());
        }
        _ => {}
    }
    if metrics.total_depth >= 2000.0 {
        reasons.push(format!("High liquidity (${:.0} depth).", metrics.total_depth));
    } else if metrics.total_depth >= 500.0 {
        reasons.push(format!("Good liquidity (${:.0} depth).", metrics.total_depth));
    }
    match metrics.spread_pct {
        Some(pct) if pct < 0.03 => reasons.push(format!("Tight spread ({:.1}%).", pct * 100.0)),
        Some(pct) if pct < 0.05 => {
            reasons.push(format!("Reasonable spread ({:.1}%).", pct * 100.0));
        }
        _ => {}
    }
    match metrics.signal_count() {
        0 => {}
        1 => reasons.push(format!("One confirming signal ({}).", metrics.active_signals[0])),
        _ => reasons.push(format!(
            "Multiple signals align ({}).",
            metrics.active_signals.join(", ")
        )),
    }
    if reasons.is_empty() {
        return "This market meets basic safety criteria.".to_string();
    }
    format!("{} Safety score: {total}/100.", reasons.join(" "))
}

fn explain_risks(metrics: &SafetyMetrics) -> String {
    let mut risks = Vec::new();
    if metrics.freshness_minutes.map_or(true, |m| m > 15.0) {
        risks.push("Data may have changed since the last update");
    }
    if metrics.total_depth < 1000.0 {
        risks.push("Limited liquidity could cause slippage on larger orders");
    }
    if metrics.spread_pct.map_or(true, |p| p > 0.03) {
        risks.push("The spread reduces profit margin");
    }
    if metrics.signal_count() < 2 {
        risks.push("Limited signal confirmation");
    }
    risks.push("Market conditions can change quickly");
    risks.push("Past patterns don't guarantee future results");
    let mut text = risks[..risks.len().min(3)].join(". ");
    text.push('.');
    text
}

/// Compose metrics into a full score under a threshold profile.
#[must_use]
pub fn compose(metrics: SafetyMetrics, profile: &SafetyProfile) -> SafetyScore {
    let components = ComponentScores {
        freshness: score_freshness(metrics.freshness_minutes),
        liquidity: score_liquidity(metrics.total_depth),
        spread: score_spread(metrics.spread_pct),
        alignment: score_alignment(metrics.signal_count()),
    };
    let total = components.total();
    let why_safe = explain_why_safe(&metrics, total);
    let what_could_go_wrong = explain_risks(&metrics);

    SafetyScore {
        total,
        components,
        passes_freshness: metrics
            .freshness_minutes
            .map_or(false, |m| m <= profile.max_freshness_minutes),
        passes_liquidity: metrics.total_depth >= profile.min_depth,
        passes_spread: metrics
            .spread_pct
            .map_or(false, |p| p <= profile.max_spread),
        passes_alignment: metrics.signal_count() >= profile.min_signals,
        why_safe,
        what_could_go_wrong,
        metrics,
    }
}

/// Scores single markets and serves ranked opportunity lists.
pub struct SafetyScorer {
    profile: SafetyProfile,
}

impl Default for SafetyScorer {
    fn default() -> Self {
        Self {
            profile: SafetyProfile::strict(),
        }
    }
}

impl SafetyScorer {
    #[must_use]
    pub fn new(profile: SafetyProfile) -> Self {
        Self { profile }
    }

    /// Full-detail score for one market, including volume ratio and the
    /// reference slippage probe.
    pub fn calculate_score(
        &self,
        conn: &mut SqliteConnection,
        market: &Market,
    ) -> Result<SafetyScore> {
        let now = Utc::now().naive_utc();
        let mut metrics = SafetyMetrics::default();

        if let Some(token) = market.yes_token() {
            let token_key = token.to_string();
            let snapshots = book_store::latest_per_token(conn, &[token_key.clone()])?;
            if let Some(snapshot) = snapshots.get(&token_key) {
                metrics.last_orderbook_time = Some(snapshot.timestamp);
                metrics.bid_depth_1pct = snapshot.bid_depth_1pct.unwrap_or(0.0);
                metrics.ask_depth_1pct = snapshot.ask_depth_1pct.unwrap_or(0.0);
                metrics.total_depth = metrics.bid_depth_1pct + metrics.ask_depth_1pct;
                metrics.spread_pct = snapshot.spread_pct;
                metrics.best_bid = snapshot.best_bid;
                metrics.best_ask = snapshot.best_ask;
            }
            metrics.last_trade_time = trade_store::latest_timestamp(conn, &token_key)?;

            metrics.volume_ratio = volume_ratio(conn, &token_key, now)?;

            if let Some((book, _ts)) = book_store::latest_raw(conn, &token_key)? {
                metrics.slippage_100 = book
                    .buy_slippage(SLIPPAGE_PROBE_DOLLARS)
                    .map(|est: SlippageEstimate| est.slippage_pct);
            }
        }

        // Freshness prefers whichever of trade or book data is newer.
        let latest = match (metrics.last_orderbook_time, metrics.last_trade_time) {
            (Some(book), Some(trade)) => Some(book.max(trade)),
            (Some(book), None) => Some(book),
            (None, Some(trade)) => Some(trade),
            (None, None) => None,
        };
        metrics.freshness_minutes = latest.map(|ts| (now - ts).num_seconds() as f64 / 60.0);

        let mut signals = alert_store::signals_for_market(conn, market.id.as_str())?;
        signals.sort();
        metrics.active_signals = signals;

        Ok(compose(metrics, &self.profile))
    }

    /// Strict-profile opportunity list.
    pub fn safe_opportunities(
        &self,
        conn: &mut SqliteConnection,
        limit: usize,
    ) -> Result<Vec<Opportunity>> {
        self.opportunities_batch(conn, &SafetyProfile::strict(), limit, &HashSet::new())
    }

    /// Learning-profile fallback picks, excluding markets already surfaced
    /// as safe.
    pub fn learning_opportunities(
        &self,
        conn: &mut SqliteConnection,
        limit: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<Opportunity>> {
        self.opportunities_batch(conn, &SafetyProfile::learning(), limit, exclude)
    }

    /// Batch path: at most four queries regardless of market count.
    ///
    /// 1. Active alerts, expanded to a per-market signal map.
    /// 2. Newest fresh snapshot per candidate market.
    /// 3. The candidate market rows.
    /// 4. Hourly price extremes per YES token for recent price moves.
    fn opportunities_batch(
        &self,
        conn: &mut SqliteConnection,
        profile: &SafetyProfile,
        limit: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<Opportunity>> {
        let now = Utc::now().naive_utc();
        let freshness_cutoff =
            now - Duration::seconds((profile.max_freshness_minutes * 60.0) as i64);

        // Query 1: candidate markets by signal count.
        let signal_map = alert_store::active_signal_map(conn)?;
        let candidate_ids: Vec<String> = signal_map
            .iter()
            .filter(|(market_id, kinds)| {
                kinds.len() >= profile.min_signals && !exclude.contains(market_id.as_str())
            })
            .map(|(market_id, _)| market_id.clone())
            .collect();
        if candidate_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Query 2: newest fresh snapshot per market, with depth and spread
        // filters applied before scoring.
        let snapshots = book_store::latest_per_market_since(conn, &candidate_ids, freshness_cutoff)?;

        // Query 3: the market rows.
        let markets = market_store::by_ids(conn, &candidate_ids)?;
        let markets: HashMap<String, Market> = markets
            .into_iter()
            .filter(|m| m.active)
            .map(|m| (m.id.to_string(), m))
            .collect();

        // Query 4: recent price extremes per YES token.
        let mut token_to_market: HashMap<String, String> = HashMap::new();
        for market in markets.values() {
            if snapshots.contains_key(market.id.as_str()) {
                if let Some(token) = market.yes_token() {
                    token_to_market.insert(token.to_string(), market.id.to_string());
                }
            }
        }
        let tokens: Vec<String> = token_to_market.keys().cloned().collect();
        let extremes = trade_store::price_extremes_since(conn, &tokens, now - Duration::hours(1))?;
        let mut price_moves: HashMap<String, f64> = HashMap::new();
        for (token, (low, high)) in extremes {
            if low > 0.0 {
                if let Some(market_id) = token_to_market.get(&token) {
                    price_moves.insert(market_id.clone(), (high - low) / low);
                }
            }
        }

        let mut opportunities = Vec::new();
        for (market_id, snapshot) in &snapshots {
            let Some(market) = markets.get(market_id) else {
                continue;
            };
            let Some(kinds) = signal_map.get(market_id) else {
                continue;
            };

            let bid_depth = snapshot.bid_depth_1pct.unwrap_or(0.0);
            let ask_depth = snapshot.ask_depth_1pct.unwrap_or(0.0);
            let total_depth = bid_depth + ask_depth;
            if total_depth < profile.min_depth {
                continue;
            }
            if snapshot.spread_pct.map_or(false, |p| p > profile.max_spread) {
                continue;
            }

            let mut active_signals: Vec<String> = kinds.iter().cloned().collect();
            active_signals.sort();

            let metrics = SafetyMetrics {
                last_trade_time: None,
                last_orderbook_time: Some(snapshot.timestamp),
                freshness_minutes: Some((now - snapshot.timestamp).num_seconds() as f64 / 60.0),
                bid_depth_1pct: bid_depth,
                ask_depth_1pct: ask_depth,
                total_depth,
                spread_pct: snapshot.spread_pct,
                best_bid: snapshot.best_bid,
                best_ask: snapshot.best_ask,
                volume_ratio: None,
                slippage_100: None,
                active_signals,
            };

            opportunities.push(Opportunity {
                market_id: market_id.clone(),
                question: market.question.clone(),
                category: market.category.clone(),
                outcomes: market.outcomes.clone(),
                score: compose(metrics, profile),
                recent_price_move_pct: price_moves.get(market_id).copied(),
                last_updated: snapshot.timestamp,
            });
        }

        opportunities.sort_by(|a, b| b.score.total.cmp(&a.score.total));
        opportunities.truncate(limit);
        Ok(opportunities)
    }
}

/// Recent 1h volume against the hourly average of the prior 23 hours.
/// Returns `None` without at least [`MIN_BASELINE_TRADES`] baseline trades.
pub fn volume_ratio(
    conn: &mut SqliteConnection,
    token_id: &str,
    now: NaiveDateTime,
) -> Result<Option<f64>> {
    let tokens = vec![token_id.to_string()];
    let hour_ago = now - Duration::hours(1);
    let day_ago = now - Duration::hours(24);

    let recent = trade_store::volume_by_token(conn, &tokens, hour_ago, now)?
        .get(token_id)
        .copied()
        .unwrap_or(0.0);
    let (baseline_volume, baseline_count) =
        trade_store::baseline_by_token(conn, &tokens, day_ago, hour_ago)?
            .get(token_id)
            .copied()
            .unwrap_or((0.0, 0));

    if baseline_count < MIN_BASELINE_TRADES || baseline_volume <= 0.0 {
        return Ok(None);
    }
    let hourly = baseline_volume / 23.0;
    Ok(Some(recent / hourly))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::model::NewTradeRow;
    use crate::core::domain::{
        token_dedup_key, Alert, AlertData, AlertKind, Book, MarketId, PriceLevel, Severity,
        TokenId,
    };
    use crate::core::store::testkit::memory_store;
    use crate::core::store::Store;

    #[test]
    fn component_scores_follow_the_table() {
        assert_eq!(score_freshness(Some(10.0)), 30);
        assert_eq!(score_freshness(Some(20.0)), 20);
        assert_eq!(score_freshness(Some(31.0)), 0);
        assert_eq!(score_freshness(None), 0);

        assert_eq!(score_liquidity(2500.0), 30);
        assert_eq!(score_liquidity(800.0), 20);
        assert_eq!(score_liquidity(499.0), 0);

        assert_eq!(score_spread(Some(0.02)), 20);
        assert_eq!(score_spread(Some(0.04)), 10);
        assert_eq!(score_spread(Some(0.06)), 0);
        assert_eq!(score_spread(None), 0);

        assert_eq!(score_alignment(0), 0);
        assert_eq!(score_alignment(1), 10);
        assert_eq!(score_alignment(2), 20);
        assert_eq!(score_alignment(5), 20);
    }

    #[test]
    fn perfect_metrics_reach_one_hundred() {
        let metrics = SafetyMetrics {
            freshness_minutes: Some(5.0),
            bid_depth_1pct: 1500.0,
            ask_depth_1pct: 1500.0,
            total_depth: 3000.0,
            spread_pct: Some(0.01),
            active_signals: vec!["volume_spike".into(), "spread_alert".into()],
            ..Default::default()
        };
        let score = compose(metrics, &SafetyProfile::strict());
        assert_eq!(score.total, 100);
        assert!(score.is_safe());
        assert!(score.why_safe.contains("100/100"));
    }

    #[test]
    fn safe_requires_every_threshold() {
        let mut metrics = SafetyMetrics {
            freshness_minutes: Some(5.0),
            total_depth: 3000.0,
            spread_pct: Some(0.01),
            active_signals: vec!["volume_spike".into()],
            ..Default::default()
        };
        // One signal fails the strict profile but passes learning.
        let strict = compose(metrics.clone(), &SafetyProfile::strict());
        assert!(!strict.is_safe());
        let learning = compose(metrics.clone(), &SafetyProfile::learning());
        assert!(learning.is_safe());

        metrics.active_signals.push("mm_pullback".into());
        metrics.freshness_minutes = Some(45.0);
        let stale = compose(metrics, &SafetyProfile::strict());
        assert!(!stale.is_safe());
    }

    fn seed_scored_market(store: &Store, id: &str, depth_each_side: f64, spread: f64) {
        use crate::core::domain::{Market, Outcome};
        use chrono::Utc;

        let token = format!("tok-{id}-0000001");
        let market = Market {
            id: MarketId::new(id),
            condition_id: None,
            slug: None,
            question: format!("Q {id}?"),
            description: None,
            outcomes: vec![Outcome::new("Yes", token.clone(), Some(0.5))],
            end_date: None,
            volume: None,
            liquidity: None,
            active: true,
            enable_order_book: true,
            category: Some("test".into()),
        };
        let mut conn = store.conn().unwrap();
        let now = Utc::now().naive_utc();
        let row = market_store::to_row(&market, now).unwrap();
        market_store::upsert_bulk(&mut conn, &[row]).unwrap();

        // One snapshot, 5 minutes old, with the requested shape.
        let mid = 0.5;
        let book = Book::with_levels(
            TokenId::new(token.clone()),
            vec![PriceLevel::new(mid - spread / 2.0, depth_each_side / mid)],
            vec![PriceLevel::new(mid + spread / 2.0, depth_each_side / mid)],
        );
        let ts = now - Duration::minutes(5);
        let row = book_store::snapshot_row(&token, Some(id), ts, &book.metrics());
        book_store::insert_snapshot(&mut conn, &row).unwrap();
    }

    fn seed_signal(store: &Store, kind: AlertKind, id: &str) {
        let mut conn = store.conn().unwrap();
        let token = format!("tok-{id}-0000001");
        let alert = Alert::for_market(
            kind,
            Severity::Medium,
            MarketId::new(id),
            "t",
            "d",
            AlertData::SpreadAlert {
                token_id: token.clone(),
                spread: Some(0.01),
                spread_pct: 0.02,
                best_bid: Some(0.49),
                best_ask: Some(0.51),
                snapshot_age_seconds: 60.0,
            },
            format!("{}-{}", kind.as_str(), token_dedup_key(&MarketId::new(id), &token)),
        );
        alert_store::insert(&mut conn, &alert, Utc::now().naive_utc()).unwrap();
    }

    #[test]
    fn batch_path_ranks_and_filters() {
        let store = memory_store();

        // Deep, tight market with two signals.
        seed_scored_market(&store, "good", 1500.0, 0.01);
        seed_signal(&store, AlertKind::VolumeSpike, "good");
        seed_signal(&store, AlertKind::SpreadAlert, "good");

        // Thin market with two signals: filtered by depth.
        seed_scored_market(&store, "thin", 100.0, 0.01);
        seed_signal(&store, AlertKind::VolumeSpike, "thin");
        seed_signal(&store, AlertKind::SpreadAlert, "thin");

        // One-signal market: below the strict signal floor.
        seed_scored_market(&store, "single", 1500.0, 0.01);
        seed_signal(&store, AlertKind::VolumeSpike, "single");

        let scorer = SafetyScorer::default();
        let mut conn = store.conn().unwrap();
        let safe = scorer.safe_opportunities(&mut conn, 10).unwrap();
        assert_eq!(safe.len(), 1);
        assert_eq!(safe[0].market_id, "good");
        assert!(safe[0].score.is_safe());

        // Learning profile picks up the one-signal market, excluding the
        // already-safe ids.
        let exclude: HashSet<String> = safe.iter().map(|o| o.market_id.clone()).collect();
        let learning = scorer.learning_opportunities(&mut conn, 10, &exclude).unwrap();
        assert_eq!(learning.len(), 1);
        assert_eq!(learning[0].market_id, "single");
    }

    #[test]
    fn volume_ratio_needs_a_baseline() {
        let store = memory_store();
        let mut conn = store.conn().unwrap();
        let now = Utc::now().naive_utc();
        let token = "tok-vr-00000001";

        // 5 baseline trades only: not enough.
        let rows: Vec<NewTradeRow> = (0..5)
            .map(|i| NewTradeRow {
                trade_id: Some(format!("b{i}")),
                token_id: token.to_string(),
                market_id: None,
                price: 0.5,
                size: 10.0,
                side: None,
                timestamp: now - Duration::hours(2) - Duration::minutes(i),
                maker_address: None,
                taker_address: None,
            })
            .collect();
        trade_store::insert_ignore_bulk(&mut conn, &rows).unwrap();
        assert_eq!(volume_ratio(&mut conn, token, now).unwrap(), None);

        // Ten more baseline trades and a hot recent hour.
        let rows: Vec<NewTradeRow> = (0..10)
            .map(|i| NewTradeRow {
                trade_id: Some(format!("c{i}")),
                token_id: token.to_string(),
                market_id: None,
                price: 0.5,
                size: 10.0,
                side: None,
                timestamp: now - Duration::hours(3) - Duration::minutes(i),
                maker_address: None,
                taker_address: None,
            })
            .collect();
        trade_store::insert_ignore_bulk(&mut conn, &rows).unwrap();
        let recent = NewTradeRow {
            trade_id: Some("r0".into()),
            token_id: token.to_string(),
            market_id: None,
            price: 0.5,
            size: 130.0,
            side: None,
            timestamp: now - Duration::minutes(10),
            maker_address: None,
            taker_address: None,
        };
        trade_store::insert_ignore_bulk(&mut conn, &[recent]).unwrap();

        // Baseline: 15 trades, $150 over 23h -> hourly ~6.52; recent $130.
        let ratio = volume_ratio(&mut conn, token, now).unwrap().unwrap();
        assert!((ratio - 130.0 / (150.0 / 23.0)).abs() < 1e-9);
    }

    #[test]
    fn single_market_score_unions_related_signals() {
        let store = memory_store();
        seed_scored_market(&store, "m1", 1500.0, 0.01);
        seed_signal(&store, AlertKind::VolumeSpike, "m1");

        // A cross-market alert referencing m1 counts as a second kind.
        let mut conn = store.conn().unwrap();
        let cross = Alert::for_related(
            AlertKind::Arbitrage,
            Severity::Medium,
            vec![MarketId::new("m1"), MarketId::new("m2")],
            "t",
            "d",
            AlertData::Conditional {
                parent_market_id: "m1".into(),
                parent_price: 0.4,
                child_market_id: "m2".into(),
                child_price: 0.5,
                profit_estimate: 0.1,
                strategy: "buy_parent_sell_child".into(),
            },
            "conditional-m1-m2".into(),
        );
        alert_store::insert(&mut conn, &cross, Utc::now().naive_utc()).unwrap();

        let market = market_store::get(&mut conn, &MarketId::new("m1")).unwrap().unwrap();
        let scorer = SafetyScorer::default();
        let score = scorer.calculate_score(&mut conn, &market).unwrap();

        assert_eq!(score.metrics.signal_count(), 2);
        assert_eq!(score.components.alignment, 20);
        assert!(score.is_safe());
    }
}
