//! Diesel table definitions for the persistence layer.

diesel::table! {
    markets (id) {
        id -> Text,
        condition_id -> Nullable<Text>,
        slug -> Nullable<Text>,
        question -> Text,
        description -> Nullable<Text>,
        outcomes -> Text,
        end_date -> Nullable<Timestamp>,
        volume -> Nullable<Double>,
        liquidity -> Nullable<Double>,
        active -> Bool,
        enable_order_book -> Bool,
        category -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    orderbook_snapshots (id) {
        id -> Integer,
        token_id -> Text,
        market_id -> Nullable<Text>,
        timestamp -> Timestamp,
        best_bid -> Nullable<Double>,
        best_ask -> Nullable<Double>,
        spread -> Nullable<Double>,
        spread_pct -> Nullable<Double>,
        mid_price -> Nullable<Double>,
        bid_depth_1pct -> Nullable<Double>,
        ask_depth_1pct -> Nullable<Double>,
        bid_depth_5pct -> Nullable<Double>,
        ask_depth_5pct -> Nullable<Double>,
        imbalance -> Nullable<Double>,
    }
}

diesel::table! {
    orderbook_latest_raw (token_id) {
        token_id -> Text,
        market_id -> Nullable<Text>,
        timestamp -> Timestamp,
        bids -> Text,
        asks -> Text,
    }
}

diesel::table! {
    trades (id) {
        id -> Integer,
        trade_id -> Nullable<Text>,
        token_id -> Text,
        market_id -> Nullable<Text>,
        price -> Double,
        size -> Double,
        side -> Nullable<Text>,
        timestamp -> Timestamp,
        maker_address -> Nullable<Text>,
        taker_address -> Nullable<Text>,
    }
}

diesel::table! {
    alerts (id) {
        id -> Integer,
        alert_type -> Text,
        severity -> Text,
        title -> Text,
        description -> Text,
        market_id -> Nullable<Text>,
        related_market_ids -> Nullable<Text>,
        data -> Text,
        dedup_key -> Text,
        is_active -> Bool,
        created_at -> Timestamp,
        dismissed_at -> Nullable<Timestamp>,
        expires_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    market_relationships (id) {
        id -> Integer,
        relationship_type -> Text,
        parent_market_id -> Text,
        child_market_id -> Text,
        group_id -> Nullable<Text>,
        notes -> Nullable<Text>,
        confidence -> Double,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    volume_stats (id) {
        id -> Integer,
        market_id -> Text,
        token_id -> Text,
        period_start -> Timestamp,
        period_end -> Timestamp,
        period_type -> Text,
        volume -> Double,
        trade_count -> Integer,
        avg_trade_size -> Nullable<Double>,
        price_open -> Nullable<Double>,
        price_close -> Nullable<Double>,
        price_high -> Nullable<Double>,
        price_low -> Nullable<Double>,
        buy_volume -> Nullable<Double>,
        sell_volume -> Nullable<Double>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    job_runs (id) {
        id -> Integer,
        job_id -> Text,
        run_id -> Text,
        started_at -> Timestamp,
        completed_at -> Nullable<Timestamp>,
        status -> Text,
        error_message -> Nullable<Text>,
        records_processed -> Nullable<Integer>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    markets,
    orderbook_snapshots,
    orderbook_latest_raw,
    trades,
    alerts,
    market_relationships,
    volume_stats,
    job_runs,
);
