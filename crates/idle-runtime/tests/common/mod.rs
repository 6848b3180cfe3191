#![allow(dead_code)]

use idle_core::GameConfig;
use idle_runtime::{Engine, ManualClock};
use persistence::Store;
use std::sync::Arc;

/// 2024-03-01T12:00:00Z
pub const T0: i64 = 1_709_294_400_000;
pub const SECOND: i64 = 1_000;
pub const MINUTE: i64 = 60 * SECOND;
pub const HOUR: i64 = 60 * MINUTE;
pub const DAY: i64 = 24 * HOUR;

pub async fn engine_with(config: GameConfig) -> (Arc<Engine>, ManualClock) {
    let clock = ManualClock::new(T0);
    let store = Store::in_memory().await.expect("in-memory store");
    let engine = Engine::new(store, config, Arc::new(clock.clone()));
    (Arc::new(engine), clock)
}

pub async fn engine() -> (Arc<Engine>, ManualClock) {
    engine_with(GameConfig::default()).await
}

/// Config whose new accounts start broke.
pub fn broke() -> GameConfig {
    let mut cfg = GameConfig::default();
    cfg.economy.starting_balance = rust_decimal::Decimal::ZERO;
    cfg
}
