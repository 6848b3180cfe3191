//! Loading and checking [`GameConfig`].

use idle_core::GameConfig;
use rust_decimal::Decimal;
use std::path::Path;
use thiserror::Error;

/// Environment variable holding the database URL.
pub const DB_ENV: &str = "IDLE_TYCOON_DB";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Parse YAML; absent keys take their defaults.
pub fn from_yaml_str(text: &str) -> Result<GameConfig, ConfigError> {
    let cfg: GameConfig = if text.trim().is_empty() {
        GameConfig::default()
    } else {
        serde_yaml::from_str(text)?
    };
    validate(&cfg)?;
    Ok(cfg)
}

/// Load from `path`, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<GameConfig, ConfigError> {
    match path {
        Some(p) => from_yaml_str(&std::fs::read_to_string(p)?),
        None => Ok(GameConfig::default()),
    }
}

/// Database URL: explicit value, else `IDLE_TYCOON_DB`, else the local save.
pub fn database_url(explicit: Option<String>) -> String {
    explicit
        .or_else(|| std::env::var(DB_ENV).ok())
        .unwrap_or_else(|| persistence::default_sqlite_url().to_string())
}

/// Reject constants that would break the economy's invariants.
pub fn validate(cfg: &GameConfig) -> Result<(), ConfigError> {
    let e = &cfg.economy;
    let check = |ok: bool, msg: &'static str| if ok { Ok(()) } else { Err(ConfigError::Invalid(msg)) };
    check(e.level_click_bonus >= Decimal::ZERO, "economy.level_click_bonus must be >= 0")?;
    check(e.level_divisor > Decimal::ZERO, "economy.level_divisor must be > 0")?;
    check(e.upgrade_cost_factor > Decimal::ONE, "economy.upgrade_cost_factor must be > 1")?;
    check(e.upgrade_income_factor > Decimal::ONE, "economy.upgrade_income_factor must be > 1")?;
    check(e.company_purchase_cost >= Decimal::ZERO, "economy.company_purchase_cost must be >= 0")?;
    check(e.company_base_upgrade_cost > Decimal::ZERO, "economy.company_base_upgrade_cost must be > 0")?;
    check(
        e.company_base_income_per_click > Decimal::ZERO,
        "economy.company_base_income_per_click must be > 0",
    )?;
    check(
        e.company_base_passive_income_per_second >= Decimal::ZERO,
        "economy.company_base_passive_income_per_second must be >= 0",
    )?;
    check(e.starting_balance >= Decimal::ZERO, "economy.starting_balance must be >= 0")?;
    check(
        idle_core::validate_company_name(&e.starter_company_name).is_ok(),
        "economy.starter_company_name is not a valid company name",
    )?;
    check(e.max_transaction_value > Decimal::ZERO, "economy.max_transaction_value must be > 0")?;

    let o = &cfg.offline;
    check(o.cap_hours > Decimal::ZERO, "offline.cap_hours must be > 0")?;
    check(
        o.efficiency > Decimal::ZERO && o.efficiency <= Decimal::ONE,
        "offline.efficiency must be in (0, 1]",
    )?;
    check(o.min_elapsed_ms >= 0, "offline.min_elapsed_ms must be >= 0")?;

    let a = &cfg.ads;
    check(a.min_duration_ms >= 0 && a.tolerance_ms >= 0, "ads durations must be >= 0")?;
    check(a.multiplier >= Decimal::ONE, "ads.multiplier must be >= 1")?;
    check(a.multiplier_duration_ms > 0, "ads.multiplier_duration_ms must be > 0")?;
    check(a.session_ttl_ms > 0, "ads.session_ttl_ms must be > 0")?;
    check(a.cooldown_ms >= 0, "ads.cooldown_ms must be >= 0")?;

    let d = &cfg.daily;
    check(
        d.base_reward >= Decimal::ZERO && d.streak_bonus >= Decimal::ZERO,
        "daily rewards must be >= 0",
    )?;

    let r = &cfg.rate_limit;
    check(r.max_clicks > 0 && r.window_ms > 0, "rate_limit values must be > 0")?;
    Ok(())
}
