//! Economic constants, grouped the way operators tune them.
//!
//! Every field has a default, so a partial YAML file only overrides what it
//! names.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-level game configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub economy: EconomyConfig,
    pub offline: OfflineConfig,
    pub ads: AdConfig,
    pub daily: DailyConfig,
    pub rate_limit: RateLimitConfig,
}

/// Click income, leveling and company pricing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Click income added per account level.
    pub level_click_bonus: Decimal,
    /// Divisor in `floor(sqrt(total / divisor)) + 1`.
    pub level_divisor: Decimal,
    /// Growth of the upgrade cost per company level.
    pub upgrade_cost_factor: Decimal,
    /// Growth of company income per upgrade.
    pub upgrade_income_factor: Decimal,
    /// Price of buying a new company.
    pub company_purchase_cost: Decimal,
    /// Cost of a company's first upgrade.
    pub company_base_upgrade_cost: Decimal,
    pub company_base_income_per_click: Decimal,
    pub company_base_passive_income_per_second: Decimal,
    /// Balance granted to new accounts.
    pub starting_balance: Decimal,
    /// Name of the free company every new account receives.
    pub starter_company_name: String,
    /// Largest amount a single transfer may move.
    pub max_transaction_value: Decimal,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            level_click_bonus: Decimal::new(5, 1),
            level_divisor: Decimal::new(100, 0),
            upgrade_cost_factor: Decimal::new(2, 0),
            upgrade_income_factor: Decimal::new(15, 1),
            company_purchase_cost: Decimal::new(500, 0),
            company_base_upgrade_cost: Decimal::new(100, 0),
            company_base_income_per_click: Decimal::new(15, 1),
            company_base_passive_income_per_second: Decimal::new(1, 1),
            starting_balance: Decimal::new(500, 0),
            starter_company_name: "Lemonade Stand".to_string(),
            max_transaction_value: Decimal::new(1_000_000_000_000, 0),
        }
    }
}

/// Offline accrual bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Hours beyond which offline time stops counting.
    pub cap_hours: Decimal,
    /// Fraction of passive income earned while away, in (0, 1].
    pub efficiency: Decimal,
    /// Absences shorter than this earn nothing.
    pub min_elapsed_ms: i64,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            cap_hours: Decimal::new(12, 0),
            efficiency: Decimal::new(5, 1),
            min_elapsed_ms: 5 * 60 * 1000,
        }
    }
}

/// Rewarded-ad timing and multiplier window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdConfig {
    pub min_duration_ms: i64,
    /// Slack subtracted from `min_duration_ms` for client/server skew.
    pub tolerance_ms: i64,
    pub multiplier: Decimal,
    pub multiplier_duration_ms: i64,
    /// WATCHING sessions older than this are treated as abandoned.
    pub session_ttl_ms: i64,
    /// Minimum gap between a granted reward and the next session start.
    pub cooldown_ms: i64,
}

impl Default for AdConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: 30_000,
            tolerance_ms: 1_000,
            multiplier: Decimal::new(5, 0),
            multiplier_duration_ms: 120_000,
            session_ttl_ms: 5 * 60 * 1000,
            cooldown_ms: 10 * 60 * 1000,
        }
    }
}

/// Daily reward curve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyConfig {
    pub base_reward: Decimal,
    /// Added per consecutive day after the first.
    pub streak_bonus: Decimal,
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            base_reward: Decimal::new(100, 0),
            streak_bonus: Decimal::new(10, 0),
        }
    }
}

/// Click throttling applied at the API boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_clicks: u32,
    pub window_ms: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_clicks: 20,
            window_ms: 1_000,
        }
    }
}
