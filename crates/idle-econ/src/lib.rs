#![deny(warnings)]

//! Economy rules for Idle Tycoon.
//!
//! Pure, deterministic helpers for:
//! - Click income and the ad multiplier window
//! - The leveling curve and the company upgrade cost curve
//! - Offline accrual with a time cap and a minimum absence
//! - Daily rewards and streak continuity
//! - Achievement thresholds
//!
//! Nothing here reads a clock or touches storage: callers pass `now`.
//! Values keep full `Decimal` precision; round with [`round_money`] only
//! when displaying.

use chrono::NaiveDate;
use idle_core::{Achievement, PlayerStats};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Milliseconds in one hour.
pub const MS_PER_HOUR: i64 = 3_600_000;

/// Errors produced by economy rules.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Levels start at 1.
    #[error("level must be >= 1, got {0}")]
    InvalidLevel(u32),
    /// The leveling divisor must be strictly positive.
    #[error("level divisor must be > 0")]
    InvalidDivisor,
    /// Result does not fit in a `Decimal`.
    #[error("decimal overflow")]
    Overflow,
}

/// Income of a single click: every company's click income plus the
/// per-level bonus, floored at zero.
///
/// Example:
/// let v = income_per_click([Decimal::new(15, 1)], 1, Decimal::new(5, 1));
/// assert_eq!(v, Decimal::new(2, 0));
pub fn income_per_click<I>(company_incomes: I, level: u32, level_click_bonus: Decimal) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    let companies: Decimal = company_incomes.into_iter().sum();
    let total = companies + Decimal::from(level) * level_click_bonus;
    total.max(Decimal::ZERO)
}

/// Scale `amount` by the multiplier while its window is open.
pub fn apply_multiplier(
    amount: Decimal,
    multiplier_value: Decimal,
    multiplier_until: i64,
    now: i64,
) -> Decimal {
    if now < multiplier_until {
        amount * multiplier_value
    } else {
        amount
    }
}

/// Account level for a lifetime total: `max(1, floor(sqrt(total / divisor)) + 1)`.
///
/// Computed on integers (`floor(sqrt(x)) == isqrt(floor(x))` for x >= 0), so
/// the curve is exact and monotonic non-decreasing.
pub fn level_from_total_earned(total_earned: Decimal, divisor: Decimal) -> Result<u32, EconError> {
    if divisor <= Decimal::ZERO {
        return Err(EconError::InvalidDivisor);
    }
    if total_earned <= Decimal::ZERO {
        return Ok(1);
    }
    let quotient = (total_earned / divisor).floor().to_u64().unwrap_or(u64::MAX);
    let root = isqrt(quotient);
    Ok(u32::try_from(root).unwrap_or(u32::MAX).saturating_add(1).max(1))
}

fn isqrt(n: u64) -> u64 {
    // f64 gives a close guess; fix up rounding at the edges.
    let mut x = (n as f64).sqrt() as u64;
    while x.checked_mul(x).map_or(true, |sq| sq > n) {
        x -= 1;
    }
    while (x + 1).checked_mul(x + 1).map_or(false, |sq| sq <= n) {
        x += 1;
    }
    x
}

/// Cost of upgrading a company currently at `level`:
/// `base_cost * factor^(level - 1)`.
///
/// Example:
/// assert_eq!(upgrade_cost(3, Decimal::new(100, 0), Decimal::new(2, 0)).unwrap(), Decimal::new(400, 0));
pub fn upgrade_cost(level: u32, base_cost: Decimal, factor: Decimal) -> Result<Decimal, EconError> {
    if level == 0 {
        return Err(EconError::InvalidLevel(level));
    }
    let mut cost = base_cost;
    for _ in 1..level {
        cost = cost.checked_mul(factor).ok_or(EconError::Overflow)?;
    }
    Ok(cost)
}

/// Income after one upgrade.
pub fn income_after_upgrade(current_income: Decimal, factor: Decimal) -> Decimal {
    current_income * factor
}

/// Hourly passive income of a set of companies.
pub fn passive_income_per_hour<I>(per_second: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    let total: Decimal = per_second.into_iter().sum();
    total * Decimal::from(3_600)
}

/// Result of an offline accrual computation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfflineEarnings {
    /// Currency to grant (zero below the minimum absence).
    pub amount: Decimal,
    /// Hours that counted toward the grant, after capping.
    pub hours: Decimal,
    /// Whether the absence exceeded the cap.
    pub capped: bool,
}

impl OfflineEarnings {
    pub const NONE: OfflineEarnings = OfflineEarnings {
        amount: Decimal::ZERO,
        hours: Decimal::ZERO,
        capped: false,
    };
}

/// Offline accrual since `last_active_at`.
///
/// `elapsed = (now - last_active_at) / 1h`, capped at `cap_hours`;
/// `amount = income_per_hour * efficiency * capped_hours`. Absences shorter
/// than `min_elapsed_ms` (including clock skew into the past) earn nothing.
pub fn offline_earnings(
    last_active_at: i64,
    now: i64,
    income_per_hour: Decimal,
    cap_hours: Decimal,
    efficiency: Decimal,
    min_elapsed_ms: i64,
) -> OfflineEarnings {
    let elapsed_ms = now.saturating_sub(last_active_at);
    if elapsed_ms <= 0 || elapsed_ms < min_elapsed_ms {
        return OfflineEarnings::NONE;
    }
    let elapsed_hours = Decimal::from(elapsed_ms) / Decimal::from(MS_PER_HOUR);
    let hours = elapsed_hours.min(cap_hours);
    let amount = (income_per_hour * efficiency * hours).max(Decimal::ZERO);
    OfflineEarnings {
        amount,
        hours,
        capped: elapsed_hours > cap_hours,
    }
}

/// Daily reward for the given streak: `base + max(0, streak - 1) * bonus`.
pub fn daily_reward(streak: u32, base_reward: Decimal, streak_bonus: Decimal) -> Decimal {
    base_reward + Decimal::from(streak.saturating_sub(1)) * streak_bonus
}

/// Streak after claiming on `today`, given the previous claim (date, streak).
///
/// Consecutive days extend the streak; any gap (or a claim dated after
/// `today`) resets it to 1. A same-day previous claim keeps the streak as is;
/// callers reject same-day claims before getting here.
pub fn next_streak(last: Option<(NaiveDate, u32)>, today: NaiveDate) -> u32 {
    match last {
        None => 1,
        Some((date, streak)) if date == today => streak.max(1),
        Some((date, streak)) if date.succ_opt() == Some(today) => streak.saturating_add(1),
        Some(_) => 1,
    }
}

/// Every achievement whose threshold is met.
pub fn unlocked_achievements(balance: Decimal, level: u32, stats: &PlayerStats) -> Vec<Achievement> {
    Achievement::ALL
        .iter()
        .copied()
        .filter(|a| match a {
            Achievement::FirstThousand => balance >= Decimal::from(1_000),
            Achievement::TenThousand => balance >= Decimal::from(10_000),
            Achievement::HundredThousand => balance >= Decimal::from(100_000),
            Achievement::Level10 => level >= 10,
            Achievement::Level50 => level >= 50,
            Achievement::ThousandClicks => stats.total_clicks >= 1_000,
            Achievement::AdWatcher => stats.total_ads_watched >= 10,
        })
        .collect()
}

/// Round to cents for display, midpoint away from zero, always two places.
pub fn round_money(value: Decimal) -> Decimal {
    let mut v = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    v.rescale(2);
    v
}
