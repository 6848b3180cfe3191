#![deny(warnings)]

//! Core domain models and invariants for Idle Tycoon.
//!
//! This crate defines the serializable records shared by the economy rules,
//! the store and the progression engine, with validation helpers that
//! guard the basic invariants of each record.

pub mod config;

pub use config::{AdConfig, DailyConfig, EconomyConfig, GameConfig, OfflineConfig, RateLimitConfig};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of a company name, in characters.
pub const MAX_COMPANY_NAME_LEN: usize = 40;
/// Accepted username length range, in characters.
pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;

/// Unique identifier of a player account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a company.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub i64);

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifetime activity counters used for achievements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub total_clicks: u64,
    pub total_upgrades: u64,
    pub total_ads_watched: u64,
}

/// A player's persistent game state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Immutable identifier.
    pub id: AccountId,
    /// Unique login name.
    pub username: String,
    /// Spendable currency (>= 0).
    pub balance: Decimal,
    /// Cumulative lifetime earnings; never decreases.
    pub total_earned: Decimal,
    /// Cached `level_from_total_earned(total_earned)` (>= 1).
    pub level: u32,
    /// Active multiplier magnitude (>= 1).
    pub multiplier_value: Decimal,
    /// Epoch ms; the multiplier applies while `now < multiplier_until`.
    pub multiplier_until: i64,
    /// Epoch ms of the last earning-producing action.
    pub last_active_at: i64,
    /// Epoch ms of the last granted ad reward.
    pub last_ad_at: Option<i64>,
    /// Activity counters.
    pub stats: PlayerStats,
    /// Epoch ms of account creation.
    pub created_at: i64,
}

impl Account {
    /// Whether the ad multiplier window is open at `now_ms`.
    pub fn multiplier_active(&self, now_ms: i64) -> bool {
        now_ms < self.multiplier_until
    }

    /// Milliseconds left before another ad may start, if still cooling down.
    pub fn ad_cooldown_left(&self, now_ms: i64, cooldown_ms: i64) -> Option<i64> {
        let left = self.last_ad_at?.saturating_add(cooldown_ms) - now_ms;
        (left > 0).then_some(left)
    }
}

/// An income-producing asset owned by exactly one account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    pub owner_id: AccountId,
    pub name: String,
    /// Upgrade level (>= 1).
    pub level: u32,
    /// Contribution to every click (> 0).
    pub income_per_click: Decimal,
    /// Passive income per second (>= 0), basis for offline earnings.
    pub passive_income_per_second: Decimal,
    /// Price of the next upgrade (> 0).
    pub upgrade_cost: Decimal,
    pub created_at: i64,
}

/// Field set for a company that has not been stored yet.
#[derive(Clone, Debug, PartialEq)]
pub struct NewCompany {
    pub owner_id: AccountId,
    pub name: String,
    pub income_per_click: Decimal,
    pub passive_income_per_second: Decimal,
    pub upgrade_cost: Decimal,
    pub created_at: i64,
}

/// Ad session status. `None` is represented in storage by the absence of a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdStatus {
    Watching,
    None,
}

impl AdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdStatus::Watching => "WATCHING",
            AdStatus::None => "NONE",
        }
    }
}

impl FromStr for AdStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WATCHING" => Ok(AdStatus::Watching),
            "NONE" => Ok(AdStatus::None),
            other => Err(ValidationError::UnknownTag(other.to_string())),
        }
    }
}

/// Short-lived record of an ad being watched; at most one per account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdSession {
    pub owner_id: AccountId,
    /// Epoch ms when the ad started.
    pub started_at: i64,
    pub status: AdStatus,
}

/// One claimed daily reward. Dates are UTC calendar days.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRewardRecord {
    pub owner_id: AccountId,
    pub claimed_date: NaiveDate,
    pub amount: Decimal,
    pub streak: u32,
}

/// Category of a ledger row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerKind {
    Upgrade,
    Purchase,
    OfflineEarnings,
    DailyReward,
    TransferOut,
    TransferIn,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Upgrade => "UPGRADE",
            LedgerKind::Purchase => "PURCHASE",
            LedgerKind::OfflineEarnings => "OFFLINE_EARNINGS",
            LedgerKind::DailyReward => "DAILY_REWARD",
            LedgerKind::TransferOut => "TRANSFER_OUT",
            LedgerKind::TransferIn => "TRANSFER_IN",
        }
    }
}

impl FromStr for LedgerKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "UPGRADE" => LedgerKind::Upgrade,
            "PURCHASE" => LedgerKind::Purchase,
            "OFFLINE_EARNINGS" => LedgerKind::OfflineEarnings,
            "DAILY_REWARD" => LedgerKind::DailyReward,
            "TRANSFER_OUT" => LedgerKind::TransferOut,
            "TRANSFER_IN" => LedgerKind::TransferIn,
            other => return Err(ValidationError::UnknownTag(other.to_string())),
        })
    }
}

/// Append-only record of a committed balance change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: i64,
    pub account_id: AccountId,
    pub kind: LedgerKind,
    /// Signed amount: negative for spends.
    pub amount: Decimal,
    pub description: String,
    pub created_at: i64,
}

/// Milestones unlocked by play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Achievement {
    FirstThousand,
    TenThousand,
    HundredThousand,
    Level10,
    Level50,
    ThousandClicks,
    AdWatcher,
}

impl Achievement {
    pub const ALL: [Achievement; 7] = [
        Achievement::FirstThousand,
        Achievement::TenThousand,
        Achievement::HundredThousand,
        Achievement::Level10,
        Achievement::Level50,
        Achievement::ThousandClicks,
        Achievement::AdWatcher,
    ];

    /// Stable storage key.
    pub fn key(&self) -> &'static str {
        match self {
            Achievement::FirstThousand => "FIRST_THOUSAND",
            Achievement::TenThousand => "TEN_THOUSAND",
            Achievement::HundredThousand => "HUNDRED_THOUSAND",
            Achievement::Level10 => "LEVEL_10",
            Achievement::Level50 => "LEVEL_50",
            Achievement::ThousandClicks => "THOUSAND_CLICKS",
            Achievement::AdWatcher => "AD_WATCHER",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Achievement::FirstThousand => "First Thousand",
            Achievement::TenThousand => "Ten Thousand",
            Achievement::HundredThousand => "Hundred Thousand",
            Achievement::Level10 => "Reaching Level 10",
            Achievement::Level50 => "Reaching Level 50",
            Achievement::ThousandClicks => "1000 Clicks",
            Achievement::AdWatcher => "Ad Watcher",
        }
    }
}

impl FromStr for Achievement {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Achievement::ALL
            .iter()
            .copied()
            .find(|a| a.key() == s)
            .ok_or_else(|| ValidationError::UnknownTag(s.to_string()))
    }
}

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Name is empty after trimming.
    #[error("name must not be empty")]
    EmptyName,
    /// Name exceeds the maximum length.
    #[error("name must be at most {0} characters")]
    NameTooLong(usize),
    /// Name contains control characters.
    #[error("name contains control characters")]
    ControlCharacters,
    /// Username outside the accepted alphabet or length.
    #[error("invalid username: {0}")]
    InvalidUsername(String),
    /// Money fields must be non-negative.
    #[error("negative monetary value is invalid")]
    NegativeMoney,
    /// Amounts supplied by callers must be strictly positive.
    #[error("amount must be > 0")]
    NonPositiveAmount,
    /// Amount above the per-transaction cap.
    #[error("amount exceeds the {0} cap")]
    AmountTooLarge(Decimal),
    /// Page sizes start at 1.
    #[error("limit must be > 0")]
    NonPositiveLimit,
    /// Company click income must be strictly positive.
    #[error("income per click must be > 0")]
    NonPositiveIncome,
    /// Upgrade cost must be strictly positive.
    #[error("upgrade cost must be > 0")]
    NonPositiveCost,
    /// Levels start at 1.
    #[error("level must be >= 1")]
    InvalidLevel,
    /// Multipliers never shrink income.
    #[error("multiplier must be >= 1")]
    InvalidMultiplier,
    /// Stored tag not recognised.
    #[error("unknown tag: {0}")]
    UnknownTag(String),
}

fn validate_name(raw: &str, max_len: usize) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > max_len {
        return Err(ValidationError::NameTooLong(max_len));
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacters);
    }
    Ok(name.to_string())
}

/// Validate and normalise a company name. Returns the trimmed name.
pub fn validate_company_name(raw: &str) -> Result<String, ValidationError> {
    validate_name(raw, MAX_COMPANY_NAME_LEN)
}

/// Validate and normalise a username. Returns the trimmed name.
pub fn validate_username(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    let len = name.chars().count();
    let alphabet_ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !USERNAME_LEN.contains(&len) || !alphabet_ok {
        return Err(ValidationError::InvalidUsername(name.to_string()));
    }
    Ok(name.to_string())
}

/// Validate a caller-supplied amount (transfers) against `max`.
pub fn validate_amount(amount: Decimal, max: Decimal) -> Result<(), ValidationError> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount);
    }
    if amount > max {
        return Err(ValidationError::AmountTooLarge(max));
    }
    Ok(())
}

/// Validate the stored fields of an account.
pub fn validate_account(a: &Account) -> Result<(), ValidationError> {
    if a.balance < Decimal::ZERO || a.total_earned < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney);
    }
    if a.level == 0 {
        return Err(ValidationError::InvalidLevel);
    }
    if a.multiplier_value < Decimal::ONE {
        return Err(ValidationError::InvalidMultiplier);
    }
    Ok(())
}

/// Validate the stored fields of a company.
pub fn validate_company(c: &Company) -> Result<(), ValidationError> {
    validate_company_name(&c.name)?;
    if c.level == 0 {
        return Err(ValidationError::InvalidLevel);
    }
    if c.income_per_click <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveIncome);
    }
    if c.passive_income_per_second < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney);
    }
    if c.upgrade_cost <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveCost);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn account() -> Account {
        Account {
            id: AccountId(1),
            username: "tycoon".to_string(),
            balance: Decimal::new(500, 0),
            total_earned: Decimal::ZERO,
            level: 1,
            multiplier_value: Decimal::ONE,
            multiplier_until: 0,
            last_active_at: 0,
            last_ad_at: None,
            stats: PlayerStats::default(),
            created_at: 0,
        }
    }

    fn company() -> Company {
        Company {
            id: CompanyId(7),
            owner_id: AccountId(1),
            name: "Lemonade Stand".to_string(),
            level: 1,
            income_per_click: Decimal::new(15, 1),
            passive_income_per_second: Decimal::new(1, 1),
            upgrade_cost: Decimal::new(100, 0),
            created_at: 0,
        }
    }

    #[test]
    fn company_name_is_trimmed() {
        assert_eq!(validate_company_name("  Acme  ").unwrap(), "Acme");
        assert_eq!(validate_company_name("   "), Err(ValidationError::EmptyName));
        assert_eq!(
            validate_company_name(&"x".repeat(MAX_COMPANY_NAME_LEN + 1)),
            Err(ValidationError::NameTooLong(MAX_COMPANY_NAME_LEN))
        );
        assert_eq!(
            validate_company_name("bad\u{7}name"),
            Err(ValidationError::ControlCharacters)
        );
    }

    #[test]
    fn username_alphabet() {
        assert!(validate_username("player_one").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
    }

    #[test]
    fn account_invariants() {
        let mut a = account();
        validate_account(&a).unwrap();
        a.balance = Decimal::new(-1, 2);
        assert_eq!(validate_account(&a), Err(ValidationError::NegativeMoney));
        let mut a = account();
        a.level = 0;
        assert_eq!(validate_account(&a), Err(ValidationError::InvalidLevel));
    }

    #[test]
    fn multiplier_window_is_exclusive() {
        let mut a = account();
        a.multiplier_until = 1_000;
        assert!(a.multiplier_active(999));
        assert!(!a.multiplier_active(1_000));
    }

    #[test]
    fn company_invariants() {
        validate_company(&company()).unwrap();
        let mut c = company();
        c.income_per_click = Decimal::ZERO;
        assert_eq!(validate_company(&c), Err(ValidationError::NonPositiveIncome));
    }

    #[test]
    fn tags_parse_back() {
        for a in Achievement::ALL {
            assert_eq!(a.key().parse::<Achievement>().unwrap(), a);
        }
        assert_eq!("TRANSFER_IN".parse::<LedgerKind>().unwrap(), LedgerKind::TransferIn);
        assert_eq!("WATCHING".parse::<AdStatus>().unwrap(), AdStatus::Watching);
        assert!("nope".parse::<LedgerKind>().is_err());
    }

    #[test]
    fn ad_cooldown_counts_from_last_grant() {
        let mut a = account();
        assert_eq!(a.ad_cooldown_left(5_000, 600_000), None);
        a.last_ad_at = Some(1_000);
        assert_eq!(a.ad_cooldown_left(1_000, 600_000), Some(600_000));
        assert_eq!(a.ad_cooldown_left(600_999, 600_000), Some(1));
        assert_eq!(a.ad_cooldown_left(601_000, 600_000), None);
    }

    #[test]
    fn account_json_uses_camel_case() {
        let s = serde_json::to_string(&account()).unwrap();
        assert!(s.contains("\"totalEarned\""));
        assert!(s.contains("\"multiplierUntil\""));
    }

    proptest! {
        #[test]
        fn positive_amounts_validate(cents in 1i64..1_000_000_000) {
            let cap = Decimal::from(1_000_000_000_000i64);
            prop_assert!(validate_amount(Decimal::new(cents, 2), cap).is_ok());
            prop_assert!(validate_amount(Decimal::new(-cents, 2), cap).is_err());
        }

        #[test]
        fn amounts_above_the_cap_are_rejected(cents in 1i64..1_000_000_000) {
            let cap = Decimal::new(cents, 2);
            prop_assert_eq!(
                validate_amount(cap + Decimal::new(1, 2), cap),
                Err(ValidationError::AmountTooLarge(cap))
            );
            prop_assert!(validate_amount(cap, cap).is_ok());
        }
    }
}
