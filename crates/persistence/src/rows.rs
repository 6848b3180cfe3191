//! Raw SQLite rows and their conversion into domain records.

use crate::{parse_decimal, StoreError};
use chrono::NaiveDate;
use idle_core::{
    Account, AccountId, AdSession, AdStatus, Company, CompanyId, DailyRewardRecord, LedgerEntry,
    LedgerKind, PlayerStats,
};

pub(crate) const ACCOUNT_COLUMNS: &str = "id, username, balance, total_earned, level, \
     multiplier_value, multiplier_until, last_active_at, last_ad_at, total_clicks, \
     total_upgrades, total_ads_watched, created_at";

pub(crate) const COMPANY_COLUMNS: &str = "id, owner_id, name, level, income_per_click, \
     passive_income_per_second, upgrade_cost, created_at";

#[derive(sqlx::FromRow)]
pub(crate) struct AccountRow {
    id: i64,
    username: String,
    balance: String,
    total_earned: String,
    level: i64,
    multiplier_value: String,
    multiplier_until: i64,
    last_active_at: i64,
    last_ad_at: Option<i64>,
    total_clicks: i64,
    total_upgrades: i64,
    total_ads_watched: i64,
    created_at: i64,
}

fn to_u32(column: &'static str, v: i64) -> Result<u32, StoreError> {
    u32::try_from(v).map_err(|_| StoreError::Corrupt {
        column,
        value: v.to_string(),
    })
}

fn to_u64(column: &'static str, v: i64) -> Result<u64, StoreError> {
    u64::try_from(v).map_err(|_| StoreError::Corrupt {
        column,
        value: v.to_string(),
    })
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(r: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: AccountId(r.id),
            username: r.username,
            balance: parse_decimal("balance", &r.balance)?,
            total_earned: parse_decimal("total_earned", &r.total_earned)?,
            level: to_u32("level", r.level)?,
            multiplier_value: parse_decimal("multiplier_value", &r.multiplier_value)?,
            multiplier_until: r.multiplier_until,
            last_active_at: r.last_active_at,
            last_ad_at: r.last_ad_at,
            stats: PlayerStats {
                total_clicks: to_u64("total_clicks", r.total_clicks)?,
                total_upgrades: to_u64("total_upgrades", r.total_upgrades)?,
                total_ads_watched: to_u64("total_ads_watched", r.total_ads_watched)?,
            },
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CompanyRow {
    id: i64,
    owner_id: i64,
    name: String,
    level: i64,
    income_per_click: String,
    passive_income_per_second: String,
    upgrade_cost: String,
    created_at: i64,
}

impl TryFrom<CompanyRow> for Company {
    type Error = StoreError;

    fn try_from(r: CompanyRow) -> Result<Self, Self::Error> {
        Ok(Company {
            id: CompanyId(r.id),
            owner_id: AccountId(r.owner_id),
            name: r.name,
            level: to_u32("level", r.level)?,
            income_per_click: parse_decimal("income_per_click", &r.income_per_click)?,
            passive_income_per_second: parse_decimal(
                "passive_income_per_second",
                &r.passive_income_per_second,
            )?,
            upgrade_cost: parse_decimal("upgrade_cost", &r.upgrade_cost)?,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AdSessionRow {
    owner_id: i64,
    started_at: i64,
    status: String,
}

impl TryFrom<AdSessionRow> for AdSession {
    type Error = StoreError;

    fn try_from(r: AdSessionRow) -> Result<Self, Self::Error> {
        let status: AdStatus = r.status.parse().map_err(|_| StoreError::Corrupt {
            column: "status",
            value: r.status.clone(),
        })?;
        Ok(AdSession {
            owner_id: AccountId(r.owner_id),
            started_at: r.started_at,
            status,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct DailyRewardRow {
    owner_id: i64,
    claimed_date: String,
    amount: String,
    streak: i64,
}

impl TryFrom<DailyRewardRow> for DailyRewardRecord {
    type Error = StoreError;

    fn try_from(r: DailyRewardRow) -> Result<Self, Self::Error> {
        let claimed_date: NaiveDate =
            r.claimed_date.parse().map_err(|_| StoreError::Corrupt {
                column: "claimed_date",
                value: r.claimed_date.clone(),
            })?;
        Ok(DailyRewardRecord {
            owner_id: AccountId(r.owner_id),
            claimed_date,
            amount: parse_decimal("amount", &r.amount)?,
            streak: to_u32("streak", r.streak)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LedgerRow {
    id: i64,
    account_id: i64,
    kind: String,
    amount: String,
    description: String,
    created_at: i64,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(r: LedgerRow) -> Result<Self, Self::Error> {
        let kind: LedgerKind = r.kind.parse().map_err(|_| StoreError::Corrupt {
            column: "kind",
            value: r.kind.clone(),
        })?;
        Ok(LedgerEntry {
            id: r.id,
            account_id: AccountId(r.account_id),
            kind,
            amount: parse_decimal("amount", &r.amount)?,
            description: r.description,
            created_at: r.created_at,
        })
    }
}
