//! Transaction-scoped store operations.

use crate::rows::{
    AccountRow, AdSessionRow, CompanyRow, DailyRewardRow, LedgerRow, ACCOUNT_COLUMNS,
    COMPANY_COLUMNS,
};
use crate::{decimal_text, StoreError};
use idle_core::{
    Account, AccountId, Achievement, AdSession, Company, CompanyId, DailyRewardRecord,
    LedgerEntry, LedgerKind, NewCompany,
};
use rust_decimal::Decimal;
use sqlx::{Sqlite, Transaction};
use tracing::warn;

/// One atomic unit of work against the store.
///
/// Dropping a `StoreTx` without calling [`StoreTx::commit`] rolls it back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

fn counter(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

impl StoreTx {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }

    /// Take the write lock for this transaction by touching the account row.
    ///
    /// SQLite locks the whole database on the first write, so doing this
    /// before any read keeps the read-modify-write sequence serializable.
    /// Returns `false` when the account does not exist.
    pub async fn lock_account(&mut self, id: AccountId) -> Result<bool, StoreError> {
        let done = sqlx::query("UPDATE accounts SET id = id WHERE id = ?")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    // ---- accounts ----

    pub async fn get_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Account::try_from).transpose()
    }

    /// Insert a fresh level-1 account. Fails with `Conflict` on a taken username.
    pub async fn insert_account(
        &mut self,
        username: &str,
        starting_balance: Decimal,
        now: i64,
    ) -> Result<AccountId, StoreError> {
        let done = sqlx::query(
            "INSERT INTO accounts (username, balance, total_earned, level, multiplier_value, \
             multiplier_until, last_active_at, created_at) VALUES (?, ?, '0', 1, '1', 0, ?, ?)",
        )
        .bind(username)
        .bind(decimal_text(starting_balance))
        .bind(now)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_write(e, "accounts.username"))?;
        Ok(AccountId(done.last_insert_rowid()))
    }

    pub async fn save_account(&mut self, a: &Account) -> Result<(), StoreError> {
        let done = sqlx::query(
            "UPDATE accounts SET balance = ?, total_earned = ?, level = ?, multiplier_value = ?, \
             multiplier_until = ?, last_active_at = ?, last_ad_at = ?, total_clicks = ?, \
             total_upgrades = ?, total_ads_watched = ? WHERE id = ?",
        )
        .bind(decimal_text(a.balance))
        .bind(decimal_text(a.total_earned))
        .bind(i64::from(a.level))
        .bind(decimal_text(a.multiplier_value))
        .bind(a.multiplier_until)
        .bind(a.last_active_at)
        .bind(a.last_ad_at)
        .bind(counter(a.stats.total_clicks))
        .bind(counter(a.stats.total_upgrades))
        .bind(counter(a.stats.total_ads_watched))
        .bind(a.id.0)
        .execute(&mut *self.tx)
        .await?;
        if done.rows_affected() == 0 {
            warn!(account = %a.id, "save_account matched no row");
        }
        Ok(())
    }

    /// Delete an account; owned rows cascade. Returns `false` if absent.
    pub async fn delete_account(&mut self, id: AccountId) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    // ---- companies ----

    pub async fn get_companies_for(&mut self, owner: AccountId) -> Result<Vec<Company>, StoreError> {
        let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE owner_id = ? ORDER BY id");
        let rows: Vec<CompanyRow> = sqlx::query_as(&sql)
            .bind(owner.0)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(Company::try_from).collect()
    }

    /// A company only if `owner` owns it.
    pub async fn get_company(
        &mut self,
        id: CompanyId,
        owner: AccountId,
    ) -> Result<Option<Company>, StoreError> {
        let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ? AND owner_id = ?");
        let row: Option<CompanyRow> = sqlx::query_as(&sql)
            .bind(id.0)
            .bind(owner.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Company::try_from).transpose()
    }

    pub async fn save_company(&mut self, c: &Company) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE companies SET name = ?, level = ?, income_per_click = ?, \
             passive_income_per_second = ?, upgrade_cost = ? WHERE id = ? AND owner_id = ?",
        )
        .bind(&c.name)
        .bind(i64::from(c.level))
        .bind(decimal_text(c.income_per_click))
        .bind(decimal_text(c.passive_income_per_second))
        .bind(decimal_text(c.upgrade_cost))
        .bind(c.id.0)
        .bind(c.owner_id.0)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn insert_company(&mut self, c: &NewCompany) -> Result<CompanyId, StoreError> {
        let done = sqlx::query(
            "INSERT INTO companies (owner_id, name, level, income_per_click, \
             passive_income_per_second, upgrade_cost, created_at) VALUES (?, ?, 1, ?, ?, ?, ?)",
        )
        .bind(c.owner_id.0)
        .bind(&c.name)
        .bind(decimal_text(c.income_per_click))
        .bind(decimal_text(c.passive_income_per_second))
        .bind(decimal_text(c.upgrade_cost))
        .bind(c.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(CompanyId(done.last_insert_rowid()))
    }

    // ---- ad sessions ----

    pub async fn get_ad_session(&mut self, owner: AccountId) -> Result<Option<AdSession>, StoreError> {
        let row: Option<AdSessionRow> =
            sqlx::query_as("SELECT owner_id, started_at, status FROM ad_sessions WHERE owner_id = ?")
                .bind(owner.0)
                .fetch_optional(&mut *self.tx)
                .await?;
        row.map(AdSession::try_from).transpose()
    }

    /// Insert or replace the single session of `s.owner_id`.
    pub async fn upsert_ad_session(&mut self, s: &AdSession) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO ad_sessions (owner_id, started_at, status) VALUES (?, ?, ?) \
             ON CONFLICT(owner_id) DO UPDATE SET started_at = excluded.started_at, \
             status = excluded.status",
        )
        .bind(s.owner_id.0)
        .bind(s.started_at)
        .bind(s.status.as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn delete_ad_session(&mut self, owner: AccountId) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM ad_sessions WHERE owner_id = ?")
            .bind(owner.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    // ---- daily rewards ----

    pub async fn get_latest_daily_reward(
        &mut self,
        owner: AccountId,
    ) -> Result<Option<DailyRewardRecord>, StoreError> {
        let row: Option<DailyRewardRow> = sqlx::query_as(
            "SELECT owner_id, claimed_date, amount, streak FROM daily_rewards \
             WHERE owner_id = ? ORDER BY claimed_date DESC LIMIT 1",
        )
        .bind(owner.0)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(DailyRewardRecord::try_from).transpose()
    }

    /// Append a claim. Fails with `Conflict` if one exists for that date.
    pub async fn insert_daily_reward(
        &mut self,
        r: &DailyRewardRecord,
        claimed_at: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO daily_rewards (owner_id, claimed_date, amount, streak, claimed_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(r.owner_id.0)
        .bind(r.claimed_date.to_string())
        .bind(decimal_text(r.amount))
        .bind(i64::from(r.streak))
        .bind(claimed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_write(e, "daily_rewards.owner_id_claimed_date"))?;
        Ok(())
    }

    // ---- ledger ----

    pub async fn insert_ledger_entry(
        &mut self,
        account: AccountId,
        kind: LedgerKind,
        amount: Decimal,
        description: &str,
        now: i64,
    ) -> Result<i64, StoreError> {
        let done = sqlx::query(
            "INSERT INTO ledger (account_id, kind, amount, description, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(account.0)
        .bind(kind.as_str())
        .bind(decimal_text(amount))
        .bind(description)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(done.last_insert_rowid())
    }

    /// Newest entries first.
    pub async fn recent_ledger(
        &mut self,
        account: AccountId,
        limit: u32,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows: Vec<LedgerRow> = sqlx::query_as(
            "SELECT id, account_id, kind, amount, description, created_at FROM ledger \
             WHERE account_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(account.0)
        .bind(i64::from(limit))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    // ---- achievements ----

    /// Record `unlocked` for `account`; returns only the ones not held before.
    pub async fn record_achievements(
        &mut self,
        account: AccountId,
        unlocked: &[Achievement],
        now: i64,
    ) -> Result<Vec<Achievement>, StoreError> {
        let mut fresh = Vec::new();
        for a in unlocked {
            let done = sqlx::query(
                "INSERT OR IGNORE INTO achievements (account_id, key, unlocked_at) VALUES (?, ?, ?)",
            )
            .bind(account.0)
            .bind(a.key())
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
            if done.rows_affected() > 0 {
                fresh.push(*a);
            }
        }
        Ok(fresh)
    }

    pub async fn get_achievements(&mut self, account: AccountId) -> Result<Vec<Achievement>, StoreError> {
        let keys: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM achievements WHERE account_id = ? ORDER BY unlocked_at, key",
        )
        .bind(account.0)
        .fetch_all(&mut *self.tx)
        .await?;
        keys.into_iter()
            .map(|(k,)| {
                k.parse::<Achievement>().map_err(|_| StoreError::Corrupt {
                    column: "key",
                    value: k.clone(),
                })
            })
            .collect()
    }
}
