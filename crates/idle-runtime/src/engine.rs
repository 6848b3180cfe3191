//! Progression engine: one atomic economic transaction per call.
//!
//! Each mutating operation takes its account lock, snapshots `now` once,
//! opens a store transaction, applies the rules from `idle_econ`, and
//! commits. Returning early drops the transaction, which rolls it back.

use crate::clock::{utc_date, Clock};
use crate::error::GameError;
use crate::locks::AccountLocks;
use chrono::NaiveDate;
use idle_core::{
    Account, AccountId, AdSession, AdStatus, Achievement, Company, CompanyId, DailyRewardRecord,
    GameConfig, LedgerEntry, LedgerKind, NewCompany,
};
use idle_econ as econ;
use persistence::{Store, StoreError, StoreTx};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCreated {
    pub account_id: AccountId,
    pub company_id: CompanyId,
    pub balance: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickOutcome {
    pub added_amount: Decimal,
    pub new_balance: Decimal,
    pub new_level: u32,
    pub leveled_up: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeOutcome {
    pub company_id: CompanyId,
    pub new_level: u32,
    pub new_income: Decimal,
    pub new_passive_income: Decimal,
    pub new_cost: Decimal,
    pub new_balance: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOutcome {
    pub company_id: CompanyId,
    pub new_balance: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineOutcome {
    pub amount: Decimal,
    pub hours: Decimal,
    pub capped: bool,
    pub leveled_up: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdStarted {
    pub started: bool,
    pub started_at: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdCompleted {
    pub multiplier_value: Decimal,
    pub multiplier_until: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRewardOutcome {
    pub amount: Decimal,
    pub streak: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub new_balance: Decimal,
    pub recipient_balance: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatus {
    pub claimed_today: bool,
    pub streak: u32,
}

/// Everything a client shows about one player.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub account: Account,
    pub companies: Vec<Company>,
    pub achievements: Vec<Achievement>,
    pub multiplier_active: bool,
    pub daily: DailyStatus,
    pub ad_watching: bool,
}

pub struct Engine {
    store: Store,
    config: GameConfig,
    clock: Arc<dyn Clock>,
    locks: AccountLocks,
}

impl Engine {
    /// `config` is expected to have passed [`crate::config::validate`].
    pub fn new(store: Store, config: GameConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
            locks: AccountLocks::new(),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ---- account lifecycle ----

    /// New level-1 account with the starting balance and one free company.
    pub async fn create_account(&self, username: &str) -> Result<AccountCreated, GameError> {
        let username = idle_core::validate_username(username)?;
        let now = self.clock.now_ms();
        let eco = &self.config.economy;
        let mut tx = self.store.begin().await?;
        let account_id = tx
            .insert_account(&username, eco.starting_balance, now)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => GameError::UsernameTaken(username.clone()),
                other => GameError::Store(other),
            })?;
        let company_id = tx
            .insert_company(&self.baseline_company(account_id, &eco.starter_company_name, now))
            .await?;
        let account = load_account(&mut tx, account_id).await?;
        self.record_achievements(&mut tx, &account, now).await?;
        tx.commit().await?;
        info!(account = %account_id, %username, "account created");
        Ok(AccountCreated {
            account_id,
            company_id,
            balance: account.balance,
        })
    }

    pub async fn profile(&self, id: AccountId) -> Result<Profile, GameError> {
        let now = self.clock.now_ms();
        let mut tx = self.store.begin().await?;
        let account = load_account(&mut tx, id).await?;
        let companies = tx.get_companies_for(id).await?;
        let achievements = tx.get_achievements(id).await?;
        let latest = tx.get_latest_daily_reward(id).await?;
        let session = tx.get_ad_session(id).await?;
        tx.rollback().await?;

        let today = utc_date(now);
        let daily = match latest {
            Some(r) if r.claimed_date == today => DailyStatus {
                claimed_today: true,
                streak: r.streak,
            },
            // The streak survives until a day is skipped.
            Some(r) if r.claimed_date.succ_opt() == Some(today) => DailyStatus {
                claimed_today: false,
                streak: r.streak,
            },
            _ => DailyStatus {
                claimed_today: false,
                streak: 0,
            },
        };
        let ad_watching = session.map_or(false, |s| self.session_is_live(&s, now));
        Ok(Profile {
            multiplier_active: account.multiplier_active(now),
            account,
            companies,
            achievements,
            daily,
            ad_watching,
        })
    }

    /// Remove an account and everything it owns.
    pub async fn delete_account(&self, id: AccountId) -> Result<(), GameError> {
        let _guard = self.locks.lock(id).await;
        let mut tx = self.store.begin().await?;
        if !tx.delete_account(id).await? {
            return Err(GameError::AccountNotFound(id));
        }
        tx.commit().await?;
        info!(account = %id, "account deleted");
        Ok(())
    }

    // ---- earning ----

    pub async fn click(&self, id: AccountId) -> Result<ClickOutcome, GameError> {
        let _guard = self.locks.lock(id).await;
        let now = self.clock.now_ms();
        let mut tx = self.begin_locked(id).await?;
        let mut account = load_account(&mut tx, id).await?;
        let companies = tx.get_companies_for(id).await?;

        let eco = &self.config.economy;
        let base = econ::income_per_click(
            companies.iter().map(|c| c.income_per_click),
            account.level,
            eco.level_click_bonus,
        );
        let income =
            econ::apply_multiplier(base, account.multiplier_value, account.multiplier_until, now);
        let old_level = account.level;
        self.credit_earnings(&mut account, income)?;
        account.last_active_at = now;
        account.stats.total_clicks = account.stats.total_clicks.saturating_add(1);

        tx.save_account(&account).await?;
        self.record_achievements(&mut tx, &account, now).await?;
        tx.commit().await?;
        debug!(account = %id, %income, balance = %account.balance, "click");
        Ok(ClickOutcome {
            added_amount: income,
            new_balance: account.balance,
            new_level: account.level,
            leveled_up: account.level > old_level,
        })
    }

    /// Grant income for the time since the last earning action. A short
    /// absence is a no-op, not an error.
    pub async fn claim_offline_earnings(&self, id: AccountId) -> Result<OfflineOutcome, GameError> {
        let _guard = self.locks.lock(id).await;
        let now = self.clock.now_ms();
        let mut tx = self.begin_locked(id).await?;
        let mut account = load_account(&mut tx, id).await?;
        let companies = tx.get_companies_for(id).await?;

        let off = &self.config.offline;
        let per_hour = econ::passive_income_per_hour(companies.iter().map(|c| c.passive_income_per_second));
        let earned = econ::offline_earnings(
            account.last_active_at,
            now,
            per_hour,
            off.cap_hours,
            off.efficiency,
            off.min_elapsed_ms,
        );
        if earned.amount <= Decimal::ZERO {
            debug!(account = %id, hours = %earned.hours, "nothing earned offline");
            return Ok(OfflineOutcome {
                amount: Decimal::ZERO,
                hours: earned.hours,
                capped: earned.capped,
                leveled_up: false,
            });
        }

        let old_level = account.level;
        self.credit_earnings(&mut account, earned.amount)?;
        // Moving the baseline in the same transaction prevents a second grant.
        account.last_active_at = now;
        tx.save_account(&account).await?;
        let note = format!("Offline earnings for {} hours", econ::round_money(earned.hours));
        tx.insert_ledger_entry(id, LedgerKind::OfflineEarnings, earned.amount, &note, now)
            .await?;
        self.record_achievements(&mut tx, &account, now).await?;
        tx.commit().await?;
        info!(account = %id, amount = %earned.amount, capped = earned.capped, "offline earnings claimed");
        Ok(OfflineOutcome {
            amount: earned.amount,
            hours: earned.hours,
            capped: earned.capped,
            leveled_up: account.level > old_level,
        })
    }

    pub async fn claim_daily_reward(&self, id: AccountId) -> Result<DailyRewardOutcome, GameError> {
        let _guard = self.locks.lock(id).await;
        let now = self.clock.now_ms();
        let today = utc_date(now);
        let mut tx = self.begin_locked(id).await?;
        let mut account = load_account(&mut tx, id).await?;
        let latest = tx.get_latest_daily_reward(id).await?;
        if latest.as_ref().map_or(false, |r| r.claimed_date == today) {
            warn!(account = %id, %today, "daily reward already claimed");
            return Err(GameError::AlreadyClaimedToday(today));
        }

        let daily = &self.config.daily;
        let streak = econ::next_streak(latest.map(|r| (r.claimed_date, r.streak)), today);
        let amount = econ::daily_reward(streak, daily.base_reward, daily.streak_bonus);
        let record = DailyRewardRecord {
            owner_id: id,
            claimed_date: today,
            amount,
            streak,
        };
        tx.insert_daily_reward(&record, now)
            .await
            .map_err(|e| already_claimed_on_conflict(e, today))?;
        account.balance += amount;
        tx.save_account(&account).await?;
        let note = format!("Daily reward, day {streak} of streak");
        tx.insert_ledger_entry(id, LedgerKind::DailyReward, amount, &note, now)
            .await?;
        self.record_achievements(&mut tx, &account, now).await?;
        tx.commit().await?;
        info!(account = %id, %amount, streak, "daily reward claimed");
        Ok(DailyRewardOutcome { amount, streak })
    }

    // ---- spending ----

    pub async fn upgrade_company(
        &self,
        id: AccountId,
        company_id: CompanyId,
    ) -> Result<UpgradeOutcome, GameError> {
        let _guard = self.locks.lock(id).await;
        let now = self.clock.now_ms();
        let mut tx = self.begin_locked(id).await?;
        let mut account = load_account(&mut tx, id).await?;
        let mut company = tx
            .get_company(company_id, id)
            .await?
            .ok_or(GameError::CompanyNotFound(company_id))?;

        let cost = company.upgrade_cost;
        ensure_funds(&account, cost)?;
        let eco = &self.config.economy;
        let next_level = company.level.saturating_add(1);
        let mut next_cost =
            econ::upgrade_cost(next_level, eco.company_base_upgrade_cost, eco.upgrade_cost_factor)?;
        if next_cost <= cost {
            // A retuned base cost must not make the next upgrade cheaper.
            next_cost = cost
                .checked_mul(eco.upgrade_cost_factor)
                .ok_or(idle_econ::EconError::Overflow)?;
        }

        account.balance -= cost;
        account.stats.total_upgrades = account.stats.total_upgrades.saturating_add(1);
        company.level = next_level;
        company.income_per_click =
            econ::income_after_upgrade(company.income_per_click, eco.upgrade_income_factor);
        company.passive_income_per_second =
            econ::income_after_upgrade(company.passive_income_per_second, eco.upgrade_income_factor);
        company.upgrade_cost = next_cost;

        tx.save_account(&account).await?;
        tx.save_company(&company).await?;
        let note = format!("Upgraded {} to level {}", company.name, company.level);
        tx.insert_ledger_entry(id, LedgerKind::Upgrade, -cost, &note, now)
            .await?;
        self.record_achievements(&mut tx, &account, now).await?;
        tx.commit().await?;
        info!(account = %id, company = %company_id, level = company.level, %cost, "company upgraded");
        Ok(UpgradeOutcome {
            company_id,
            new_level: company.level,
            new_income: company.income_per_click,
            new_passive_income: company.passive_income_per_second,
            new_cost: company.upgrade_cost,
            new_balance: account.balance,
        })
    }

    pub async fn buy_company(&self, id: AccountId, name: &str) -> Result<PurchaseOutcome, GameError> {
        let name = idle_core::validate_company_name(name)?;
        let _guard = self.locks.lock(id).await;
        let now = self.clock.now_ms();
        let mut tx = self.begin_locked(id).await?;
        let mut account = load_account(&mut tx, id).await?;

        let cost = self.config.economy.company_purchase_cost;
        ensure_funds(&account, cost)?;
        account.balance -= cost;
        let company_id = tx
            .insert_company(&self.baseline_company(id, &name, now))
            .await?;
        tx.save_account(&account).await?;
        let note = format!("Bought {name}");
        tx.insert_ledger_entry(id, LedgerKind::Purchase, -cost, &note, now)
            .await?;
        tx.commit().await?;
        info!(account = %id, company = %company_id, %name, "company bought");
        Ok(PurchaseOutcome {
            company_id,
            new_balance: account.balance,
        })
    }

    /// Move balance between two players. Lifetime earnings are untouched.
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
    ) -> Result<TransferOutcome, GameError> {
        idle_core::validate_amount(amount, self.config.economy.max_transaction_value)?;
        if from == to {
            return Err(GameError::SelfTransfer);
        }
        let _guards = self.locks.lock_pair(from, to).await;
        let now = self.clock.now_ms();
        let mut tx = self.store.begin().await?;
        for id in [from.min(to), from.max(to)] {
            if !tx.lock_account(id).await? {
                return Err(GameError::AccountNotFound(id));
            }
        }
        let mut sender = load_account(&mut tx, from).await?;
        let mut recipient = load_account(&mut tx, to).await?;
        ensure_funds(&sender, amount)?;

        sender.balance -= amount;
        recipient.balance += amount;
        tx.save_account(&sender).await?;
        tx.save_account(&recipient).await?;
        let out = format!("Transfer to {}", recipient.username);
        let inn = format!("Transfer from {}", sender.username);
        tx.insert_ledger_entry(from, LedgerKind::TransferOut, -amount, &out, now)
            .await?;
        tx.insert_ledger_entry(to, LedgerKind::TransferIn, amount, &inn, now)
            .await?;
        self.record_achievements(&mut tx, &recipient, now).await?;
        tx.commit().await?;
        info!(%from, %to, %amount, "transfer");
        Ok(TransferOutcome {
            new_balance: sender.balance,
            recipient_balance: recipient.balance,
        })
    }

    // ---- ads ----

    /// Begin watching an ad, replacing any previous session.
    ///
    /// Refused while the cooldown after the last granted reward runs.
    pub async fn start_ad_session(&self, id: AccountId) -> Result<AdStarted, GameError> {
        let _guard = self.locks.lock(id).await;
        let now = self.clock.now_ms();
        let mut tx = self.begin_locked(id).await?;
        let account = load_account(&mut tx, id).await?;
        if let Some(retry_after_ms) = account.ad_cooldown_left(now, self.config.ads.cooldown_ms) {
            debug!(account = %id, retry_after_ms, "ad still cooling down");
            return Err(GameError::AdCooldown { retry_after_ms });
        }
        tx.upsert_ad_session(&AdSession {
            owner_id: id,
            started_at: now,
            status: AdStatus::Watching,
        })
        .await?;
        tx.commit().await?;
        debug!(account = %id, started_at = now, "ad session started");
        Ok(AdStarted {
            started: true,
            started_at: now,
        })
    }

    /// Finish the ad and grant the multiplier window.
    ///
    /// The session is consumed whatever the outcome: a too-fast completion
    /// still ends it, and a session past its TTL counts as absent.
    pub async fn complete_ad_session(&self, id: AccountId) -> Result<AdCompleted, GameError> {
        let _guard = self.locks.lock(id).await;
        let now = self.clock.now_ms();
        let mut tx = self.begin_locked(id).await?;
        let session = match tx.get_ad_session(id).await? {
            Some(s) if s.status == AdStatus::Watching => s,
            _ => return Err(GameError::NoActiveAdSession),
        };
        if !self.session_is_live(&session, now) {
            tx.delete_ad_session(id).await?;
            tx.commit().await?;
            warn!(account = %id, started_at = session.started_at, "stale ad session dropped");
            return Err(GameError::NoActiveAdSession);
        }

        let ads = &self.config.ads;
        let elapsed_ms = now - session.started_at;
        let required_ms = ads.min_duration_ms - ads.tolerance_ms;
        if elapsed_ms < required_ms {
            tx.delete_ad_session(id).await?;
            tx.commit().await?;
            warn!(account = %id, elapsed_ms, required_ms, "ad completed too fast");
            return Err(GameError::AdWatchedTooFast {
                elapsed_ms,
                required_ms,
            });
        }

        let mut account = load_account(&mut tx, id).await?;
        account.multiplier_value = ads.multiplier;
        account.multiplier_until = now.saturating_add(ads.multiplier_duration_ms);
        account.stats.total_ads_watched = account.stats.total_ads_watched.saturating_add(1);
        account.last_ad_at = Some(now);
        tx.save_account(&account).await?;
        tx.delete_ad_session(id).await?;
        self.record_achievements(&mut tx, &account, now).await?;
        tx.commit().await?;
        info!(account = %id, until = account.multiplier_until, "ad multiplier granted");
        Ok(AdCompleted {
            multiplier_value: account.multiplier_value,
            multiplier_until: account.multiplier_until,
        })
    }

    // ---- queries ----

    pub async fn recent_ledger(&self, id: AccountId, limit: u32) -> Result<Vec<LedgerEntry>, GameError> {
        let mut tx = self.store.begin().await?;
        load_account(&mut tx, id).await?;
        let entries = tx.recent_ledger(id, limit).await?;
        tx.rollback().await?;
        Ok(entries)
    }

    pub async fn leaderboard(&self, limit: u32) -> Result<Vec<Account>, GameError> {
        Ok(self.store.leaderboard(limit).await?)
    }

    // ---- helpers ----

    /// Open a transaction holding the database write lock on `id`'s row.
    async fn begin_locked(&self, id: AccountId) -> Result<StoreTx, GameError> {
        let mut tx = self.store.begin().await?;
        if !tx.lock_account(id).await? {
            return Err(GameError::AccountNotFound(id));
        }
        Ok(tx)
    }

    /// Add earnings to balance and lifetime total, then re-derive the level.
    fn credit_earnings(&self, account: &mut Account, amount: Decimal) -> Result<(), GameError> {
        account.balance += amount;
        account.total_earned += amount;
        account.level =
            econ::level_from_total_earned(account.total_earned, self.config.economy.level_divisor)?;
        Ok(())
    }

    fn baseline_company(&self, owner: AccountId, name: &str, now: i64) -> NewCompany {
        let eco = &self.config.economy;
        NewCompany {
            owner_id: owner,
            name: name.to_string(),
            income_per_click: eco.company_base_income_per_click,
            passive_income_per_second: eco.company_base_passive_income_per_second,
            upgrade_cost: eco.company_base_upgrade_cost,
            created_at: now,
        }
    }

    fn session_is_live(&self, s: &AdSession, now: i64) -> bool {
        s.status == AdStatus::Watching && now - s.started_at <= self.config.ads.session_ttl_ms
    }

    async fn record_achievements(
        &self,
        tx: &mut StoreTx,
        account: &Account,
        now: i64,
    ) -> Result<(), GameError> {
        let unlocked = econ::unlocked_achievements(account.balance, account.level, &account.stats);
        if unlocked.is_empty() {
            return Ok(());
        }
        for a in tx.record_achievements(account.id, &unlocked, now).await? {
            info!(account = %account.id, achievement = a.key(), "achievement unlocked");
        }
        Ok(())
    }
}

async fn load_account(tx: &mut StoreTx, id: AccountId) -> Result<Account, GameError> {
    tx.get_account(id)
        .await?
        .ok_or(GameError::AccountNotFound(id))
}

fn ensure_funds(account: &Account, needed: Decimal) -> Result<(), GameError> {
    if account.balance < needed {
        warn!(account = %account.id, %needed, available = %account.balance, "insufficient funds");
        return Err(GameError::InsufficientFunds {
            needed,
            available: account.balance,
        });
    }
    Ok(())
}

fn already_claimed_on_conflict(e: StoreError, today: NaiveDate) -> GameError {
    match e {
        StoreError::Conflict(_) => GameError::AlreadyClaimedToday(today),
        other => GameError::Store(other),
    }
}
