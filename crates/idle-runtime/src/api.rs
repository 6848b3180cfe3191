//! Transport-agnostic request boundary.
//!
//! Requests arrive as typed [`Request`] values (or JSON decoding to them),
//! are rate limited where needed, run on the [`Engine`], and leave as
//! [`ApiResponse`]s with money rounded to cents.

use crate::engine::{
    AccountCreated, AdCompleted, ClickOutcome, DailyRewardOutcome, Engine, OfflineOutcome, Profile,
    PurchaseOutcome, TransferOutcome, UpgradeOutcome,
};
use crate::error::{ErrorKind, GameError};
use crate::ratelimit::RateLimiter;
use idle_core::{Account, AccountId, Company, CompanyId, LedgerEntry};
use idle_econ::round_money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_LEDGER_LIMIT: u32 = 20;
pub const DEFAULT_LEADERBOARD_LIMIT: u32 = 10;
pub const MAX_PAGE: u32 = 100;

/// One operation and its inputs. The JSON form is tagged by `op`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    CreateAccount { username: String },
    Profile { account_id: AccountId },
    DeleteAccount { account_id: AccountId },
    Click { account_id: AccountId },
    UpgradeCompany { account_id: AccountId, company_id: CompanyId },
    BuyCompany { account_id: AccountId, name: String },
    ClaimOfflineEarnings { account_id: AccountId },
    StartAdSession { account_id: AccountId },
    CompleteAdSession { account_id: AccountId },
    ClaimDailyReward { account_id: AccountId },
    Transfer { from_id: AccountId, to_id: AccountId, amount: Decimal },
    Ledger { account_id: AccountId, limit: Option<u32> },
    Leaderboard { limit: Option<u32> },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn error(kind: ErrorKind, message: String) -> Self {
        Self {
            status: kind.status(),
            body: json!({ "error": { "kind": kind, "message": message } }),
        }
    }
}

impl From<&GameError> for ApiResponse {
    fn from(e: &GameError) -> Self {
        ApiResponse::error(e.kind(), e.to_string())
    }
}

/// Rounds money fields for display.
trait Rounded {
    fn rounded(self) -> Self;
}

impl Rounded for Account {
    fn rounded(mut self) -> Self {
        self.balance = round_money(self.balance);
        self.total_earned = round_money(self.total_earned);
        self.multiplier_value = round_money(self.multiplier_value);
        self
    }
}

impl Rounded for Company {
    fn rounded(mut self) -> Self {
        self.income_per_click = round_money(self.income_per_click);
        self.passive_income_per_second = round_money(self.passive_income_per_second);
        self.upgrade_cost = round_money(self.upgrade_cost);
        self
    }
}

impl Rounded for LedgerEntry {
    fn rounded(mut self) -> Self {
        self.amount = round_money(self.amount);
        self
    }
}

impl<T: Rounded> Rounded for Vec<T> {
    fn rounded(self) -> Self {
        self.into_iter().map(Rounded::rounded).collect()
    }
}

impl Rounded for AccountCreated {
    fn rounded(mut self) -> Self {
        self.balance = round_money(self.balance);
        self
    }
}

impl Rounded for ClickOutcome {
    fn rounded(mut self) -> Self {
        self.added_amount = round_money(self.added_amount);
        self.new_balance = round_money(self.new_balance);
        self
    }
}

impl Rounded for UpgradeOutcome {
    fn rounded(mut self) -> Self {
        self.new_income = round_money(self.new_income);
        self.new_passive_income = round_money(self.new_passive_income);
        self.new_cost = round_money(self.new_cost);
        self.new_balance = round_money(self.new_balance);
        self
    }
}

impl Rounded for PurchaseOutcome {
    fn rounded(mut self) -> Self {
        self.new_balance = round_money(self.new_balance);
        self
    }
}

impl Rounded for OfflineOutcome {
    fn rounded(mut self) -> Self {
        self.amount = round_money(self.amount);
        self.hours = round_money(self.hours);
        self
    }
}

impl Rounded for AdCompleted {
    fn rounded(mut self) -> Self {
        self.multiplier_value = round_money(self.multiplier_value);
        self
    }
}

impl Rounded for DailyRewardOutcome {
    fn rounded(mut self) -> Self {
        self.amount = round_money(self.amount);
        self
    }
}

impl Rounded for TransferOutcome {
    fn rounded(mut self) -> Self {
        self.new_balance = round_money(self.new_balance);
        self.recipient_balance = round_money(self.recipient_balance);
        self
    }
}

impl Rounded for Profile {
    fn rounded(mut self) -> Self {
        self.account = self.account.rounded();
        self.companies = self.companies.rounded();
        self
    }
}

pub struct Api {
    engine: Arc<Engine>,
    clicks: RateLimiter<AccountId>,
}

impl Api {
    pub fn new(engine: Arc<Engine>) -> Self {
        let rl = engine.config().rate_limit;
        let clicks = RateLimiter::new(rl.max_clicks, rl.window_ms, engine.clock());
        Self { engine, clicks }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Decode a JSON request and handle it. Malformed bodies are a 400.
    pub async fn handle_json(&self, body: &str) -> ApiResponse {
        match serde_json::from_str::<Request>(body) {
            Ok(req) => self.handle(req).await,
            Err(e) => {
                warn!(error = %e, "malformed request");
                ApiResponse::error(ErrorKind::Validation, format!("malformed request: {e}"))
            }
        }
    }

    pub async fn handle(&self, req: Request) -> ApiResponse {
        match self.dispatch(req).await {
            Ok(body) => ApiResponse { status: 200, body },
            Err(e) => {
                if e.kind() == ErrorKind::Infrastructure {
                    tracing::error!(error = %e, "operation failed");
                }
                ApiResponse::from(&e)
            }
        }
    }

    /// Run one request, returning the rounded response body.
    pub async fn dispatch(&self, req: Request) -> Result<Value, GameError> {
        let e = &self.engine;
        match req {
            Request::CreateAccount { username } => encode(e.create_account(&username).await?.rounded()),
            Request::Profile { account_id } => encode(e.profile(account_id).await?.rounded()),
            Request::DeleteAccount { account_id } => {
                e.delete_account(account_id).await?;
                Ok(json!({ "deleted": true }))
            }
            Request::Click { account_id } => {
                self.clicks.check(&account_id).map_err(|retry_after_ms| {
                    warn!(account = %account_id, retry_after_ms, "click rate limited");
                    GameError::RateLimited { retry_after_ms }
                })?;
                encode(e.click(account_id).await?.rounded())
            }
            Request::UpgradeCompany {
                account_id,
                company_id,
            } => encode(e.upgrade_company(account_id, company_id).await?.rounded()),
            Request::BuyCompany { account_id, name } => {
                encode(e.buy_company(account_id, &name).await?.rounded())
            }
            Request::ClaimOfflineEarnings { account_id } => {
                encode(e.claim_offline_earnings(account_id).await?.rounded())
            }
            Request::StartAdSession { account_id } => encode(e.start_ad_session(account_id).await?),
            Request::CompleteAdSession { account_id } => {
                encode(e.complete_ad_session(account_id).await?.rounded())
            }
            Request::ClaimDailyReward { account_id } => {
                encode(e.claim_daily_reward(account_id).await?.rounded())
            }
            Request::Transfer {
                from_id,
                to_id,
                amount,
            } => encode(e.transfer(from_id, to_id, amount).await?.rounded()),
            Request::Ledger { account_id, limit } => {
                let limit = page(limit, DEFAULT_LEDGER_LIMIT)?;
                encode(e.recent_ledger(account_id, limit).await?.rounded())
            }
            Request::Leaderboard { limit } => {
                let limit = page(limit, DEFAULT_LEADERBOARD_LIMIT)?;
                encode(e.leaderboard(limit).await?.rounded())
            }
        }
    }
}

fn page(limit: Option<u32>, default: u32) -> Result<u32, GameError> {
    match limit {
        None => Ok(default),
        Some(0) => Err(idle_core::ValidationError::NonPositiveLimit.into()),
        Some(n) => Ok(n.min(MAX_PAGE)),
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, GameError> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_decode_from_camel_case_json() {
        let r: Request = serde_json::from_str(r#"{"op":"upgradeCompany","accountId":3,"companyId":9}"#).unwrap();
        assert_eq!(
            r,
            Request::UpgradeCompany {
                account_id: AccountId(3),
                company_id: CompanyId(9)
            }
        );
        let r: Request =
            serde_json::from_str(r#"{"op":"transfer","fromId":1,"toId":2,"amount":"12.5"}"#).unwrap();
        assert!(matches!(r, Request::Transfer { amount, .. } if amount == Decimal::new(125, 1)));
        let r: Request = serde_json::from_str(r#"{"op":"leaderboard"}"#).unwrap();
        assert_eq!(r, Request::Leaderboard { limit: None });
    }

    #[test]
    fn unknown_ops_are_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"op":"printMoney","accountId":1}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"op":"click"}"#).is_err());
    }

    #[test]
    fn outcomes_round_to_cents() {
        let c = ClickOutcome {
            added_amount: Decimal::new(33_335, 4),
            new_balance: Decimal::new(2, 0),
            new_level: 1,
            leveled_up: false,
        }
        .rounded();
        assert_eq!(c.added_amount.to_string(), "3.33");
        assert_eq!(c.new_balance.to_string(), "2.00");
    }

    #[test]
    fn error_bodies_carry_kind_and_status() {
        let r = ApiResponse::from(&GameError::NoActiveAdSession);
        assert_eq!(r.status, 409);
        assert_eq!(r.body["error"]["kind"], "INVALID_STATE");
        assert!(!r.is_success());
    }

    #[test]
    fn page_limits() {
        assert_eq!(page(None, 10).unwrap(), 10);
        assert_eq!(page(Some(500), 10).unwrap(), MAX_PAGE);
        assert!(matches!(
            page(Some(0), 10),
            Err(GameError::Validation(idle_core::ValidationError::NonPositiveLimit))
        ));
    }

    #[test]
    fn unencodable_bodies_are_infrastructure_errors() {
        let mut by_pair = std::collections::BTreeMap::new();
        by_pair.insert((1, 2), "pair keys are not JSON object keys");
        let err = encode(by_pair).unwrap_err();
        assert!(matches!(err, GameError::Encode(_)));
        let r = ApiResponse::from(&err);
        assert_eq!(r.status, 500);
        assert_eq!(r.body["error"]["kind"], "INFRASTRUCTURE");
    }
}
