use chrono::NaiveDate;
use idle_core::{AccountId, CompanyId, ValidationError};
use idle_econ::EconError;
use persistence::StoreError;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Failures of game operations. Any of these leaves stored state untouched,
/// except where noted on the operation.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("account {0} not found")]
    AccountNotFound(AccountId),
    #[error("company {0} not found")]
    CompanyNotFound(CompanyId),
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },
    #[error("no active ad session")]
    NoActiveAdSession,
    #[error("ad watched too fast: {elapsed_ms}ms of {required_ms}ms")]
    AdWatchedTooFast { elapsed_ms: i64, required_ms: i64 },
    #[error("next ad available in {retry_after_ms}ms")]
    AdCooldown { retry_after_ms: i64 },
    #[error("daily reward already claimed for {0}")]
    AlreadyClaimedToday(NaiveDate),
    #[error("username already taken: {0}")]
    UsernameTaken(String),
    #[error("cannot transfer to the same account")]
    SelfTransfer,
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("too many requests; retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: i64 },
    #[error("economy rule failed: {0}")]
    Econ(#[from] EconError),
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
    #[error("cannot encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Coarse error classes exposed at the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InsufficientFunds,
    InvalidState,
    AlreadyClaimedToday,
    Validation,
    RateLimited,
    Infrastructure,
}

impl ErrorKind {
    /// HTTP-style status for transports that want one.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::InsufficientFunds => 402,
            ErrorKind::InvalidState | ErrorKind::AlreadyClaimedToday => 409,
            ErrorKind::Validation => 400,
            ErrorKind::RateLimited => 429,
            ErrorKind::Infrastructure => 500,
        }
    }
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::AccountNotFound(_) | GameError::CompanyNotFound(_) => ErrorKind::NotFound,
            GameError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            GameError::NoActiveAdSession
            | GameError::AdWatchedTooFast { .. }
            | GameError::AdCooldown { .. } => ErrorKind::InvalidState,
            GameError::AlreadyClaimedToday(_) => ErrorKind::AlreadyClaimedToday,
            GameError::UsernameTaken(_) | GameError::SelfTransfer | GameError::Validation(_) => {
                ErrorKind::Validation
            }
            GameError::RateLimited { .. } => ErrorKind::RateLimited,
            GameError::Econ(_) | GameError::Store(_) | GameError::Encode(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        let e = GameError::InsufficientFunds {
            needed: Decimal::from(500),
            available: Decimal::from(10),
        };
        assert_eq!(e.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(e.kind().status(), 402);
        assert_eq!(GameError::NoActiveAdSession.kind().status(), 409);
        assert_eq!(
            GameError::AdCooldown { retry_after_ms: 1 }.kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            GameError::Validation(ValidationError::EmptyName).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            GameError::Store(StoreError::Conflict("x")).kind(),
            ErrorKind::Infrastructure
        );
    }

    #[test]
    fn kind_serializes_screaming() {
        let s = serde_json::to_string(&ErrorKind::AlreadyClaimedToday).unwrap();
        assert_eq!(s, "\"ALREADY_CLAIMED_TODAY\"");
    }
}
