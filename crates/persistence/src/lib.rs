#![deny(warnings)]

//! Persistence layer: SQLite schema, migrations and the account store.
//!
//! All reads and writes of a single economic transaction go through one
//! [`StoreTx`], so a failure anywhere before [`StoreTx::commit`] leaves the
//! database untouched.

mod rows;
mod tx;

pub use tx::StoreTx;

use idle_core::Account;
use rows::{AccountRow, ACCOUNT_COLUMNS};
use rust_decimal::Decimal;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors raised by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Driver or connection failure.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    /// Schema migration failure.
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    Conflict(&'static str),
    /// A stored value could not be decoded.
    #[error("corrupt value in column {column}: {value:?}")]
    Corrupt { column: &'static str, value: String },
}

impl StoreError {
    /// Map a unique-constraint violation to [`StoreError::Conflict`].
    pub(crate) fn from_write(e: sqlx::Error, what: &'static str) -> StoreError {
        let unique = e
            .as_database_error()
            .map_or(false, |db| db.is_unique_violation());
        if unique {
            StoreError::Conflict(what)
        } else {
            StoreError::Db(e)
        }
    }
}

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/idle.db"
}

/// Create the directory holding a file-backed SQLite URL, if any.
pub fn ensure_parent_dir(url: &str) -> std::io::Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .map(|p| p.split('?').next().unwrap_or(p));
    match path {
        Some(p) if !p.starts_with(":memory:") => match std::path::Path::new(p).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}

pub(crate) fn parse_decimal(column: &'static str, raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw).map_err(|_| StoreError::Corrupt {
        column,
        value: raw.to_string(),
    })
}

pub(crate) fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Open (creating if missing) the database at `url` and apply migrations.
pub async fn init_db(url: &str) -> Result<SqlitePool, StoreError> {
    let opts = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().connect_with(opts).await?;
    MIGRATOR.run(&pool).await?;
    info!(url, "database ready");
    Ok(pool)
}

/// Durable store for accounts and everything they own.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to `url` and migrate.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            pool: init_db(url).await?,
        })
    }

    /// A private, migrated in-memory database. One connection that never
    /// expires, since each in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(opts)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start an atomic unit of work.
    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        Ok(StoreTx::new(self.pool.begin().await?))
    }

    /// Accounts ordered by balance, richest first, ties by id.
    ///
    /// SQLite only orders the REAL cast of the stored text, which merges
    /// balances closer than f64 can tell apart. The cast is monotonic, so it
    /// still bounds the candidates; the exact order comes from `Decimal`.
    pub async fn leaderboard(&self, limit: u32) -> Result<Vec<Account>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE CAST(balance AS REAL) >= COALESCE(( \
                 SELECT CAST(balance AS REAL) FROM accounts \
                 ORDER BY CAST(balance AS REAL) DESC LIMIT 1 OFFSET ?), -1.0)"
        );
        let rows: Vec<AccountRow> = sqlx::query_as(&sql)
            .bind(i64::from(limit) - 1)
            .fetch_all(&self.pool)
            .await?;
        let mut accounts = rows
            .into_iter()
            .map(Account::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        accounts.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.id.cmp(&b.id)));
        accounts.truncate(limit as usize);
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn url_is_sqlite() {
        assert!(default_sqlite_url().starts_with("sqlite://"));
    }

    #[test]
    fn memory_urls_need_no_directory() {
        ensure_parent_dir("sqlite::memory:").unwrap();
        ensure_parent_dir("sqlite://idle.db").unwrap();
    }

    #[tokio::test]
    async fn leaderboard_orders_beyond_float_precision() {
        let store = Store::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();
        // 2^53 and 2^53 + 1 share one f64.
        let low = tx.insert_account("first", Decimal::from(9_007_199_254_740_992i64), 0).await.unwrap();
        let high = tx.insert_account("second", Decimal::from(9_007_199_254_740_993i64), 0).await.unwrap();
        let poor = tx.insert_account("third", Decimal::ONE, 0).await.unwrap();
        tx.commit().await.unwrap();

        let top = store.leaderboard(1).await.unwrap();
        assert_eq!(top.iter().map(|a| a.id).collect::<Vec<_>>(), vec![high]);
        let all = store.leaderboard(10).await.unwrap();
        assert_eq!(all.iter().map(|a| a.id).collect::<Vec<_>>(), vec![high, low, poor]);
        assert!(store.leaderboard(0).await.unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn any_decimal_survives_text_storage(mantissa in any::<i64>(), scale in 0u32..=28) {
            let v = Decimal::new(mantissa, scale);
            let text = decimal_text(v);
            prop_assert_eq!(parse_decimal("balance", &text).unwrap(), v);
            prop_assert!(!text.contains('e') && !text.contains('E'));
        }
    }

    #[test]
    fn decimals_round_trip_through_text() {
        let v = Decimal::new(33_750, 4);
        assert_eq!(decimal_text(v), "3.375");
        assert_eq!(parse_decimal("balance", &decimal_text(v)).unwrap(), v);
        assert!(matches!(
            parse_decimal("balance", "abc"),
            Err(StoreError::Corrupt { column: "balance", .. })
        ));
    }
}
