#![deny(warnings)]

use persistence::{default_sqlite_url, ensure_parent_dir};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("IDLE_TYCOON_DB").unwrap_or_else(|_| default_sqlite_url().to_string());
    ensure_parent_dir(&url)?;
    let pool = persistence::init_db(&url).await?;
    pool.close().await;
    println!("DB migrated at {}", url);
    Ok(())
}
