#![deny(warnings)]

//! Headless command-line client: one sub-command per game operation,
//! JSON on stdout, logs on stderr.

use anyhow::{anyhow, bail, Context, Result};
use idle_core::{AccountId, CompanyId};
use idle_runtime::{config, Api, Engine, Request, SystemClock};
use persistence::Store;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage: idle-tycoon [--db URL] [--config FILE] <command> [args]

commands:
  create-account <username>
  profile <account>
  delete-account <account>
  click <account> [times]
  upgrade <account> <company>
  buy <account> <name>
  offline <account>
  ad-start <account>
  ad-complete <account>
  daily <account>
  transfer <from> <to> <amount>
  ledger <account> [limit]
  leaderboard [limit]
  request <json>
  version";

struct Args {
    db: Option<String>,
    config: Option<PathBuf>,
    command: Vec<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        db: None,
        config: None,
        command: Vec::new(),
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--db" => args.db = Some(it.next().context("--db needs a URL")?),
            "--config" => args.config = Some(it.next().context("--config needs a path")?.into()),
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            _ => args.command.push(arg),
        }
    }
    Ok(args)
}

fn arg<T: FromStr>(rest: &[String], idx: usize, name: &str) -> Result<T> {
    let raw = rest
        .get(idx)
        .ok_or_else(|| anyhow!("missing <{name}>\n\n{USAGE}"))?;
    raw.parse()
        .map_err(|_| anyhow!("invalid <{name}>: {raw}"))
}

fn opt_arg<T: FromStr>(rest: &[String], idx: usize, name: &str) -> Result<Option<T>> {
    match rest.get(idx) {
        Some(_) => arg(rest, idx, name).map(Some),
        None => Ok(None),
    }
}

fn account(rest: &[String], idx: usize) -> Result<AccountId> {
    arg(rest, idx, "account").map(AccountId)
}

/// Map a command line to requests. `click` may repeat.
fn to_requests(cmd: &str, rest: &[String]) -> Result<Vec<Request>> {
    let one = |r: Request| -> Result<Vec<Request>> { Ok(vec![r]) };
    match cmd {
        "create-account" => one(Request::CreateAccount {
            username: arg(rest, 0, "username")?,
        }),
        "profile" => one(Request::Profile {
            account_id: account(rest, 0)?,
        }),
        "delete-account" => one(Request::DeleteAccount {
            account_id: account(rest, 0)?,
        }),
        "click" => {
            let account_id = account(rest, 0)?;
            let times: u32 = opt_arg(rest, 1, "times")?.unwrap_or(1);
            Ok((0..times).map(|_| Request::Click { account_id }).collect())
        }
        "upgrade" => one(Request::UpgradeCompany {
            account_id: account(rest, 0)?,
            company_id: CompanyId(arg(rest, 1, "company")?),
        }),
        "buy" => one(Request::BuyCompany {
            account_id: account(rest, 0)?,
            name: rest.get(1..).map(|w| w.join(" ")).unwrap_or_default(),
        }),
        "offline" => one(Request::ClaimOfflineEarnings {
            account_id: account(rest, 0)?,
        }),
        "ad-start" => one(Request::StartAdSession {
            account_id: account(rest, 0)?,
        }),
        "ad-complete" => one(Request::CompleteAdSession {
            account_id: account(rest, 0)?,
        }),
        "daily" => one(Request::ClaimDailyReward {
            account_id: account(rest, 0)?,
        }),
        "transfer" => one(Request::Transfer {
            from_id: account(rest, 0)?,
            to_id: account(rest, 1)?,
            amount: arg::<Decimal>(rest, 2, "amount")?,
        }),
        "ledger" => one(Request::Ledger {
            account_id: account(rest, 0)?,
            limit: opt_arg(rest, 1, "limit")?,
        }),
        "leaderboard" => one(Request::Leaderboard {
            limit: opt_arg(rest, 0, "limit")?,
        }),
        "request" => {
            let body: String = arg(rest, 0, "json")?;
            Ok(vec![serde_json::from_str(&body).context("malformed request")?])
        }
        other => bail!("unknown command: {other}\n\n{USAGE}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let Some((cmd, rest)) = args.command.split_first() else {
        bail!("{USAGE}");
    };
    if cmd == "version" {
        println!(
            "idle-tycoon {} ({} {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }
    let requests = to_requests(cmd, rest)?;

    let game = config::load_config(args.config.as_deref())?;
    let url = config::database_url(args.db);
    persistence::ensure_parent_dir(&url)?;
    let store = Store::connect(&url).await?;
    info!(%url, command = %cmd, "starting CLI");

    let api = Api::new(Arc::new(Engine::new(store, game, Arc::new(SystemClock))));
    let mut failed = false;
    for req in requests {
        let resp = api.handle(req).await;
        println!("{}", serde_json::to_string_pretty(&resp.body)?);
        if !resp.is_success() {
            failed = true;
            break;
        }
    }
    api.engine().store().pool().close().await;
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
