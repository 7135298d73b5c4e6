//! `maildelta` - headless mailbox sync daemon
//!
//! ```text
//! maildelta <config.json>          sync every account on the configured interval
//! maildelta <config.json> --once   run one cycle per account and exit
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use maildelta_core::{DaemonConfig, Scheduler, SqliteMailStore, Synchronizer, TcpConnector};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Headless mailbox sync daemon.
#[derive(Debug, Parser)]
#[command(name = "maildelta", version, about)]
struct Args {
    /// JSON file with the accounts and sync settings.
    config: PathBuf,

    /// Run one cycle per account, print new messages and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "maildelta=info,maildelta_core=info,maildelta_proto=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = DaemonConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let db_path = config.database_path()?;
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    let store = SqliteMailStore::new(&db_path.to_string_lossy())
        .await
        .with_context(|| format!("opening {}", db_path.display()))?;
    info!(
        accounts = config.accounts.len(),
        database = %db_path.display(),
        "starting maildelta"
    );

    let synchronizer = Arc::new(Synchronizer::new(
        Arc::new(store),
        TcpConnector,
        config.accounts.clone(),
    ));

    if args.once {
        run_once(&synchronizer, &config).await;
        synchronizer.shutdown().await;
        return Ok(());
    }

    Scheduler::new(synchronizer, config.sync_interval())
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Ctrl-C received");
        })
        .await;
    info!("maildelta stopped");
    Ok(())
}

/// One cycle per account, in configuration order.
async fn run_once(synchronizer: &Synchronizer<SqliteMailStore>, config: &DaemonConfig) {
    for account in &config.accounts {
        let Ok(report) = synchronizer.run(&account.stream_id).await else {
            // already logged by the synchronizer
            continue;
        };
        for mail in &report.new_messages {
            println!(
                "{}\t{}\t{}\t{}",
                account.stream_id,
                mail.uid,
                mail.from_address.as_deref().unwrap_or("-"),
                mail.subject.as_deref().unwrap_or("-"),
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["maildelta", "accounts.json"]).unwrap();
        assert_eq!(args.config, PathBuf::from("accounts.json"));
        assert!(!args.once);

        let args = Args::try_parse_from(["maildelta", "--once", "accounts.json"]).unwrap();
        assert!(args.once);

        assert!(Args::try_parse_from(["maildelta"]).is_err());
        assert!(Args::try_parse_from(["maildelta", "a.json", "--twice"]).is_err());
    }
}
