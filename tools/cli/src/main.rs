//! Command-line front end for SpendSync.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use spendsync_app::{AppConfig, AppContext, LoadOutcome};
use spendsync_common::{dates, ExpenseDraft};
use spendsync_net::ExpenseApi;

#[derive(Parser)]
#[command(name = "spendsync", version, about = "Offline-first expense tracking")]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    /// API root, e.g. http://localhost:3000/api
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Data directory for the database, cache, and token.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate and store the session token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Record an expense.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        amount: f64,
        #[arg(long, default_value = "Other")]
        category: String,
        #[arg(long, default_value = "USD")]
        currency: String,
        /// ISO-8601 date; defaults to now.
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List expenses, newest first.
    List {
        #[arg(long)]
        category: Option<String>,
        /// Convert amounts into this currency for display.
        #[arg(long)]
        convert_to: Option<String>,
    },
    /// Delete an expense by id.
    Delete { id: String },
    /// Run a sync pass now.
    Sync,
    /// Show connectivity, pending uploads, and sync state.
    Status,
    /// Clear the session, local data, and caches.
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = AppConfig::default();
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let ctx = AppContext::init(config)?;
    ctx.probe_health().await;

    match cli.command {
        Command::Login { email, password } => {
            let response = ctx.api.login(&email, &password).await?;
            match response.user {
                Some(user) => println!("logged in as {}", user.email),
                None => println!("logged in"),
            }
        }
        Command::Add {
            title,
            amount,
            category,
            currency,
            date,
            description,
        } => {
            let date = match date {
                Some(raw) => dates::parse(&raw)
                    .ok_or_else(|| anyhow::anyhow!("unrecognized date: {raw}"))?,
                None => Utc::now(),
            };
            let draft = ExpenseDraft {
                title,
                amount,
                category,
                currency,
                date,
                description,
            };
            let expense = ctx.repository.add(&draft).await?;
            let state = if expense.is_dirty() { "queued" } else { "synced" };
            println!("{} {} ({state})", expense.id, expense.title);
        }
        Command::List {
            category,
            convert_to,
        } => {
            let outcome = match &convert_to {
                Some(target) => {
                    ctx.repository
                        .list_converted(category.as_deref(), target)
                        .await?
                }
                None => ctx.repository.list(category.as_deref()).await?,
            };
            match outcome {
                LoadOutcome::Superseded => {}
                LoadOutcome::Loaded(expenses) => {
                    if expenses.is_empty() {
                        println!("no expenses");
                    }
                    for e in expenses {
                        let flag = if e.is_dirty() { "*" } else { " " };
                        println!(
                            "{flag} {}  {:>10.2} {}  {}  {}",
                            e.date.format("%Y-%m-%d"),
                            e.amount,
                            e.currency,
                            e.category,
                            e.title,
                        );
                    }
                }
            }
        }
        Command::Delete { id } => {
            ctx.repository.delete(&id).await?;
            println!("deleted {id}");
        }
        Command::Sync => match ctx.engine.sync().await? {
            Some(stats) => println!(
                "uploaded {} (failed {}), downloaded {}",
                stats.uploaded, stats.upload_failures, stats.downloaded
            ),
            None => println!("sync already running"),
        },
        Command::Status => {
            let online = ctx.connectivity.is_connected();
            println!("server:  {}", if online { "reachable" } else { "offline" });
            println!("auth:    {}", if ctx.tokens.is_authenticated() { "logged in" } else { "logged out" });
            println!("pending: {}", ctx.repository.pending_count()?);
            println!("sync:    {}", ctx.engine.status());
        }
        Command::Logout => {
            ctx.repository.logout().await?;
            println!("logged out");
        }
    }

    Ok(())
}
