//! rosterdex CLI - operate the local sports entity mirror from a terminal.
//!
//! # Usage
//!
//! ```bash
//! rosterdex sync NBA
//! rosterdex search NBA "lebr" --type player
//! rosterdex status NBA
//! rosterdex interactive NBA
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rosterdex::sync::is_stale;
use rosterdex::{EntityFilter, RosterConfig, RosterStore, SearchResult, SessionOptions, SyncStatus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rosterdex", version, about)]
struct Args {
    /// Path to the local SQLite mirror
    #[arg(long, env = "ROSTERDEX_DB", default_value = "rosterdex.sqlite")]
    db: PathBuf,

    /// Backend-of-record base URL
    #[arg(long, env = "ROSTERDEX_BACKEND_URL")]
    backend: Option<String>,

    /// Seconds after which a synced sport is considered stale
    #[arg(long)]
    max_age_secs: Option<u64>,

    /// Enable verbose logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh a sport from the backend
    Sync {
        sport: String,
        /// Fetch even if the local copy is fresh
        #[arg(long)]
        force: bool,
    },
    /// Search players and teams by partial name
    Search {
        sport: String,
        query: String,
        #[arg(long = "type", value_enum, default_value_t = Kind::Both)]
        kind: Kind,
        #[arg(short = 'n', long)]
        limit: Option<u32>,
    },
    /// Show sync metadata for a sport
    Status { sport: String },
    /// Delete a sport's local rows and sync metadata
    Clear { sport: String },
    /// Type queries line by line through a debounced search session
    Interactive {
        sport: String,
        #[arg(long = "type", value_enum, default_value_t = Kind::Both)]
        kind: Kind,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Player,
    Team,
    Both,
}

impl From<Kind> for EntityFilter {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Player => EntityFilter::Player,
            Kind::Team => EntityFilter::Team,
            Kind::Both => EntityFilter::Both,
        }
    }
}

fn build_config(args: &Args) -> RosterConfig {
    let mut config = RosterConfig::default();
    if let Some(backend) = &args.backend {
        config.backend_base_url = backend.clone();
    }
    if let Some(max_age_secs) = args.max_age_secs {
        config.max_age_secs = max_age_secs;
    }
    config
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("  (no matches)");
        return;
    }
    for (rank, result) in results.iter().enumerate() {
        println!("  {:>2}. {:<40} {:<6} {}", rank + 1, result.display_label, result.entity_type.as_str(), result.id);
    }
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.verbose {
            EnvFilter::new("info")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = build_config(&args);
    let db_path = args.db.to_string_lossy().into_owned();
    let store = RosterStore::new_with_config(db_path.clone(), config.clone())
        .with_context(|| format!("Failed to open local store at {}", db_path))?;
    tracing::info!(db = %db_path, backend = %config.backend_base_url, "local store opened");

    match args.command {
        Command::Sync { sport, force } => {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
            spinner.set_message(format!("Syncing {} from {}", sport, config.backend_base_url));
            spinner.enable_steady_tick(Duration::from_millis(100));

            let result = store.sync_sport(sport.clone(), force).await;
            spinner.finish_and_clear();
            let report = result.with_context(|| format!("Sync of {} failed", sport))?;

            let status = match report.status {
                SyncStatus::Skipped => "fresh, skipped",
                SyncStatus::NotModified => "not modified",
                SyncStatus::Updated => "updated",
            };
            println!(
                "{}: {} (version {}, {} players, {} teams)",
                report.sport,
                status,
                report.dataset_version.as_deref().unwrap_or("-"),
                report.player_count,
                report.team_count
            );
        }

        Command::Search { sport, query, kind, limit } => {
            let limit = limit.unwrap_or(config.default_limit);
            let results = store
                .search(sport, kind.into(), query, limit)
                .await
                .context("Search failed")?;
            print_results(&results);
        }

        Command::Status { sport } => {
            match store.sync_metadata(sport.clone()).context("Failed to read sync metadata")? {
                Some(meta) => {
                    let now = chrono::Utc::now().timestamp();
                    let due = is_stale(Some(&meta), now, config.max_age());
                    println!("sport:        {}", meta.sport);
                    println!("version:      {}", meta.dataset_version);
                    println!("last sync:    {}", format_timestamp(meta.last_sync_timestamp));
                    println!("players:      {}", meta.player_count);
                    println!("teams:        {}", meta.team_count);
                    println!("due for sync: {}", if due { "yes" } else { "no" });
                }
                None => println!("{}: never synced", sport),
            }
            println!("database:     {} bytes", store.database_size());
        }

        Command::Clear { sport } => {
            let deleted = store
                .clear_sport(sport.clone())
                .await
                .with_context(|| format!("Failed to clear {}", sport))?;
            println!("{}: deleted {} rows", sport, deleted);
        }

        Command::Interactive { sport, kind } => {
            store.select_sport(sport.clone());
            let session = store.session_with(SessionOptions {
                filter: kind.into(),
                limit: config.default_limit,
                debounce: config.debounce(),
                ..SessionOptions::new(sport.as_str())
            });
            let mut state = session.subscribe();
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut shown: u64 = 0;

            eprintln!("Type a name and press enter. Ctrl-D to quit.");
            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        match line.context("Failed to read stdin")? {
                            Some(line) => session.set_query(line),
                            None => break,
                        }
                    }
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = state.borrow_and_update().clone();
                        if !current.loading && current.request_id > shown {
                            shown = current.request_id;
                            println!("[{}] {:?}", current.request_id, current.query);
                            match &current.error {
                                Some(error) => println!("  error: {}", error),
                                None => print_results(&current.results),
                            }
                            std::io::stdout().flush()?;
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
