use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pubscope_core::AppConfig;
use pubscope_core::Database;
use pubscope_core::error::ExitCode;
use pubscope_science::harvest::{FileHarvester, StoredHarvester};
use pubscope_science::matcher::{find_unloaded_relations, unloaded_identifier_lines};
use pubscope_science::run::{build_harvester, collect_candidates};
use pubscope_science::{
    CandidateIdentifier, CommitMode, EligibilityFilter, Harvester, MatchRun, PreprintMatcher,
    Resolver, RunContext, SourceTag, SyncRun,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "pubscope",
    about = "Reconcile institutional DOIs against Crossref and DataCite",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file. Defaults to ~/.config/pubscope/config.toml.
    #[arg(long, global = true, env = "PUBSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG still wins when set).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the run report as JSON instead of a table.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest candidate identifiers, resolve them and reconcile the store.
    Sync {
        /// A single identifier (DOI, DOI URL or arXiv id). Repeatable.
        #[arg(long, action = clap::ArgAction::Append)]
        doi: Vec<String>,
        /// Line-delimited identifier file.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Harvest source by name (crossref, datacite, biorxiv, arxiv, openalex, departmental).
        #[arg(long, action = clap::ArgAction::Append)]
        source: Vec<String>,
        /// Re-resolve every identifier already in the store.
        #[arg(long)]
        refresh: bool,
        /// Commit changes. Without it the run is a dry run.
        #[arg(long)]
        write: bool,
        /// Directory for the JSON run report.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Link stored preprints to their primary publications.
    Match {
        /// Acceptance score, 0-100. Overrides matcher.threshold.
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,
        /// Replace the stored preprint edges.
        #[arg(long)]
        write: bool,
        /// Directory for the JSON report and audit.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List declared relation targets that are not in the store yet.
    Unloaded {
        /// Write the identifiers to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print the config file path.
    Path,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);
    let config = match AppConfig::load_from(&config_path) {
        Ok(config) => config,
        Err(e) => configuration_failure(&format!("{}: {e}", config_path.display())),
    };

    match cli.command {
        Commands::Sync {
            doi,
            file,
            source,
            refresh,
            write,
            output,
        } => {
            if doi.is_empty() && file.is_none() && source.is_empty() && !refresh {
                eprintln!("Nothing to sync: pass --doi, --file, --source or --refresh");
                std::process::exit(ExitCode::InvalidArgs as i32);
            }
            if let Err(e) = config.validate() {
                configuration_failure(&e.to_string());
            }

            let db = Arc::new(open_db(&config));
            let filter = EligibilityFilter::from_config(&config.institution)
                .unwrap_or_else(|e| configuration_failure(&e.to_string()));
            let resolver = Resolver::from_config(&config.registry)
                .unwrap_or_else(|e| configuration_failure(&e.to_string()));

            let mut harvesters: Vec<Box<dyn Harvester>> = Vec::new();
            if let Some(path) = file {
                harvesters.push(Box::new(FileHarvester::new(path)));
            }
            for name in &source {
                let tag: SourceTag = name
                    .parse()
                    .unwrap_or_else(|e: pubscope_science::ScienceError| {
                        configuration_failure(&e.to_string())
                    });
                let harvester = build_harvester(tag, &config, &db)
                    .unwrap_or_else(|e| configuration_failure(&e.to_string()));
                harvesters.push(harvester);
            }
            if refresh {
                harvesters.push(Box::new(StoredHarvester::new(Arc::clone(&db))));
            }

            let mut ctx = RunContext::new();
            let cancel = ctx.cancel_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current identifier");
                    cancel.store(true, Ordering::SeqCst);
                }
            });

            let mut candidates = collect_candidates(&harvesters, &mut ctx).await;
            for raw in &doi {
                match CandidateIdentifier::new(raw, SourceTag::Manual) {
                    Ok(candidate) => candidates.push(candidate),
                    Err(e) => warn!(identifier = %raw, error = %e, "skipping invalid identifier"),
                }
            }

            let mode = CommitMode::from_write_flag(write);
            let report = SyncRun::new(&db, &resolver, &filter, mode)
                .execute(candidates, ctx)
                .await;

            if cli.json {
                print_json(&report)?;
            } else {
                print!("{report}");
            }
            if let Some(dir) = output {
                let path = write_report(&dir, "sync", &report)?;
                info!(path = %path.display(), "wrote run report");
            }
            if report.aborted {
                std::process::exit(ExitCode::GeneralError as i32);
            }
        }

        Commands::Match {
            threshold,
            write,
            output,
        } => {
            let db = open_db(&config);
            let matcher = PreprintMatcher::new(
                threshold.unwrap_or(config.matcher.threshold),
                config.matcher.audit_margin,
            );
            let mode = CommitMode::from_write_flag(write);
            let report = MatchRun::new(&db, matcher, mode)
                .excluding_preprints(&config.matcher.excluded_preprint_prefixes)
                .execute()?;

            if cli.json {
                print_json(&report)?;
            } else {
                print!("{report}");
            }
            if let Some(dir) = output {
                let path = write_report(&dir, "match", &report)?;
                info!(path = %path.display(), "wrote match report");
                let path = write_report(&dir, "match-audit", &report.audit)?;
                info!(path = %path.display(), "wrote match audit");
            }
        }

        Commands::Unloaded { output } => {
            let db = open_db(&config);
            let records = db.list_all_records()?;
            let unloaded = find_unloaded_relations(&records);
            info!(count = unloaded.len(), "relation targets missing from the store");

            if cli.json {
                print_json(&unloaded)?;
            } else {
                let lines = unloaded_identifier_lines(&unloaded);
                match output {
                    Some(path) => {
                        std::fs::write(&path, lines)
                            .with_context(|| format!("writing {}", path.display()))?;
                        info!(path = %path.display(), "wrote identifier file");
                    }
                    None => print!("{lines}"),
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                if cli.json {
                    print_json(&config)?;
                } else {
                    print!("{}", toml::to_string_pretty(&config)?);
                }
            }
            ConfigAction::Path => println!("{}", config_path.display()),
        },
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Reports a configuration problem and exits before anything is written.
fn configuration_failure(message: &str) -> ! {
    eprintln!("Configuration error: {message}");
    std::process::exit(ExitCode::ConfigurationFailure as i32);
}

fn open_db(config: &AppConfig) -> Database {
    let db_path = config.database_path();
    Database::open(&db_path)
        .unwrap_or_else(|e| configuration_failure(&format!("{}: {e}", db_path.display())))
}

fn print_json<T: Serialize + ?Sized>(val: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

/// Writes `<dir>/<stem>-<timestamp>.json` and returns its path.
fn write_report<T: Serialize + ?Sized>(dir: &Path, stem: &str, val: &T) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{stem}-{}.json", Utc::now().format("%Y%m%dT%H%M%SZ")));
    std::fs::write(&path, serde_json::to_string_pretty(val)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
