//! testgrid — drive a simulated test-distribution session.
//!
//! Loads a pool configuration (`testgrid.toml`) and a JSON test list,
//! spawns one in-process simulated worker per configured spec, and runs
//! the broadcast scheduling session to completion.
//!
//! # Usage
//!
//! ```text
//! testgrid run --config demos/testgrid.toml --tests demos/tests.json
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

use testgrid_core::GridConfig;
use testgrid_scheduler::{ALLOWED_WORKERS_ENV, AllowList, BroadcastScheduler};
use testgrid_session::{Session, SimWorker};

#[derive(Parser)]
#[command(name = "testgrid", about = "TestGrid simulated session runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a simulated session against the configured worker pool.
    Run {
        /// Pool configuration file.
        #[arg(long, default_value = "testgrid.toml")]
        config: PathBuf,

        /// JSON file holding the ordered test list.
        #[arg(long)]
        tests: PathBuf,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,testgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            tests,
            json,
        } => run(config, tests, json).await,
    }
}

async fn run(config_path: PathBuf, tests_path: PathBuf, json: bool) -> anyhow::Result<()> {
    let config = GridConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let specs = config.worker_specs()?;

    let tests_raw = std::fs::read_to_string(&tests_path)
        .with_context(|| format!("reading {}", tests_path.display()))?;
    let collection: Vec<String> = serde_json::from_str(&tests_raw)
        .with_context(|| format!("parsing {}", tests_path.display()))?;

    // The environment wins over the config file.
    let allow_list = if std::env::var_os(ALLOWED_WORKERS_ENV).is_some() {
        AllowList::from_env()
    } else {
        match &config.pool.allowed {
            Some(ids) => AllowList::from_ids(ids.iter().cloned()),
            None => AllowList::allow_all(),
        }
    };

    info!(
        workers = specs.len(),
        tests = collection.len(),
        "starting simulated session"
    );

    let scheduler = BroadcastScheduler::new(specs.len(), allow_list);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    for (i, spec) in specs.iter().enumerate() {
        SimWorker::spawn(
            &format!("w{i}"),
            spec.clone(),
            collection.clone(),
            None,
            events_tx.clone(),
        );
    }
    drop(events_tx);

    let summary = Session::new(scheduler).run(events_rx).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "workers: {}  completed: {}  crashed: {}  finished: {}",
            specs.len(),
            summary.items_completed,
            summary.crashed.len(),
            summary.finished
        );
    }

    if !summary.finished {
        std::process::exit(1);
    }
    Ok(())
}
