mod align;
mod api;
mod config;
mod detect;
mod error;
mod ingest;
mod manager;
mod mutation;
mod preprocess;
mod series;
mod stats;

use crate::manager::Manager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    work_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Ingest {
        #[arg(long)]
        table: PathBuf,
    },

    Preprocess {
        #[arg(long)]
        request: Option<PathBuf>,
    },

    Detect {
        #[arg(long)]
        request: Option<PathBuf>,
    },

    Run {
        #[arg(long)]
        table: PathBuf,
    },

    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mgr = Manager::new(args.work_dir).context("failed to construct mgr")?;

    match args.command {
        Command::Ingest { table } => mgr.ingest_table(table)?,
        Command::Preprocess { request } => mgr.preprocess_series(request.as_deref())?,
        Command::Detect { request } => mgr.detect_mutations(request.as_deref())?,
        Command::Run { table } => mgr.run_pipeline(table)?,
        Command::Clean => mgr.clean_outputs()?,
    }

    Ok(())
}
