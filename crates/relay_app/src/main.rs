//! `relay`: command-line front end of the sequential scraper.
mod cli;
mod commands;
mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use relay_engine::{FileSink, RelayEngine, SharedStore};
use relay_logging::{relay_debug, LogDestination};
use tokio::runtime::Handle;

use crate::cli::Cli;
use crate::config::AppConfig;

const DEFAULT_LOG_FILE: &str = "./relay.log";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    init_logging(&cli, &config);
    relay_debug!(
        "State in {}, results mirrored to {}",
        config.state_path.display(),
        config.results_path.display()
    );

    let store = Arc::new(
        SharedStore::open(&config.state_path)
            .with_context(|| format!("opening state file {}", config.state_path.display()))?,
    );
    let sink = Arc::new(FileSink::new(&config.results_path));
    let engine = RelayEngine::new(
        store.clone(),
        sink,
        config.relay_settings(),
        Handle::current(),
    );

    commands::execute(cli.command, &engine, &store, &mut std::io::stdout()).await
}

fn init_logging(cli: &Cli, config: &AppConfig) {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    match cli.log_file.as_deref().or(config.log_file.as_deref()) {
        Some(path) => relay_logging::initialize(LogDestination::Both, level, path),
        None => relay_logging::initialize(
            LogDestination::Terminal,
            level,
            Path::new(DEFAULT_LOG_FILE),
        ),
    }
}
