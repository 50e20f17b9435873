// src/main.rs — Archer entry point

use clap::Parser;

use archer::cli::{Cli, Commands};
use archer::infra::config::Config;
use archer::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logger::init_logging(if cli.verbose { "debug" } else { "info" }, cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init = cli.command {
        return archer::cli::init::run_init().await;
    }

    // Falls back to defaults when no config.toml exists
    let config = match &cli.config {
        Some(path) => Config::load_from(std::path::Path::new(path))?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Train(args) => archer::cli::train::run_train(&config, args).await,
        Commands::Config => archer::cli::config::show_config(&config),
        Commands::Init => Ok(()),
    }
}
