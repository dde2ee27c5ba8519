//! xcreen: command-line front end for the session orchestration core.
//!
//! Inspects and clears the reload cache, prints the effective config, and
//! runs an in-process demo session over the loopback transport.

mod cli;
mod demo;
mod room;
mod setup;

use tracing_subscriber::EnvFilter;
use xcreen_common::XcreenError;
use xcreen_config::XcreenConfig;

use crate::cli::{Args, Command, RoomCommand};

fn load_config(args: &Args) -> (XcreenConfig, Option<String>) {
    let loaded = match &args.config {
        Some(path) => xcreen_config::load_config_from(path),
        None => xcreen_config::load_config(),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(e) => (XcreenConfig::default(), Some(e.to_string())),
    }
}

fn init_logging(args: &Args, config: &XcreenConfig) {
    let fallback = args
        .log_level
        .as_deref()
        .map(cli::log_directive)
        .unwrap_or_else(|| config.logging.level.directive().to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: Args, config: XcreenConfig) -> Result<(), XcreenError> {
    match args.command {
        Command::Config => println!("{}", xcreen_config::config_to_json(&config)),
        Command::Room { action } => {
            let cache = setup::open_cache(&config)?;
            match action {
                RoomCommand::Show { room } => println!(
                    "{}",
                    room::show(&cache, room.as_deref(), &config.session.base_url)?
                ),
                RoomCommand::Clear { room } => println!("{}", room::clear(&cache, &room)),
            }
        }
        Command::Demo { viewers, room } => {
            demo::run(
                setup::session_options(&config),
                room.as_deref(),
                viewers,
                &config.session.base_url,
            )
            .await?
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = cli::parse();
    let (config, load_error) = load_config(&args);
    init_logging(&args, &config);

    tracing::debug!("xcreen v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        tracing::info!("Using config override: {}", path.display());
    }
    if let Some(e) = load_error {
        tracing::warn!("Config load failed, using defaults: {e}");
    }

    if let Err(e) = run(args, config).await {
        tracing::error!(error = %e, "Command failed");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
