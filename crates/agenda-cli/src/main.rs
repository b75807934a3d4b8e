mod commands;
mod render;

use std::path::PathBuf;

use agenda_auth::CredentialLocator;
use agenda_core::Config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agenda")]
#[command(about = "Google Calendar sign-in and sync for the agenda dashboard")]
struct Cli {
    /// Configuration root (defaults to $AGENDA_CONFIG_DIR or ~/.config/agenda)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether Google Calendar is configured and signed in
    Status,
    /// Sign in through the browser and store the token
    Login,
    /// Forget the stored token
    Logout,
    /// Fetch events and print them by day
    Sync {
        /// Keep running and re-sync on the configured interval
        #[arg(short, long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    agenda_core::init();
    let cli = Cli::parse();

    let (config, _) = match &cli.config_dir {
        Some(dir) => Config::load_validated_from(dir),
        None => Config::load_validated(),
    }
    .context("Failed to load configuration")?;

    let locator = CredentialLocator::new(&config.config_dir);
    tracing::debug!("Using configuration root {}", locator.root().display());

    match cli.command {
        Commands::Status => commands::status::run(&locator),
        Commands::Login => commands::login::run(&locator, &config).await,
        Commands::Logout => commands::logout::run(&locator),
        Commands::Sync { watch } => commands::sync::run(&locator, &config, watch).await,
    }
}
