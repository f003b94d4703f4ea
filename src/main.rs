//! BookMind CLI entry point.

use anyhow::Result;
use bookmind::cli::{commands, Cli, Commands};
use bookmind::config::Settings;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&Settings::expand_path(path)))?,
        None => Settings::load()?,
    };

    // Initialize logging: RUST_LOG wins, then -v, then the config file
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("bookmind={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Execute command
    match &cli.command {
        Commands::Serve { host, port } => {
            commands::run_serve(host.clone(), *port, settings).await?;
        }

        Commands::Chat { session } => {
            commands::run_chat(session.clone(), settings).await?;
        }

        Commands::Ask { message, session } => {
            commands::run_ask(message, session.as_deref(), settings).await?;
        }

        Commands::Recommend { prompt } => {
            commands::run_recommend(prompt, settings).await?;
        }

        Commands::Search { title, author } => {
            commands::run_search(title.as_deref(), author.as_deref(), settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings, cli.config.as_deref())?;
        }
    }

    Ok(())
}
