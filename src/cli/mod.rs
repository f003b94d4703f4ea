//! CLI module for BookMind.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// BookMind - a conversational book assistant
///
/// Chat about books, get recommendations with covers, and search the Open Library catalog.
#[derive(Parser, Debug)]
#[command(name = "bookmind")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "BOOKMIND_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind to (default: server.host from config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (default: server.port from config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Start an interactive chat session
    Chat {
        /// Session id to use (a new one is generated if omitted)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Send a single message to the agent
    Ask {
        /// The message to send
        message: String,

        /// Session id to continue
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Get three book recommendations for a prompt
    Recommend {
        /// What you are in the mood for
        prompt: String,
    },

    /// Search the book catalog
    Search {
        /// Book title
        #[arg(short, long)]
        title: Option<String>,

        /// Author name
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the current configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration file path
    Path,
}
