//! BookMind - a conversational book assistant
//!
//! Runs multi-turn conversations with a hosted language model that can look
//! up books in the Open Library catalog while it answers.
//!
//! # Overview
//!
//! BookMind allows you to:
//! - Chat about books, with each conversation kept as a session
//! - Let the model search the catalog and find covers through tools
//! - Get three structured recommendations, with covers, from a single prompt
//! - Serve all of the above over HTTP
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `session` - In-memory conversation store
//! - `agent` - Prompt assembly, model gateway, tool registry and retry policy
//! - `catalog` - Open Library client and the tools built on it
//! - `orchestrator` - The agent loop that ties one exchange together
//! - `recommend` - One-shot structured recommendations
//! - `cli` - Command-line interface and HTTP server
//!
//! # Example
//!
//! ```rust,no_run
//! use bookmind::config::Settings;
//! use bookmind::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::from_settings(&settings)?;
//!
//!     let first = orchestrator.run(None, "Recommend a cozy mystery").await?;
//!     let follow_up = orchestrator
//!         .run(Some(&first.session_id), "Something shorter?")
//!         .await?;
//!     println!("{}", follow_up.text);
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod recommend;
pub mod session;

#[cfg(test)]
mod test_support;

pub use error::{BookMindError, Result};
