//! Ask command implementation.

use super::print_tool_calls;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the ask command: one exchange, printed with its session id so it can be continued.
pub async fn run_ask(message: &str, session: Option<&str>, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Model, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::from_settings(&settings)?;

    let spinner = Output::spinner("Thinking...");
    let result = orchestrator.run(session, message).await;
    spinner.finish_and_clear();

    match result {
        Ok(response) => {
            print_tool_calls(&response);
            Output::reply(&response.text);
            Output::kv("Session", &response.session_id);
        }
        Err(e) => {
            Output::error(&format!("Failed to get an answer: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
