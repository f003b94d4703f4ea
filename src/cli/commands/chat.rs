//! Interactive chat command.

use super::print_tool_calls;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};
use uuid::Uuid;

/// Run the interactive chat command.
pub async fn run_chat(session: Option<String>, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Model, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::from_settings(&settings)?;
    let mut session_id = session.unwrap_or_else(|| Uuid::new_v4().to_string());

    println!("\n{}", style("BookMind Chat").bold().cyan());
    println!(
        "{}",
        style("Ask about books, or type 'exit' to quit. 'clear' starts a new conversation.").dim()
    );
    println!("{}\n", style(format!("Session: {}", session_id)).dim());

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            orchestrator.store().delete(&session_id).await;
            session_id = Uuid::new_v4().to_string();
            Output::info(&format!("Started a new conversation ({}).", session_id));
            continue;
        }

        match orchestrator.run(Some(&session_id), input).await {
            Ok(response) => {
                print_tool_calls(&response);
                Output::reply(&response.text);
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
            }
        }
    }

    Ok(())
}
