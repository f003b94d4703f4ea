//! CLI command implementations.

mod ask;
mod chat;
mod config;
mod recommend;
mod search;
mod serve;

pub use ask::run_ask;
pub use chat::run_chat;
pub use config::run_config;
pub use recommend::run_recommend;
pub use search::run_search;
pub use serve::{router, run_serve, spawn_sweeper, AppState};

use crate::cli::Output;
use crate::orchestrator::AgentResponse;

/// Print each tool the agent used during an exchange.
fn print_tool_calls(response: &AgentResponse) {
    let mut turns = response.turns.iter().peekable();
    while let Some(turn) = turns.next() {
        if let Some(call) = &turn.tool_call {
            let success = turns
                .peek()
                .and_then(|next| next.tool_result.as_ref())
                .map(|result| result.success)
                .unwrap_or(false);
            Output::tool_call(call, success);
        }
    }
}
