//! Model request assembly from session history.

use super::gateway::{ModelMessage, ModelRequest};
use super::tools::ToolSpec;
use crate::session::{Session, Turn};

/// Builds model requests from a session and new user input.
///
/// Assembly is a pure function of its inputs: the same session state and input
/// always produce the same request.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_instruction: String,
    max_context_turns: usize,
    tools: Vec<ToolSpec>,
}

impl PromptAssembler {
    pub fn new(system_instruction: impl Into<String>, max_context_turns: usize) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            max_context_turns,
            tools: Vec::new(),
        }
    }

    /// Offer these tools to the model in every request.
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Request for the first model call of an exchange.
    pub fn build(&self, session: &Session, user_input: &str) -> ModelRequest {
        self.build_continuation(session, user_input, &[])
    }

    /// Request for a follow-up call, after the tool turns produced so far in
    /// this exchange. Exchange turns are never truncated.
    pub fn build_continuation(
        &self,
        session: &Session,
        user_input: &str,
        exchange: &[Turn],
    ) -> ModelRequest {
        let history = context_window(session.turns(), self.max_context_turns);

        let messages = history
            .iter()
            .map(ModelMessage::from)
            .chain(std::iter::once(ModelMessage::User(user_input.to_string())))
            .chain(exchange.iter().map(ModelMessage::from))
            .collect();

        ModelRequest {
            system_instruction: self.system_instruction.clone(),
            messages,
            tools: self.tools.clone(),
            response_schema: None,
        }
    }
}

/// The most recent `max_turns` turns, never starting on a tool result whose
/// call was cut off.
fn context_window(turns: &[Turn], max_turns: usize) -> &[Turn] {
    let mut start = turns.len().saturating_sub(max_turns);
    while start < turns.len() && turns[start].is_tool_result() {
        start += 1;
    }
    &turns[start..]
}
