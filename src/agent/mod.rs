//! Agent building blocks: prompt assembly, the model gateway, tool dispatch
//! and retry policy. The loop that drives them lives in `orchestrator`.

mod gateway;
mod prompt;
mod retry;
mod tools;

pub use gateway::{
    ModelGateway, ModelMessage, ModelRequest, ModelResponse, OpenAiCompatGateway, ResponseSchema,
};
pub use prompt::PromptAssembler;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use tools::{Tool, ToolDispatcher, ToolRegistry, ToolSpec};
