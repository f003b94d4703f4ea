//! Conversation state.
//!
//! A session is an append-only, totally ordered sequence of turns. The store is
//! the only owner of sessions and serializes writes per session id.

mod store;
mod turn;

pub use store::{Session, SessionHandle, SessionStore};
pub use turn::{Role, ToolCallRequest, ToolResult, Turn};
