//! Configuration module for BookMind.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AgentPrompts, Prompts, RecommendationPrompts};
pub use settings::{
    AgentSettings, CatalogSettings, GeneralSettings, ModelSettings, PromptSettings,
    ServerSettings, SessionSettings, Settings,
};
