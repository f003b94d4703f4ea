//! Error types for BookMind.

use thiserror::Error;

/// Library-level error type for BookMind operations.
#[derive(Error, Debug)]
pub enum BookMindError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Model service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Model service rejected the request: {0}")]
    UpstreamError(String),

    #[error("Agent exceeded its step budget ({0} tool calls)")]
    StepBudgetExceeded(usize),

    #[error("Book catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BookMindError {
    /// Machine-readable error kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            BookMindError::Config(_) => "config",
            BookMindError::UnknownSession(_) => "unknown_session",
            BookMindError::UnknownTool(_) => "unknown_tool",
            BookMindError::UpstreamUnavailable(_) => "upstream_unavailable",
            BookMindError::UpstreamError(_) => "upstream_error",
            BookMindError::StepBudgetExceeded(_) => "step_budget_exceeded",
            BookMindError::CatalogUnavailable(_) => "catalog_unavailable",
            BookMindError::ToolFailed(_) => "tool_failed",
            BookMindError::InvalidInput(_) => "invalid_input",
            BookMindError::Io(_)
            | BookMindError::Json(_)
            | BookMindError::TomlParse(_)
            | BookMindError::Http(_) => "internal",
        }
    }

    /// Whether the operation that produced this error may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookMindError::UpstreamUnavailable(_))
    }

    /// Message safe to show to API clients.
    ///
    /// Upstream and internal failures are summarized; their details only go to the log.
    pub fn public_message(&self) -> String {
        match self {
            BookMindError::UpstreamUnavailable(_) => {
                "The model service is temporarily unavailable. Please try again later.".to_string()
            }
            BookMindError::UpstreamError(_) => {
                "The model service could not produce a valid response.".to_string()
            }
            BookMindError::CatalogUnavailable(_) => {
                "The book catalog is temporarily unavailable.".to_string()
            }
            BookMindError::UnknownSession(_)
            | BookMindError::UnknownTool(_)
            | BookMindError::StepBudgetExceeded(_)
            | BookMindError::InvalidInput(_) => self.to_string(),
            _ => "Internal server error.".to_string(),
        }
    }
}

/// Result type alias for BookMind operations.
pub type Result<T> = std::result::Result<T, BookMindError>;
