//! One-shot structured book recommendations.
//!
//! The model is asked for a fixed number of books as JSON, then each book's
//! cover is looked up in the catalog concurrently.

use crate::agent::{
    retry_with_backoff, ModelGateway, ModelMessage, ModelRequest, ModelResponse,
    OpenAiCompatGateway, ResponseSchema, RetryPolicy,
};
use crate::catalog::OpenLibraryClient;
use crate::config::{Prompts, Settings};
use crate::error::{BookMindError, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Number of books requested per recommendation.
pub const RECOMMENDATION_COUNT: usize = 3;

/// A recommendation as the model returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBookRecommendation {
    pub title: String,
    pub author: String,
    pub reasoning: String,
}

#[derive(Debug, Deserialize)]
struct AgentRecommendationList {
    recommendations: Vec<AgentBookRecommendation>,
}

/// A recommendation with its cover attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecommendation {
    pub title: String,
    pub author: String,
    pub reasoning: String,
    pub cover_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationList {
    pub recommendations: Vec<BookRecommendation>,
}

/// Produces structured recommendations from a free-form reader prompt.
pub struct Recommender {
    gateway: Arc<dyn ModelGateway>,
    catalog: Arc<OpenLibraryClient>,
    system_instruction: String,
    retry: RetryPolicy,
}

impl Recommender {
    pub fn new(
        settings: &Settings,
        gateway: Arc<dyn ModelGateway>,
        catalog: Arc<OpenLibraryClient>,
    ) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let mut vars = HashMap::new();
        vars.insert(
            "recommendation_count".to_string(),
            RECOMMENDATION_COUNT.to_string(),
        );
        let system_instruction =
            prompts.render_with_custom(&prompts.recommendation.system, &vars);

        Ok(Self::with_components(
            gateway,
            catalog,
            system_instruction,
            RetryPolicy::from(&settings.agent),
        ))
    }

    /// Create a recommender that talks to the configured hosted model.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let gateway = Arc::new(OpenAiCompatGateway::new(&settings.model)?);
        let catalog = Arc::new(OpenLibraryClient::new(&settings.catalog)?);
        Self::new(settings, gateway, catalog)
    }

    pub fn with_components(
        gateway: Arc<dyn ModelGateway>,
        catalog: Arc<OpenLibraryClient>,
        system_instruction: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            catalog,
            system_instruction: system_instruction.into(),
            retry,
        }
    }

    /// Ask the model for recommendations and attach a cover to each.
    #[instrument(skip(self, prompt))]
    pub async fn recommend(&self, prompt: &str) -> Result<RecommendationList> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(BookMindError::InvalidInput("prompt must not be empty".to_string()));
        }

        let request = ModelRequest {
            system_instruction: self.system_instruction.clone(),
            messages: vec![ModelMessage::User(prompt.to_string())],
            tools: Vec::new(),
            response_schema: None,
        }
        .with_response_schema(recommendation_schema());

        let response = retry_with_backoff(self.retry, || self.gateway.invoke(&request)).await?;
        let text = match response {
            ModelResponse::FinalAnswer(text) => text,
            ModelResponse::ToolCall(call) => {
                return Err(BookMindError::UpstreamError(format!(
                    "model requested tool '{}' instead of recommendations",
                    call.name
                )));
            }
        };

        let parsed: AgentRecommendationList = serde_json::from_str(strip_code_fence(&text))
            .map_err(|e| {
                BookMindError::UpstreamError(format!("malformed recommendations: {}", e))
            })?;

        if parsed.recommendations.len() != RECOMMENDATION_COUNT {
            warn!(
                "Model returned {} recommendation(s), expected {}",
                parsed.recommendations.len(),
                RECOMMENDATION_COUNT
            );
        }

        let covers = join_all(
            parsed
                .recommendations
                .iter()
                .map(|rec| self.catalog.lookup_cover(&rec.title, &rec.author)),
        )
        .await;

        let recommendations: Vec<BookRecommendation> = parsed
            .recommendations
            .into_iter()
            .zip(covers)
            .map(|(rec, cover_url)| BookRecommendation {
                title: rec.title,
                author: rec.author,
                reasoning: rec.reasoning,
                cover_url,
            })
            .collect();

        info!("Produced {} recommendation(s)", recommendations.len());
        Ok(RecommendationList { recommendations })
    }
}

fn recommendation_schema() -> ResponseSchema {
    ResponseSchema {
        name: "book_recommendations".to_string(),
        description: Some("A list of book recommendations".to_string()),
        schema: json!({
            "type": "object",
            "properties": {
                "recommendations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {
                                "type": "string",
                                "description": "The exact title of the recommended book"
                            },
                            "author": {
                                "type": "string",
                                "description": "The author of the recommended book"
                            },
                            "reasoning": {
                                "type": "string",
                                "description": "Why this book fits the reader's request"
                            }
                        },
                        "required": ["title", "author", "reasoning"]
                    }
                }
            },
            "required": ["recommendations"]
        }),
    }
}

/// Models sometimes wrap JSON in a markdown fence despite the schema.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
