//! Agent tools backed by the book catalog.

use super::{CatalogQuery, OpenLibraryClient};
use crate::agent::{Tool, ToolRegistry};
use crate::error::{BookMindError, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Register every catalog-backed tool.
pub fn register_book_tools(
    registry: &mut ToolRegistry,
    catalog: Arc<OpenLibraryClient>,
) -> Result<()> {
    registry.register(Arc::new(SearchCatalogTool::new(catalog.clone())))?;
    registry.register(Arc::new(LookupCoverTool::new(catalog)))?;
    Ok(())
}

/// `search_catalog`: find books by title, author or genre.
pub struct SearchCatalogTool {
    catalog: Arc<OpenLibraryClient>,
}

impl SearchCatalogTool {
    pub fn new(catalog: Arc<OpenLibraryClient>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for SearchCatalogTool {
    fn name(&self) -> &str {
        "search_catalog"
    }

    fn description(&self) -> &str {
        "Search the Open Library catalog for books by title, author, or genre. \
        Use this to confirm that a book exists and to get its ISBN, publication year and cover."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Full or partial book title"
                },
                "author": {
                    "type": "string",
                    "description": "Author name"
                },
                "genre": {
                    "type": "string",
                    "description": "Genre or subject, e.g. 'science fiction'"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of results (default: 5)",
                    "default": 5
                }
            }
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<Value> {
        let text = |key: &str| arguments.get(key).and_then(Value::as_str).map(str::to_string);
        let query = CatalogQuery {
            title: text("title"),
            author: text("author"),
            subject: text("genre"),
            // Integral floats such as 5.0 pass schema validation.
            limit: Some(arguments.get("limit").and_then(Value::as_f64).unwrap_or(5.0) as usize),
        };

        let search = self.catalog.search_query(&query).await?;
        Ok(serde_json::to_value(search)?)
    }
}

/// `lookup_cover`: find a cover image for one book.
pub struct LookupCoverTool {
    catalog: Arc<OpenLibraryClient>,
}

impl LookupCoverTool {
    pub fn new(catalog: Arc<OpenLibraryClient>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for LookupCoverTool {
    fn name(&self) -> &str {
        "lookup_cover"
    }

    fn description(&self) -> &str {
        "Get a publicly accessible cover image URL for a book."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Exact book title"
                },
                "author": {
                    "type": "string",
                    "description": "Author name (optional, improves accuracy)"
                }
            },
            "required": ["title"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<Value> {
        let title = arguments
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| BookMindError::InvalidInput("'title' must not be empty".to_string()))?;
        let author = arguments.get("author").and_then(Value::as_str).unwrap_or("");

        let cover_url = self.catalog.lookup_cover(title, author).await;
        Ok(json!({ "title": title, "author": author, "cover_url": cover_url }))
    }
}
