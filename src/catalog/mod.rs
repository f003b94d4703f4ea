//! Book catalog lookups against Open Library.
//!
//! Backs the agent's catalog tools and the `/books` endpoints.

mod tools;

pub use tools::{register_book_tools, LookupCoverTool, SearchCatalogTool};

use crate::config::CatalogSettings;
use crate::error::{BookMindError, Result};
use crate::http::create_client_with_timeout;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Placeholder shown when a book has no known cover.
pub const COVER_NOT_FOUND_URL: &str =
    "https://placehold.co/200x300/e0e0e0/000000?text=Cover+Not+Found";

/// Placeholder shown when the cover lookup itself failed.
pub const COVER_ERROR_URL: &str = "https://placehold.co/200x300/e0e0e0/000000?text=Error+Loading";

/// Only the first this-many search hits are considered.
const SEARCH_DOC_LIMIT: usize = 20;

/// Search criteria. At least one of title, author or subject is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    /// Maximum results, capped by the configured maximum.
    pub limit: Option<usize>,
}

impl CatalogQuery {
    pub fn by_title_and_author(title: Option<String>, author: Option<String>) -> Self {
        Self {
            title,
            author,
            ..Self::default()
        }
    }

    fn params(&self) -> Vec<(&'static str, &str)> {
        [
            ("title", &self.title),
            ("author", &self.author),
            ("subject", &self.subject),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        })
        .collect()
    }
}

/// A book found in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogBook {
    pub title: Option<String>,
    pub author: String,
    pub isbn: Option<String>,
    pub cover_url: Option<String>,
    pub publish_year: Option<i32>,
}

/// Search results. `count` is the number of matches before truncation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSearch {
    pub count: usize,
    pub results: Vec<CatalogBook>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    title: Option<String>,
    #[serde(default)]
    author_name: Vec<String>,
    #[serde(default)]
    isbn: Vec<String>,
    cover_i: Option<i64>,
    first_publish_year: Option<i32>,
}

/// Open Library search and cover client.
pub struct OpenLibraryClient {
    http: reqwest::Client,
    search_url: String,
    covers_url: String,
    max_results: usize,
}

impl OpenLibraryClient {
    pub fn new(settings: &CatalogSettings) -> Result<Self> {
        Ok(Self {
            http: create_client_with_timeout(Duration::from_secs(settings.timeout_secs))?,
            search_url: settings.search_url.clone(),
            covers_url: settings.covers_url.trim_end_matches('/').to_string(),
            max_results: settings.max_results,
        })
    }

    /// Search by title and/or author.
    pub async fn search(&self, title: Option<&str>, author: Option<&str>) -> Result<CatalogSearch> {
        self.search_query(&CatalogQuery::by_title_and_author(
            title.map(str::to_string),
            author.map(str::to_string),
        ))
        .await
    }

    /// Search the catalog, keeping only books that have an ISBN or a cover.
    #[instrument(skip(self))]
    pub async fn search_query(&self, query: &CatalogQuery) -> Result<CatalogSearch> {
        let params = query.params();
        if params.is_empty() {
            return Err(BookMindError::InvalidInput(
                "Please provide at least a title, author or genre".to_string(),
            ));
        }

        let docs = self
            .fetch_docs(&params)
            .await
            .map_err(|e| BookMindError::CatalogUnavailable(e.to_string()))?;

        let books: Vec<CatalogBook> = docs
            .into_iter()
            .take(SEARCH_DOC_LIMIT)
            .map(|doc| self.to_book(doc))
            .filter(|book| book.isbn.is_some() || book.cover_url.is_some())
            .collect();

        let limit = query.limit.unwrap_or(self.max_results).min(self.max_results);
        debug!("Catalog search matched {} book(s)", books.len());

        Ok(CatalogSearch {
            count: books.len(),
            results: books.into_iter().take(limit).collect(),
        })
    }

    /// Find a cover image URL. Never fails: lookups that find nothing or go
    /// wrong yield a placeholder image.
    #[instrument(skip(self))]
    pub async fn lookup_cover(&self, title: &str, author: &str) -> String {
        let query = CatalogQuery::by_title_and_author(
            Some(title.to_string()),
            Some(author.to_string()),
        );

        let docs = match self.fetch_docs(&query.params()).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!("Cover lookup failed for '{}': {}", title, e);
                return COVER_ERROR_URL.to_string();
            }
        };

        docs.into_iter()
            .next()
            .and_then(|doc| self.cover_url(doc.isbn.first().map(String::as_str), doc.cover_i))
            .unwrap_or_else(|| COVER_NOT_FOUND_URL.to_string())
    }

    async fn fetch_docs(
        &self,
        params: &[(&str, &str)],
    ) -> std::result::Result<Vec<SearchDoc>, reqwest::Error> {
        let response: SearchResponse = self
            .http
            .get(&self.search_url)
            .query(params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.docs)
    }

    fn to_book(&self, doc: SearchDoc) -> CatalogBook {
        let isbn = doc.isbn.into_iter().next();
        let cover_url = self.cover_url(isbn.as_deref(), doc.cover_i);
        CatalogBook {
            title: doc.title,
            author: doc
                .author_name
                .into_iter()
                .next()
                .unwrap_or_else(|| "Unknown".to_string()),
            isbn,
            cover_url,
            publish_year: doc.first_publish_year,
        }
    }

    /// Cover by ISBN when known, else by Open Library cover id.
    fn cover_url(&self, isbn: Option<&str>, cover_id: Option<i64>) -> Option<String> {
        let isbn = isbn.map(clean_isbn).filter(|i| !i.is_empty());
        match (isbn, cover_id) {
            (Some(isbn), _) => Some(format!("{}/isbn/{}-L.jpg", self.covers_url, isbn)),
            (None, Some(id)) => Some(format!("{}/id/{}-L.jpg", self.covers_url, id)),
            (None, None) => None,
        }
    }
}

fn clean_isbn(isbn: &str) -> String {
    isbn.chars().filter(|c| *c != '-' && *c != ' ').collect()
}
