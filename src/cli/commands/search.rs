//! Search command implementation.

use crate::catalog::OpenLibraryClient;
use crate::cli::Output;
use crate::config::Settings;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(
    title: Option<&str>,
    author: Option<&str>,
    settings: Settings,
) -> Result<()> {
    let catalog = OpenLibraryClient::new(&settings.catalog)?;

    let spinner = Output::spinner("Searching Open Library...");
    let results = catalog.search(title, author).await;
    spinner.finish_and_clear();

    match results {
        Ok(search) => {
            if search.results.is_empty() {
                Output::warning("No books found.");
            } else {
                Output::success(&format!(
                    "Showing {} of {} books",
                    search.results.len(),
                    search.count
                ));
                for book in &search.results {
                    Output::book(book);
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
