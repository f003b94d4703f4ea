//! CLI output formatting utilities.

use crate::catalog::CatalogBook;
use crate::recommend::BookRecommendation;
use crate::session::ToolCallRequest;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print the agent's reply.
    pub fn reply(text: &str) {
        println!("\n{} {}\n", style("BookMind:").cyan().bold(), text);
    }

    /// Print a tool the agent called during an exchange.
    pub fn tool_call(call: &ToolCallRequest, success: bool) {
        let mark = if success {
            style("ok").green()
        } else {
            style("failed").red()
        };
        println!(
            "  {} {}",
            style(format!("[{}]", preview(&call.to_string(), 80))).dim(),
            mark
        );
    }

    /// Print a catalog search hit.
    pub fn book(book: &CatalogBook) {
        let title = book.title.as_deref().unwrap_or("Untitled");
        let year = book
            .publish_year
            .map(|y| format!(" ({})", y))
            .unwrap_or_default();
        println!(
            "  {} {}{} by {}",
            style("*").cyan(),
            style(title).bold(),
            year,
            book.author
        );
        if let Some(isbn) = &book.isbn {
            println!("    {}", style(format!("ISBN {}", isbn)).dim());
        }
        if let Some(url) = &book.cover_url {
            println!("    {}", style(url).dim());
        }
    }

    /// Print a recommendation.
    pub fn recommendation(index: usize, rec: &BookRecommendation) {
        println!(
            "\n{} {} by {}",
            style(format!("{}.", index)).green().bold(),
            style(&rec.title).bold(),
            rec.author
        );
        println!("   {}", rec.reasoning);
        println!("   {}", style(&rec.cover_url).dim());
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        let template = ProgressStyle::default_spinner().template("{spinner:.green} {msg}");
        if let Ok(spinner_style) = template {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Flatten and truncate text for one-line display.
fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let truncated: String = flat.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
