//! Shared HTTP client construction for upstream services.

use crate::error::{BookMindError, Result};
use std::time::Duration;

/// Create an HTTP client with a custom timeout.
///
/// The timeout bounds the whole request, so a hung upstream surfaces as a
/// retryable transport error instead of stalling the exchange.
pub fn create_client_with_timeout(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("bookmind/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| BookMindError::Config(format!("Failed to create HTTP client: {}", e)))
}
