//! Pre-flight checks before operations that need the hosted model.
//!
//! Fails fast with a helpful message instead of erroring on the first request.

use crate::config::Settings;
use crate::error::Result;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Chat, ask, recommend and serve all need the model API key.
    Model,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Model => {
            settings.model.api_key()?;
        }
    }
    Ok(())
}
