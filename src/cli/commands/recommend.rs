//! Recommend command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::recommend::Recommender;
use anyhow::Result;

/// Run the recommend command.
pub async fn run_recommend(prompt: &str, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Model, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let recommender = Recommender::from_settings(&settings)?;

    let spinner = Output::spinner("Finding books...");
    let result = recommender.recommend(prompt).await;
    spinner.finish_and_clear();

    let list = match result {
        Ok(list) => list,
        Err(e) => {
            Output::error(&format!("Recommendation failed: {}", e));
            return Err(e.into());
        }
    };

    Output::header("Recommendations");
    for (i, rec) in list.recommendations.iter().enumerate() {
        Output::recommendation(i + 1, rec);
    }
    println!();

    Ok(())
}
