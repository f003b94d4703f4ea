//! Config command implementation.

use crate::cli::{ConfigAction, Output};
use crate::config::Settings;
use anyhow::Result;
use std::path::PathBuf;

/// Run the config command. `config_override` is the `--config` path, if given.
pub fn run_config(
    action: &ConfigAction,
    settings: Settings,
    config_override: Option<&str>,
) -> Result<()> {
    let config_path = config_override
        .map(Settings::expand_path)
        .unwrap_or_else(Settings::default_config_path);

    match action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&settings)
                .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
            println!("{}", toml_str);
        }

        ConfigAction::Init { force } => {
            write_config(&settings, &config_path, *force)?;
        }

        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
    }

    Ok(())
}

fn write_config(settings: &Settings, path: &PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        Output::warning(&format!("Config already exists at {}", path.display()));
        Output::info("Use --force to overwrite it.");
        return Ok(());
    }

    settings.save_to(path)?;
    Output::success(&format!("Wrote config to {}", path.display()));
    Ok(())
}
