//! `mirrorcache config`: print the effective configuration.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Load this YAML file instead of the project configuration
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, serde::Serialize)]
pub struct ConfigOutput {
    #[serde(flatten)]
    pub config: Config,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config)
            .unwrap_or_else(|e| format!("failed to render configuration: {e}"))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn load(args: &ConfigArgs) -> Result<Config> {
    match args.file {
        Some(ref path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

pub async fn execute(args: ConfigArgs, json_mode: bool) -> Result<()> {
    let config = load(&args).context("Failed to load configuration")?;
    output(&ConfigOutput { config }, json_mode);
    Ok(())
}
