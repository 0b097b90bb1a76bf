//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};

use crate::cli::commands::config::ConfigArgs;
use crate::cli::commands::demo::DemoArgs;

#[derive(Parser, Debug)]
#[command(name = "mirrorcache")]
#[command(about = "mirrorcache - shared cache mirrors over a single cache service", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Log using the configured logging settings instead of warnings on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sync scenarios against an in-process cache service
    Demo(DemoArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}
