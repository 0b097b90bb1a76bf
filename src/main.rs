//! mirrorcache CLI entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mirrorcache::cli::{Cli, Commands};
use mirrorcache::infrastructure::config::ConfigLoader;
use mirrorcache::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Keep the logger guard alive for the whole run.
    let _logger = if cli.verbose {
        match ConfigLoader::load().and_then(|config| LoggerImpl::init(&LogConfig::from(&config.logging))) {
            Ok(logger) => Some(logger),
            Err(err) => mirrorcache::cli::handle_error(err, cli.json),
        }
    } else {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        None
    };

    let result = match cli.command {
        Commands::Demo(args) => mirrorcache::cli::commands::demo::execute(args, cli.json).await,
        Commands::Config(args) => mirrorcache::cli::commands::config::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        mirrorcache::cli::handle_error(err, cli.json);
    }
}
