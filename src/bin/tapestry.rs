//! Tapestry CLI Binary
//!
//! Command-line interface for the Tapestry content generation engine.

use anyhow::Context;
use clap::Parser;
use tapestry::cli::{map_error, Cli, RunContext};
use tapestry::config::TapestryConfig;
use tapestry::logging::{init_logging, LoggingConfig};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let context = match RunContext::new(cli.workspace.clone(), cli.config.clone()) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("{}", map_error(&e));
            std::process::exit(1);
        }
    };

    let logging_config = build_logging_config(&cli, context.config());
    init_logging(Some(&logging_config)).context("Failed to initialize logging")?;
    info!("Tapestry CLI starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match runtime.block_on(context.execute(&cli.command)) {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("{}", map_error(&e));
            std::process::exit(1);
        }
    }
}

/// Logging configuration from the config file, with CLI flags taking precedence.
fn build_logging_config(cli: &Cli, config: &TapestryConfig) -> LoggingConfig {
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        logging.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        logging.format = format.clone();
    }
    logging
}
