//! infraprobe CLI entry point
//!
//! Loads the scenario file once, initialises logging from its `[general]`
//! section (or `--log-level`), then dispatches to the subcommand handler.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use infraprobe_core::config::{GeneralConfig, InfraprobeConfig};
use infraprobe_core::error::InfraprobeError;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = InfraprobeConfig::load(&cli.config).await;
    let general = loaded
        .as_ref()
        .map(|c| c.general.clone())
        .unwrap_or_else(|_| GeneralConfig::default());
    let level = cli.log_level.as_deref().unwrap_or(&general.log_level);

    if let Err(e) = logging::init_tracing(level, &general.log_format) {
        return report_error(&CliError::Config(e.to_string()));
    }

    let writer = OutputWriter::new(cli.output);
    match dispatch(cli.command, &cli.config, loaded, &writer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(&e),
    }
}

async fn dispatch(
    command: Commands,
    config_path: &Path,
    loaded: Result<InfraprobeConfig, InfraprobeError>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match command {
        Commands::Run(args) => commands::run::execute(args, loaded?, writer).await,
        Commands::Validate => commands::validate::execute(loaded, config_path, writer).await,
        Commands::Destroy(args) => commands::destroy::execute(args, loaded?, writer).await,
    }
}

fn report_error(err: &CliError) -> ExitCode {
    eprintln!("{} {err}", "error:".red().bold());
    ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
}
