//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O happen here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// infraprobe -- provision, verify and tear down infrastructure scenarios.
///
/// Use `infraprobe <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "infraprobe", version, about, long_about = None)]
pub struct Cli {
    /// Path to the infraprobe.toml scenario file.
    #[arg(short, long, default_value = "infraprobe.toml", global = true)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision the stack, run every configured check, then destroy it.
    Run(RunArgs),

    /// Load and validate the scenario file without touching any infrastructure.
    Validate,

    /// Destroy whatever the working directory's state still holds.
    Destroy(DestroyArgs),
}

/// Overrides for the `[workflow]` section, shared by `run` and `destroy`.
#[derive(Args, Debug, Default, Clone)]
pub struct WorkflowOverrides {
    /// Infrastructure-as-code working directory.
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Deployment region.
    #[arg(long)]
    pub region: Option<String>,

    /// Extra provisioning variable, repeatable (KEY=VALUE).
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,
}

// ---- run ----

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: WorkflowOverrides,
}

// ---- destroy ----

#[derive(Args, Debug)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub overrides: WorkflowOverrides,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{s}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}
