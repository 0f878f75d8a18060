//! `infraprobe destroy` command handler
//!
//! Tears down whatever the working directory's state still tracks, e.g.
//! after a run was killed before its teardown could finish.

use std::io::Write;

use serde::Serialize;
use tracing::{info, warn};

use infraprobe_core::config::InfraprobeConfig;

use crate::cli::DestroyArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `destroy` command.
pub async fn execute(
    args: DestroyArgs,
    config: InfraprobeConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let runner = super::build_runner(&config)?;
    let workflow = runner.configure(super::workflow_options(&config, &args.overrides))?;

    let working_dir = workflow.working_dir().display().to_string();
    let region = workflow.region().to_owned();
    info!(working_dir = %working_dir, region = %region, "destroying leftover infrastructure");

    let guard = runner.begin(workflow);
    let run_id = guard.session().run_id().to_string();
    let result = guard.release().await;
    if let Err(e) = &result {
        warn!(error = %e, "destroy did not complete");
    }

    let report = DestroyReport {
        run_id,
        working_dir,
        region,
        destroyed: result.is_ok(),
        error: result.as_ref().err().map(ToString::to_string),
    };
    writer.render(&report)?;

    result?;
    Ok(())
}

/// Destroy outcome.
#[derive(Debug, Serialize)]
pub struct DestroyReport {
    pub run_id: String,
    pub working_dir: String,
    pub region: String,
    pub destroyed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Render for DestroyReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Destroy {} ({})", self.working_dir.bold(), self.region)?;
        if self.destroyed {
            writeln!(w, "  Result: {}", "DESTROYED".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "FAILED".red().bold())?;
            if let Some(err) = &self.error {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}
