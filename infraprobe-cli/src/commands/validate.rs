//! `infraprobe validate` command handler

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use infraprobe_core::config::InfraprobeConfig;
use infraprobe_core::error::InfraprobeError;
use infraprobe_workflow::{WorkflowConfig, configure};

use crate::cli::WorkflowOverrides;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `validate` command.
///
/// Runs the same configure step as `run` (working directory, region
/// consistency) and builds its runner, but never calls a backend.
pub async fn execute(
    loaded: Result<InfraprobeConfig, InfraprobeError>,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating scenario");

    let report = ValidationReport::build(config_path, loaded);
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("scenario is invalid".to_owned()));
    }
    Ok(())
}

/// Scenario validation report.
#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<ResolvedWorkflow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<CheckSummary>,
}

/// Workflow configuration after configure. Environment values are omitted.
#[derive(Debug, Serialize)]
pub struct ResolvedWorkflow {
    pub working_dir: String,
    pub region: String,
    pub variables: BTreeMap<String, String>,
    pub environment: Vec<String>,
}

impl From<&WorkflowConfig> for ResolvedWorkflow {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            working_dir: config.working_dir().display().to_string(),
            region: config.region().to_owned(),
            variables: config
                .variables()
                .iter()
                .map(|(k, v)| (k.clone(), v.to_cli_value()))
                .collect(),
            environment: config.environment().keys().cloned().collect(),
        }
    }
}

/// Number of configured checks per kind.
#[derive(Debug, Serialize)]
pub struct CheckSummary {
    pub non_empty_outputs: usize,
    pub output_equals: usize,
    pub tags: usize,
    pub secrets: usize,
    pub readiness_ceiling_secs: u64,
    pub max_retries: u32,
}

impl ValidationReport {
    pub fn build(path: &Path, loaded: Result<InfraprobeConfig, InfraprobeError>) -> Self {
        let source = path.display().to_string();
        let config = match loaded {
            Ok(config) => config,
            Err(e) => {
                return Self {
                    source,
                    valid: false,
                    errors: vec![e.to_string()],
                    workflow: None,
                    checks: None,
                };
            }
        };

        let checks = CheckSummary {
            non_empty_outputs: config.verify.non_empty_outputs.len(),
            output_equals: config.verify.output_equals.len(),
            tags: config.verify.tags.len(),
            secrets: config.verify.secrets.len(),
            readiness_ceiling_secs: config.readiness.ceiling_secs,
            max_retries: config.retry.max_retries,
        };

        let mut errors = Vec::new();
        if let Err(e) = super::build_runner(&config) {
            errors.push(e.to_string());
        }
        let options = super::workflow_options(&config, &WorkflowOverrides::default());
        let workflow = match configure(options) {
            Ok(workflow) => Some(ResolvedWorkflow::from(&workflow)),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        };

        Self {
            source,
            valid: errors.is_empty(),
            errors,
            workflow,
            checks: Some(checks),
        }
    }
}

impl Render for ValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Scenario Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        if let Some(workflow) = &self.workflow {
            writeln!(w)?;
            writeln!(w, "  Working dir: {}", workflow.working_dir)?;
            writeln!(w, "  Region:      {}", workflow.region)?;
            for (key, value) in &workflow.variables {
                writeln!(w, "  var {key} = {value}")?;
            }
            for key in &workflow.environment {
                writeln!(w, "  env {key}")?;
            }
        }

        if let Some(checks) = &self.checks {
            writeln!(w)?;
            writeln!(
                w,
                "  Checks: {} non-empty output(s), {} output equality, {} tag filter(s), {} secret(s)",
                checks.non_empty_outputs, checks.output_equals, checks.tags, checks.secrets
            )?;
            writeln!(
                w,
                "  Readiness ceiling: {}s, max retries: {}",
                checks.readiness_ceiling_secs, checks.max_retries
            )?;
        }

        Ok(())
    }
}
