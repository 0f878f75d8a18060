//! Command handlers -- one module per subcommand

pub mod destroy;
pub mod run;
pub mod validate;

use std::sync::Arc;

use infraprobe_core::config::InfraprobeConfig;
use infraprobe_workflow::{
    AwsCli, PatternClassifier, ReadinessPolicy, RetryPolicy, TerraformBackend, WorkflowOptions,
    WorkflowRunner, WorkflowRunnerBuilder,
};

use crate::cli::WorkflowOverrides;
use crate::error::CliError;

/// Runner backed by the real Terraform and AWS CLIs.
pub type CliRunner = WorkflowRunner<TerraformBackend, AwsCli, AwsCli>;

/// Build the runner from the `[workflow]`, `[retry]` and `[readiness]` sections.
pub fn build_runner(config: &InfraprobeConfig) -> Result<CliRunner, CliError> {
    let aws = Arc::new(AwsCli::from_core(&config.workflow));
    let runner = WorkflowRunnerBuilder::new()
        .provisioner(Arc::new(TerraformBackend::from_core(&config.workflow)))
        .resource_query(Arc::clone(&aws))
        .secret_store(aws)
        .retry_policy(RetryPolicy::from_core(&config.retry))
        .classifier(PatternClassifier::from_core(&config.retry)?)
        .readiness_policy(ReadinessPolicy::from_core(&config.readiness))
        .build()?;
    Ok(runner)
}

/// Merge command-line overrides into the `[workflow]` section.
pub fn workflow_options(config: &InfraprobeConfig, overrides: &WorkflowOverrides) -> WorkflowOptions {
    let mut options = WorkflowOptions::from_core(&config.workflow);
    if let Some(dir) = &overrides.working_dir {
        options.working_dir = dir.clone();
    }
    if let Some(region) = &overrides.region {
        options.region = region.clone();
    }
    for (key, value) in &overrides.vars {
        options = options.var(key.as_str(), value.as_str());
    }
    options
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use infraprobe_core::types::VarValue;

    use super::*;

    fn config() -> InfraprobeConfig {
        InfraprobeConfig::parse(
            r#"
[workflow]
working_dir = "../"
region = "us-west-2"

[workflow.vars]
instance_type = "t3.medium"
"#,
        )
        .expect("valid config")
    }

    #[test]
    fn options_follow_config_without_overrides() {
        let options = workflow_options(&config(), &WorkflowOverrides::default());
        assert_eq!(options.working_dir, PathBuf::from("../"));
        assert_eq!(options.region, "us-west-2");
        assert_eq!(
            options.variables.get("instance_type"),
            Some(&VarValue::from("t3.medium"))
        );
    }

    #[test]
    fn overrides_replace_config_values() {
        let overrides = WorkflowOverrides {
            working_dir: Some(PathBuf::from("/srv/stack")),
            region: Some("eu-central-1".to_owned()),
            vars: vec![("instance_type".to_owned(), "t3.small".to_owned())],
        };
        let options = workflow_options(&config(), &overrides);
        assert_eq!(options.working_dir, PathBuf::from("/srv/stack"));
        assert_eq!(options.region, "eu-central-1");
        assert_eq!(
            options.variables.get("instance_type"),
            Some(&VarValue::from("t3.small"))
        );
    }

    #[test]
    fn runner_uses_configured_policies() {
        let mut config = config();
        config.retry.max_retries = 7;
        config.readiness.ceiling_secs = 60;
        config.readiness.poll_interval_secs = 5;
        let runner = build_runner(&config).expect("runner builds");
        assert_eq!(runner.retry_policy().max_retries, 7);
        assert_eq!(runner.readiness_policy().ceiling.as_secs(), 60);
        assert_eq!(runner.readiness_policy().poll_interval.as_secs(), 5);
    }

    #[test]
    fn invalid_retry_pattern_is_config_error() {
        let mut config = config();
        config
            .retry
            .extra_patterns
            .insert("(unclosed".to_owned(), "broken".to_owned());
        let err = build_runner(&config)
            .err()
            .expect("bad regex must be rejected");
        assert_eq!(err.exit_code(), 2);
    }
}
