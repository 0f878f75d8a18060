//! `infraprobe run` command handler

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use tracing::{info, warn};

use infraprobe_core::config::{InfraprobeConfig, TagCheck, VerifySection};
use infraprobe_core::types::VerificationResult;
use infraprobe_workflow::{
    ProvisioningBackend, ResourceQuery, SecretStore, VerificationReport, Verifier,
    WorkflowContext, WorkflowError, WorkflowReport,
};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `run` command.
///
/// The stack is destroyed on every path once apply has been attempted; the
/// report is rendered before the first failure is turned into an exit code.
pub async fn execute(
    args: RunArgs,
    config: InfraprobeConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let runner = super::build_runner(&config)?;
    let workflow = runner.configure(super::workflow_options(&config, &args.overrides))?;
    let scenario = Scenario::from_config(&config);

    info!(
        working_dir = %workflow.working_dir().display(),
        region = workflow.region(),
        checks = scenario.planned_checks(),
        "starting workflow"
    );

    let report = runner.run(workflow, move |ctx| scenario.verify(ctx)).await;
    writer.render(&RunReport::from_workflow(&report))?;
    report.into_result()?;
    Ok(())
}

/// Checks read from the `[verify]` and `[readiness]` sections.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    verify: VerifySection,
    readiness_tag: Option<TagCheck>,
}

impl Scenario {
    pub fn from_config(config: &InfraprobeConfig) -> Self {
        let readiness_tag = match (&config.readiness.tag_key, &config.readiness.tag_value) {
            (Some(key), Some(value)) => Some(TagCheck {
                key: key.clone(),
                value: value.clone(),
            }),
            _ => None,
        };
        Self {
            verify: config.verify.clone(),
            readiness_tag,
        }
    }

    pub fn planned_checks(&self) -> usize {
        self.verify.non_empty_outputs.len()
            + self.verify.output_equals.len()
            + self.verify.tags.len()
            + self.verify.secrets.len()
    }

    /// Verification body handed to `WorkflowRunner::run`.
    ///
    /// Order: outputs, tags, readiness, secrets. Lookup errors are recorded as
    /// failed checks so every configured check is reported.
    pub async fn verify<P, Q, S>(
        self,
        ctx: WorkflowContext<P, Q, S>,
    ) -> Result<VerificationReport, WorkflowError>
    where
        P: ProvisioningBackend,
        Q: ResourceQuery,
        S: SecretStore,
    {
        let mut v = Verifier::new();

        for name in &self.verify.non_empty_outputs {
            let check = format!("output.{name}");
            if let Some(value) = v.check_result(&check, ctx.output(name).await) {
                v.non_empty(check, &value);
            }
        }

        for (name, expected) in &self.verify.output_equals {
            let check = format!("output.{name}");
            if let Some(value) = v.check_result(&check, ctx.output(name).await) {
                v.equals(check, expected, &value);
            }
        }

        for tag in &self.verify.tags {
            let check = format!("tag.{}={}", tag.key, tag.value);
            let found = ctx.verify_resource_tag(&tag.key, &tag.value).await;
            if let Some(ids) = v.check_result(&check, found) {
                v.non_empty_list(check, &ids);
            }
        }

        match &self.readiness_tag {
            Some(tag) => {
                let ids = ctx
                    .verify_resource_tag(&tag.key, &tag.value)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "readiness targets lookup failed, waiting for the ceiling");
                        Vec::new()
                    });
                let outcome = ctx.await_ready(&ids).await;
                info!(
                    targets = ids.len(),
                    ready = outcome.is_ready(),
                    elapsed_secs = outcome.elapsed().as_secs(),
                    "readiness wait finished"
                );
            }
            None => {
                let ceiling = ctx.runner().readiness_policy().ceiling;
                ctx.await_readiness(ceiling).await;
            }
        }

        for secret in &self.verify.secrets {
            let check = format!("secret.{}", secret.path);
            if let Some(value) = v.check_result(&check, ctx.secret(&secret.path).await) {
                v.secret_present(check, &value);
            }
        }

        Ok(v.finish())
    }
}

/// Serializable view of a finished workflow.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub success: bool,
    pub outputs: BTreeMap<String, String>,
    pub checks: Vec<VerificationResult>,
    pub passed: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
}

/// A failure together with the phase it originated in.
#[derive(Debug, Serialize)]
pub struct FailureView {
    pub phase: String,
    pub message: String,
}

impl From<&WorkflowError> for FailureView {
    fn from(err: &WorkflowError) -> Self {
        Self {
            phase: err.phase().to_string(),
            message: err.to_string(),
        }
    }
}

impl RunReport {
    pub fn from_workflow(report: &WorkflowReport) -> Self {
        Self {
            run_id: report.run_id.to_string(),
            success: report.is_success(),
            outputs: report
                .outputs
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect(),
            checks: report.verification.results.clone(),
            passed: report.verification.passed(),
            failed: report.verification.failed(),
            failure: report.failure.as_ref().map(FailureView::from),
            teardown_error: report.teardown_error.as_ref().map(ToString::to_string),
        }
    }
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Workflow {}", self.run_id.bold())?;

        if !self.outputs.is_empty() {
            writeln!(w)?;
            writeln!(w, "Outputs:")?;
            for (name, value) in &self.outputs {
                writeln!(w, "  {name} = {value}")?;
            }
        }

        if !self.checks.is_empty() {
            writeln!(w)?;
            writeln!(w, "Checks:")?;
            for check in &self.checks {
                let mark = if check.passed {
                    "PASS".green().bold()
                } else {
                    "FAIL".red().bold()
                };
                writeln!(w, "  [{mark}] {}: {}", check.name, check.detail)?;
            }
        }

        writeln!(w)?;
        writeln!(w, "  Passed: {}  Failed: {}", self.passed, self.failed)?;
        if let Some(failure) = &self.failure {
            writeln!(
                w,
                "  Failure ({}): {}",
                failure.phase,
                failure.message.red()
            )?;
        }
        if let Some(teardown) = &self.teardown_error {
            writeln!(w, "  Teardown: {}", teardown.red())?;
        }

        let result = if self.success {
            "SUCCESS".green().bold()
        } else {
            "FAILED".red().bold()
        };
        writeln!(w, "  Result: {result}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use tokio::sync::Mutex;

    use infraprobe_core::config::SecretCheck;
    use infraprobe_core::error::BackendError;
    use infraprobe_core::types::{OutputSet, ResourceInfo};
    use infraprobe_workflow::{
        NeverRetry, ReadinessPolicy, RetryPolicy, WorkflowConfig, WorkflowOptions,
        WorkflowRunner, WorkflowRunnerBuilder,
    };

    use super::*;

    #[derive(Default)]
    struct StubStack {
        outputs: BTreeMap<String, String>,
        destroys: AtomicU32,
    }

    impl ProvisioningBackend for StubStack {
        async fn init_and_apply(&self, _config: &WorkflowConfig) -> Result<(), BackendError> {
            Ok(())
        }

        async fn outputs(&self, _config: &WorkflowConfig) -> Result<OutputSet, BackendError> {
            Ok(self
                .outputs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        }

        async fn output(&self, _config: &WorkflowConfig, name: &str) -> Result<String, BackendError> {
            self.outputs
                .get(name)
                .cloned()
                .ok_or_else(|| BackendError::NotFound(name.to_owned()))
        }

        async fn destroy(&self, _config: &WorkflowConfig) -> Result<(), BackendError> {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubCloud {
        tagged: Vec<ResourceInfo>,
        parameters: HashMap<String, String>,
        ready_checks: Mutex<Vec<String>>,
    }

    impl ResourceQuery for StubCloud {
        async fn find_by_tag(
            &self,
            _region: &str,
            key: &str,
            value: &str,
        ) -> Result<Vec<ResourceInfo>, BackendError> {
            Ok(self
                .tagged
                .iter()
                .filter(|r| r.tags.get(key).map(String::as_str) == Some(value))
                .cloned()
                .collect())
        }

        async fn is_ready(&self, _region: &str, id: &str) -> Result<bool, BackendError> {
            self.ready_checks.lock().await.push(id.to_owned());
            Ok(true)
        }
    }

    impl SecretStore for StubCloud {
        async fn get_parameter(&self, _region: &str, path: &str) -> Result<String, BackendError> {
            self.parameters
                .get(path)
                .cloned()
                .ok_or_else(|| BackendError::NotFound(path.to_owned()))
        }
    }

    fn stack() -> Arc<StubStack> {
        let outputs = [
            ("vscode_server_instance_id", "i-0abc123"),
            ("vscode_server_public_ip", "54.1.2.3"),
            ("vscode_server_password_ssm", "/code-server/password"),
        ];
        Arc::new(StubStack {
            outputs: outputs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            ..StubStack::default()
        })
    }

    fn cloud(password: &str) -> Arc<StubCloud> {
        let mut tags = BTreeMap::new();
        tags.insert("Name".to_owned(), "VSCodeServer".to_owned());
        let mut parameters = HashMap::new();
        parameters.insert("/code-server/password".to_owned(), password.to_owned());
        Arc::new(StubCloud {
            tagged: vec![ResourceInfo {
                id: "i-0abc123".to_owned(),
                state: "running".to_owned(),
                tags,
            }],
            parameters,
            ..StubCloud::default()
        })
    }

    fn runner(
        stack: &Arc<StubStack>,
        cloud: &Arc<StubCloud>,
    ) -> WorkflowRunner<StubStack, StubCloud, StubCloud> {
        WorkflowRunnerBuilder::new()
            .provisioner(Arc::clone(stack))
            .resource_query(Arc::clone(cloud))
            .secret_store(Arc::clone(cloud))
            .retry_policy(RetryPolicy::no_retry())
            .classifier(NeverRetry)
            .readiness_policy(ReadinessPolicy {
                ceiling: Duration::from_secs(300),
                poll_interval: Duration::from_secs(15),
            })
            .build()
            .unwrap()
    }

    fn code_server_scenario(readiness_tag: bool) -> Scenario {
        let mut verify = VerifySection::default();
        verify.non_empty_outputs = vec![
            "vscode_server_instance_id".to_owned(),
            "vscode_server_public_ip".to_owned(),
        ];
        verify.output_equals.insert(
            "vscode_server_password_ssm".to_owned(),
            "/code-server/password".to_owned(),
        );
        verify.tags = vec![TagCheck {
            key: "Name".to_owned(),
            value: "VSCodeServer".to_owned(),
        }];
        verify.secrets = vec![SecretCheck {
            path: "/code-server/password".to_owned(),
        }];
        Scenario {
            verify,
            readiness_tag: readiness_tag.then(|| TagCheck {
                key: "Name".to_owned(),
                value: "VSCodeServer".to_owned(),
            }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn code_server_scenario_passes_and_polls_tagged_instances() {
        let stack = stack();
        let cloud = cloud("generated-password");
        let runner = runner(&stack, &cloud);
        let dir = tempfile::tempdir().unwrap();
        let config = runner
            .configure(WorkflowOptions::new(dir.path(), "us-west-2"))
            .unwrap();
        let scenario = code_server_scenario(true);
        assert_eq!(scenario.planned_checks(), 5);

        let report = runner.run(config, move |ctx| scenario.verify(ctx)).await;

        assert!(report.is_success(), "{:?}", report.failure);
        assert_eq!(report.verification.passed(), 5);
        assert_eq!(*cloud.ready_checks.lock().await, vec!["i-0abc123".to_owned()]);
        assert_eq!(stack.destroys.load(Ordering::SeqCst), 1);

        let view = RunReport::from_workflow(&report);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("generated-password"), "secret leaked: {json}");
    }

    #[tokio::test(start_paused = true)]
    async fn without_readiness_tag_waits_for_the_full_ceiling() {
        let stack = stack();
        let cloud = cloud("generated-password");
        let runner = runner(&stack, &cloud);
        let dir = tempfile::tempdir().unwrap();
        let config = runner
            .configure(WorkflowOptions::new(dir.path(), "us-west-2"))
            .unwrap();
        let scenario = code_server_scenario(false);

        let start = tokio::time::Instant::now();
        let report = runner.run(config, move |ctx| scenario.verify(ctx)).await;

        assert!(report.is_success());
        assert!(start.elapsed() >= Duration::from_secs(300));
        assert!(cloud.ready_checks.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_output_and_secret_are_reported_together() {
        let stack = stack();
        let cloud = cloud("");
        let runner = runner(&stack, &cloud);
        let dir = tempfile::tempdir().unwrap();
        let config = runner
            .configure(WorkflowOptions::new(dir.path(), "us-west-2"))
            .unwrap();
        let mut scenario = code_server_scenario(true);
        scenario
            .verify
            .non_empty_outputs
            .push("vscode_server_cloudfront_domain_name".to_owned());

        let report = runner.run(config, move |ctx| scenario.verify(ctx)).await;

        assert_eq!(report.verification.failed(), 2);
        assert_eq!(stack.destroys.load(Ordering::SeqCst), 1);
        let view = RunReport::from_workflow(&report);
        assert!(!view.success);
        let failure = view.failure.expect("assertion failure");
        assert_eq!(failure.phase, "verify");
        assert!(failure.message.contains("vscode_server_cloudfront_domain_name"));
        assert!(failure.message.contains("secret./code-server/password"));

        let err = CliError::from(report.into_result().unwrap_err());
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn scenario_reads_readiness_tag_from_config() {
        let config = InfraprobeConfig::parse(
            r#"
[readiness]
tag_key = "Name"
tag_value = "VSCodeServer"

[verify]
non_empty_outputs = ["vscode_server_public_ip"]
"#,
        )
        .unwrap();
        let scenario = Scenario::from_config(&config);
        assert_eq!(
            scenario.readiness_tag,
            Some(TagCheck {
                key: "Name".to_owned(),
                value: "VSCodeServer".to_owned(),
            })
        );
        assert_eq!(scenario.planned_checks(), 1);
    }

    #[test]
    fn text_report_marks_failures() {
        colored::control::set_override(false);
        let report = RunReport {
            run_id: "00000000-0000-0000-0000-000000000000".to_owned(),
            success: false,
            outputs: BTreeMap::new(),
            checks: vec![
                VerificationResult::pass("output.vscode_server_public_ip", "54.1.2.3"),
                VerificationResult::fail("tag.Name=VSCodeServer", "no matching items"),
            ],
            passed: 1,
            failed: 1,
            failure: None,
            teardown_error: Some("destroy failed after 4 attempt(s): timeout".to_owned()),
        };
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("[PASS] output.vscode_server_public_ip: 54.1.2.3"));
        assert!(text.contains("[FAIL] tag.Name=VSCodeServer: no matching items"));
        assert!(text.contains("Teardown: destroy failed"));
        assert!(text.contains("Result: FAILED"));
    }
}
