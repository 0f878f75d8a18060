//! Terraform / OpenTofu CLI 프로비저닝 백엔드
//!
//! [`TerraformBackend`]는 [`ProvisioningBackend`]를 `terraform` 또는 `tofu`
//! 실행 파일로 구현합니다. 모든 명령은 설정의 작업 디렉토리에서
//! 설정의 환경변수와 `TF_IN_AUTOMATION=1`을 주입하여 실행됩니다.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use infraprobe_core::config::WorkflowSection;
use infraprobe_core::error::BackendError;
use infraprobe_core::types::OutputSet;

use crate::backend::ProvisioningBackend;
use crate::config::WorkflowConfig;
use crate::process::CliCommand;

/// 기본 명령 타임아웃 (30분)
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// `terraform output -json`의 항목 (`type`, `sensitive`는 사용하지 않음)
#[derive(Debug, Deserialize)]
struct OutputEntry {
    value: serde_json::Value,
}

/// Terraform CLI 백엔드
#[derive(Debug, Clone)]
pub struct TerraformBackend {
    binary: String,
    timeout: Duration,
}

impl Default for TerraformBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TerraformBackend {
    pub fn new() -> Self {
        Self {
            binary: "terraform".to_owned(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// core 설정의 `[workflow]` 섹션으로 백엔드를 생성합니다.
    pub fn from_core(section: &WorkflowSection) -> Self {
        Self {
            binary: section.terraform_binary.clone(),
            timeout: Duration::from_secs(section.command_timeout_secs),
        }
    }

    /// 실행 파일을 지정합니다 (예: `tofu`).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn command<'a>(&'a self, config: &'a WorkflowConfig, args: Vec<String>) -> CliCommand<'a> {
        let mut envs = config.environment().clone();
        envs.entry("TF_IN_AUTOMATION".to_owned())
            .or_insert_with(|| "1".to_owned());
        CliCommand::new(&self.binary, args, self.timeout)
            .current_dir(config.working_dir())
            .envs(envs)
    }

    async fn exec(&self, config: &WorkflowConfig, args: Vec<String>) -> Result<String, BackendError> {
        self.command(config, args).run().await
    }
}

/// `-var key=value` 인자 목록
pub fn var_args(config: &WorkflowConfig) -> Vec<String> {
    let mut args = Vec::with_capacity(config.variables().len() * 2);
    for (key, value) in config.variables() {
        args.push("-var".to_owned());
        args.push(format!("{key}={}", value.to_cli_value()));
    }
    args
}

pub fn init_args() -> Vec<String> {
    ["init", "-input=false", "-no-color"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

pub fn apply_args(config: &WorkflowConfig) -> Vec<String> {
    let mut args: Vec<String> = ["apply", "-input=false", "-auto-approve", "-no-color"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();
    args.extend(var_args(config));
    args
}

pub fn destroy_args(config: &WorkflowConfig) -> Vec<String> {
    let mut args: Vec<String> = ["destroy", "-input=false", "-auto-approve", "-no-color"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();
    args.extend(var_args(config));
    args
}

pub fn output_args(name: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = ["output", "-json", "-no-color"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();
    if let Some(name) = name {
        args.push(name.to_owned());
    }
    args
}

/// 출력 값을 문자열로 변환합니다. 문자열은 그대로, 나머지는 compact JSON입니다.
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `terraform output -json` 결과를 파싱합니다.
pub fn parse_outputs(json: &str) -> Result<OutputSet, BackendError> {
    let entries: BTreeMap<String, OutputEntry> = serde_json::from_str(json)
        .map_err(|e| BackendError::InvalidResponse(format!("terraform output: {e}")))?;
    Ok(entries
        .into_iter()
        .map(|(name, entry)| (name, render_value(&entry.value)))
        .collect())
}

/// `terraform output -json <name>` 결과를 파싱합니다.
pub fn parse_output_value(json: &str) -> Result<String, BackendError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| BackendError::InvalidResponse(format!("terraform output: {e}")))?;
    Ok(render_value(&value))
}

impl ProvisioningBackend for TerraformBackend {
    async fn init_and_apply(&self, config: &WorkflowConfig) -> Result<(), BackendError> {
        info!(
            binary = %self.binary,
            working_dir = %config.working_dir().display(),
            "terraform init"
        );
        self.exec(config, init_args()).await?;
        info!(
            binary = %self.binary,
            variables = config.variables().len(),
            "terraform apply"
        );
        self.exec(config, apply_args(config)).await?;
        Ok(())
    }

    async fn outputs(&self, config: &WorkflowConfig) -> Result<OutputSet, BackendError> {
        let stdout = self.exec(config, output_args(None)).await?;
        parse_outputs(&stdout)
    }

    async fn output(&self, config: &WorkflowConfig, name: &str) -> Result<String, BackendError> {
        match self.exec(config, output_args(Some(name))).await {
            Ok(stdout) => parse_output_value(&stdout),
            Err(BackendError::CommandFailed { stderr, .. })
                if stderr.to_ascii_lowercase().contains("not found") =>
            {
                Err(BackendError::NotFound(name.to_owned()))
            }
            Err(e) => Err(e),
        }
    }

    async fn destroy(&self, config: &WorkflowConfig) -> Result<(), BackendError> {
        info!(
            binary = %self.binary,
            working_dir = %config.working_dir().display(),
            "terraform destroy"
        );
        self.exec(config, destroy_args(config)).await?;
        Ok(())
    }
}
