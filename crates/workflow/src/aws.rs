//! AWS CLI 기반 리소스 조회 / 파라미터 저장소
//!
//! [`AwsCli`]는 `aws` 실행 파일을 통해 EC2 인스턴스를 태그로 조회하고
//! 상태 검사를 확인하며, SSM Parameter Store에서 값을 읽습니다.
//! 모든 응답은 `--output json`으로 받아 `serde`로 파싱합니다.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use infraprobe_core::config::WorkflowSection;
use infraprobe_core::error::BackendError;
use infraprobe_core::types::ResourceInfo;

use crate::backend::{ResourceQuery, SecretStore};
use crate::process::CliCommand;

/// 조회 명령 기본 타임아웃
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(120);

// --- describe-instances 응답 ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesResponse {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Instance {
    instance_id: String,
    state: Option<NamedState>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NamedState {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Tag {
    key: String,
    #[serde(default)]
    value: String,
}

// --- describe-instance-status 응답 ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstanceStatusResponse {
    #[serde(default)]
    instance_statuses: Vec<InstanceStatusEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceStatusEntry {
    instance_id: String,
    instance_state: Option<NamedState>,
    instance_status: Option<StatusSummary>,
    system_status: Option<StatusSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatusSummary {
    status: String,
}

// --- ssm get-parameter 응답 ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetParameterResponse {
    parameter: Parameter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Parameter {
    #[serde(default)]
    value: String,
}

/// AWS CLI 클라이언트
#[derive(Debug, Clone)]
pub struct AwsCli {
    binary: String,
    profile: Option<String>,
    timeout: Duration,
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new()
    }
}

impl AwsCli {
    pub fn new() -> Self {
        Self {
            binary: "aws".to_owned(),
            profile: None,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// core 설정의 `[workflow]` 섹션으로 클라이언트를 생성합니다.
    pub fn from_core(section: &WorkflowSection) -> Self {
        Self {
            binary: section.aws_binary.clone(),
            profile: section.aws_profile.clone(),
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// `--profile`로 전달할 프로파일을 지정합니다.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 서비스/명령 인자 뒤에 리전, 출력 형식, 프로파일을 붙입니다.
    fn args(&self, region: &str, command: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = command.iter().map(|s| (*s).to_owned()).collect();
        args.extend(["--region".to_owned(), region.to_owned()]);
        args.extend(["--output".to_owned(), "json".to_owned()]);
        if let Some(profile) = &self.profile {
            args.extend(["--profile".to_owned(), profile.clone()]);
        }
        args
    }

    async fn exec(&self, args: Vec<String>) -> Result<String, BackendError> {
        CliCommand::new(&self.binary, args, self.timeout).run().await
    }
}

/// 태그 조회 인자 (`pending`/`running` 인스턴스만)
///
/// 축약 문법 `Values=a,b`는 값 안의 쉼표를 구분자로 해석하므로 필터는 JSON으로 전달합니다.
pub fn describe_instances_command(key: &str, value: &str) -> Vec<String> {
    let filters = serde_json::json!([
        { "Name": format!("tag:{key}"), "Values": [value] },
        { "Name": "instance-state-name", "Values": ["pending", "running"] }
    ]);
    vec![
        "ec2".to_owned(),
        "describe-instances".to_owned(),
        "--filters".to_owned(),
        filters.to_string(),
    ]
}

/// `describe-instances` 응답을 리소스 목록으로 평탄화합니다.
pub fn parse_instances(json: &str) -> Result<Vec<ResourceInfo>, BackendError> {
    let response: DescribeInstancesResponse = serde_json::from_str(json)
        .map_err(|e| BackendError::InvalidResponse(format!("ec2 describe-instances: {e}")))?;
    Ok(response
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .map(|i| ResourceInfo {
            id: i.instance_id,
            state: i.state.map(|s| s.name).unwrap_or_default(),
            tags: i
                .tags
                .into_iter()
                .map(|t| (t.key, t.value))
                .collect::<BTreeMap<_, _>>(),
        })
        .collect())
}

/// `describe-instance-status` 응답에서 인스턴스가 준비되었는지 판단합니다.
///
/// `running`이면서 인스턴스/시스템 상태 검사가 모두 `ok`여야 합니다.
pub fn parse_instance_ready(json: &str, id: &str) -> Result<bool, BackendError> {
    let response: DescribeInstanceStatusResponse = serde_json::from_str(json).map_err(|e| {
        BackendError::InvalidResponse(format!("ec2 describe-instance-status: {e}"))
    })?;
    let Some(entry) = response
        .instance_statuses
        .into_iter()
        .find(|s| s.instance_id == id)
    else {
        return Ok(false);
    };

    let running = entry.instance_state.is_some_and(|s| s.name == "running");
    let instance_ok = entry.instance_status.is_some_and(|s| s.status == "ok");
    let system_ok = entry.system_status.is_some_and(|s| s.status == "ok");
    Ok(running && instance_ok && system_ok)
}

/// `ssm get-parameter` 응답에서 값을 꺼냅니다.
pub fn parse_parameter(json: &str) -> Result<String, BackendError> {
    let response: GetParameterResponse = serde_json::from_str(json)
        .map_err(|e| BackendError::InvalidResponse(format!("ssm get-parameter: {e}")))?;
    Ok(response.parameter.value)
}

/// AWS 에러 코드가 대상 부재를 뜻하는지 확인합니다.
fn is_missing(stderr: &str) -> bool {
    stderr.contains("ParameterNotFound") || stderr.contains("InvalidInstanceID.NotFound")
}

impl ResourceQuery for AwsCli {
    async fn find_by_tag(
        &self,
        region: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<ResourceInfo>, BackendError> {
        let command = describe_instances_command(key, value);
        let command: Vec<&str> = command.iter().map(String::as_str).collect();
        let stdout = self.exec(self.args(region, &command)).await?;
        let resources = parse_instances(&stdout)?;
        debug!(region, tag_key = key, tag_value = value, matches = resources.len(), "describe-instances");
        Ok(resources)
    }

    async fn is_ready(&self, region: &str, id: &str) -> Result<bool, BackendError> {
        let args = self.args(
            region,
            &[
                "ec2",
                "describe-instance-status",
                "--instance-ids",
                id,
                "--include-all-instances",
            ],
        );
        match self.exec(args).await {
            Ok(stdout) => parse_instance_ready(&stdout, id),
            Err(BackendError::CommandFailed { stderr, .. }) if is_missing(&stderr) => {
                Err(BackendError::NotFound(id.to_owned()))
            }
            Err(e) => Err(e),
        }
    }
}

impl SecretStore for AwsCli {
    async fn get_parameter(&self, region: &str, path: &str) -> Result<String, BackendError> {
        let args = self.args(
            region,
            &["ssm", "get-parameter", "--name", path, "--with-decryption"],
        );
        match self.exec(args).await {
            Ok(stdout) => parse_parameter(&stdout),
            Err(BackendError::CommandFailed { stderr, .. }) if is_missing(&stderr) => {
                Err(BackendError::NotFound(path.to_owned()))
            }
            Err(e) => Err(e),
        }
    }
}
