//! 설정 관리 -- infraprobe.toml 파싱 및 런타임 설정
//!
//! [`InfraprobeConfig`]는 하나의 시나리오(프로비저닝 → 검증 → 정리)에 필요한
//! 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`INFRAPROBE_WORKFLOW_REGION=us-west-2` 형식)
//! 3. 설정 파일 (`infraprobe.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), infraprobe_core::error::InfraprobeError> {
//! use infraprobe_core::config::InfraprobeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = InfraprobeConfig::load("infraprobe.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = InfraprobeConfig::parse("[workflow]\nregion = \"eu-west-1\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, InfraprobeError};
use crate::types::VarValue;

/// infraprobe 통합 설정
///
/// `infraprobe.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfraprobeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 워크플로우 대상 설정
    #[serde(default)]
    pub workflow: WorkflowSection,
    /// 재시도 설정
    #[serde(default)]
    pub retry: RetrySection,
    /// 준비 상태 대기 설정
    #[serde(default)]
    pub readiness: ReadinessSection,
    /// 검증 항목
    #[serde(default)]
    pub verify: VerifySection,
}

impl InfraprobeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    /// 3. 유효성 검증
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, InfraprobeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, InfraprobeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InfraprobeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                InfraprobeError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, InfraprobeError> {
        toml::from_str(toml_str).map_err(|e| {
            InfraprobeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `INFRAPROBE_{SECTION}_{FIELD}`
    /// 예: `INFRAPROBE_RETRY_MAX_RETRIES=5`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "INFRAPROBE_GENERAL_LOG_LEVEL");
        override_string(
            &mut self.general.log_format,
            "INFRAPROBE_GENERAL_LOG_FORMAT",
        );

        // Workflow
        override_string(
            &mut self.workflow.working_dir,
            "INFRAPROBE_WORKFLOW_WORKING_DIR",
        );
        override_string(&mut self.workflow.region, "INFRAPROBE_WORKFLOW_REGION");
        override_string(
            &mut self.workflow.terraform_binary,
            "INFRAPROBE_WORKFLOW_TERRAFORM_BINARY",
        );
        override_string(&mut self.workflow.aws_binary, "INFRAPROBE_WORKFLOW_AWS_BINARY");
        override_opt_string(&mut self.workflow.aws_profile, "INFRAPROBE_WORKFLOW_AWS_PROFILE");
        override_u64(
            &mut self.workflow.command_timeout_secs,
            "INFRAPROBE_WORKFLOW_COMMAND_TIMEOUT_SECS",
        );
        override_bool(
            &mut self.workflow.inject_region,
            "INFRAPROBE_WORKFLOW_INJECT_REGION",
        );

        // Retry
        override_u32(&mut self.retry.max_retries, "INFRAPROBE_RETRY_MAX_RETRIES");
        override_u64(
            &mut self.retry.time_between_retries_secs,
            "INFRAPROBE_RETRY_TIME_BETWEEN_RETRIES_SECS",
        );

        // Readiness
        override_u64(
            &mut self.readiness.ceiling_secs,
            "INFRAPROBE_READINESS_CEILING_SECS",
        );
        override_u64(
            &mut self.readiness.poll_interval_secs,
            "INFRAPROBE_READINESS_POLL_INTERVAL_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 작업 디렉토리의 실제 존재 여부는 워크플로우 configure 단계에서 확인합니다.
    pub fn validate(&self) -> Result<(), InfraprobeError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.workflow.working_dir.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "workflow.working_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        if self.workflow.region.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "workflow.region".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        let valid_binaries = ["terraform", "tofu"];
        let binary_name = Path::new(&self.workflow.terraform_binary)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if !valid_binaries.contains(&binary_name) {
            return Err(ConfigError::InvalidValue {
                field: "workflow.terraform_binary".to_owned(),
                reason: format!("must be one of: {}", valid_binaries.join(", ")),
            }
            .into());
        }

        if self.workflow.command_timeout_secs == 0
            || self.workflow.command_timeout_secs > MAX_COMMAND_TIMEOUT_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "workflow.command_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_COMMAND_TIMEOUT_SECS}"),
            }
            .into());
        }

        if self.retry.max_retries > MAX_RETRIES {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_retries".to_owned(),
                reason: format!("must be 0-{MAX_RETRIES}"),
            }
            .into());
        }

        if self.retry.time_between_retries_secs > MAX_TIME_BETWEEN_RETRIES_SECS {
            return Err(ConfigError::InvalidValue {
                field: "retry.time_between_retries_secs".to_owned(),
                reason: format!("must be 0-{MAX_TIME_BETWEEN_RETRIES_SECS}"),
            }
            .into());
        }

        if self.readiness.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "readiness.poll_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.readiness.poll_interval_secs > self.readiness.ceiling_secs {
            return Err(ConfigError::InvalidValue {
                field: "readiness.poll_interval_secs".to_owned(),
                reason: "must not exceed readiness.ceiling_secs".to_owned(),
            }
            .into());
        }

        if self.readiness.tag_key.is_some() != self.readiness.tag_value.is_some() {
            return Err(ConfigError::InvalidValue {
                field: "readiness.tag_key".to_owned(),
                reason: "tag_key and tag_value must be set together".to_owned(),
            }
            .into());
        }

        for (i, tag) in self.verify.tags.iter().enumerate() {
            if tag.key.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("verify.tags[{i}].key"),
                    reason: "must not be empty".to_owned(),
                }
                .into());
            }
        }

        for (i, secret) in self.verify.secrets.iter().enumerate() {
            if secret.path.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("verify.secrets[{i}].path"),
                    reason: "must not be empty".to_owned(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// 설정 상한값 상수
const MAX_COMMAND_TIMEOUT_SECS: u64 = 6 * 3600;
const MAX_RETRIES: u32 = 20;
const MAX_TIME_BETWEEN_RETRIES_SECS: u64 = 600;

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 워크플로우 대상 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    /// 인프라 정의(Terraform 코드)가 있는 디렉토리
    pub working_dir: String,
    /// 배포 대상 리전
    pub region: String,
    /// `aws_region` 변수와 `AWS_DEFAULT_REGION` 환경변수를 리전에서 자동 주입할지 여부
    pub inject_region: bool,
    /// terraform 또는 tofu 실행 파일
    pub terraform_binary: String,
    /// aws CLI 실행 파일
    pub aws_binary: String,
    /// aws CLI 프로파일 (없으면 기본 자격 증명 체인)
    pub aws_profile: Option<String>,
    /// 외부 명령 하나당 타임아웃 (초)
    pub command_timeout_secs: u64,
    /// `-var`로 전달할 변수
    pub vars: BTreeMap<String, VarValue>,
    /// 백엔드 실행 환경에 주입할 환경변수
    pub env: BTreeMap<String, String>,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            working_dir: ".".to_owned(),
            region: "us-west-2".to_owned(),
            inject_region: true,
            terraform_binary: "terraform".to_owned(),
            aws_binary: "aws".to_owned(),
            aws_profile: None,
            command_timeout_secs: 30 * 60,
            vars: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }
}

/// 재시도 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// 첫 시도 이후 최대 재시도 횟수
    pub max_retries: u32,
    /// 재시도 간격 (초)
    pub time_between_retries_secs: u64,
    /// 잘 알려진 Terraform 일시 장애 패턴 사용 여부
    pub use_default_patterns: bool,
    /// 추가 재시도 패턴 (정규식 → 설명)
    pub extra_patterns: BTreeMap<String, String>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            time_between_retries_secs: 5,
            use_default_patterns: true,
            extra_patterns: BTreeMap::new(),
        }
    }
}

/// 준비 상태 대기 설정
///
/// `tag_key`/`tag_value`가 지정되면 해당 태그로 찾은 리소스가 준비될 때까지
/// 폴링하고, 지정되지 않으면 `ceiling_secs` 동안 고정 대기합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSection {
    /// 대기 상한 (초)
    pub ceiling_secs: u64,
    /// 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 대기 대상 리소스 태그 키
    pub tag_key: Option<String>,
    /// 대기 대상 리소스 태그 값
    pub tag_value: Option<String>,
}

impl Default for ReadinessSection {
    fn default() -> Self {
        Self {
            ceiling_secs: 300,
            poll_interval_secs: 15,
            tag_key: None,
            tag_value: None,
        }
    }
}

/// 검증 항목
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifySection {
    /// 비어 있지 않아야 하는 출력 이름
    pub non_empty_outputs: Vec<String>,
    /// 출력 이름 → 기대 값
    pub output_equals: BTreeMap<String, String>,
    /// 최소 하나 이상 존재해야 하는 태그 필터
    pub tags: Vec<TagCheck>,
    /// 존재하고 비어 있지 않아야 하는 시크릿
    pub secrets: Vec<SecretCheck>,
}

/// 태그 검증 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCheck {
    pub key: String,
    pub value: String,
}

/// 시크릿 검증 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretCheck {
    /// 파라미터 경로 (예: `/code-server/password`)
    pub path: String,
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_opt_string(target: &mut Option<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = if val.is_empty() { None } else { Some(val) };
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_is_valid() {
        InfraprobeConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_string_parses_to_defaults() {
        let config = InfraprobeConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.workflow.region, "us-west-2");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.time_between_retries_secs, 5);
        assert_eq!(config.readiness.ceiling_secs, 300);
        assert!(config.workflow.inject_region);
    }

    #[test]
    fn parse_workflow_vars_and_env() {
        let config = InfraprobeConfig::parse(
            r#"
            [workflow]
            working_dir = "../"
            region = "eu-west-1"

            [workflow.vars]
            aws_region = "eu-west-1"

            [workflow.env]
            AWS_DEFAULT_REGION = "eu-west-1"
            "#,
        )
        .unwrap();
        assert_eq!(config.workflow.working_dir, "../");
        assert_eq!(
            config.workflow.vars.get("aws_region"),
            Some(&VarValue::from("eu-west-1"))
        );
        assert_eq!(
            config.workflow.env.get("AWS_DEFAULT_REGION").map(String::as_str),
            Some("eu-west-1")
        );
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = InfraprobeConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            InfraprobeError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_empty_working_dir() {
        let mut config = InfraprobeConfig::default();
        config.workflow.working_dir = "  ".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("workflow.working_dir"));
    }

    #[test]
    fn validate_rejects_empty_region() {
        let mut config = InfraprobeConfig::default();
        config.workflow.region = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("workflow.region"));
    }

    #[test]
    fn validate_accepts_tofu_path() {
        let mut config = InfraprobeConfig::default();
        config.workflow.terraform_binary = "/usr/local/bin/tofu".to_owned();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_unknown_binary() {
        let mut config = InfraprobeConfig::default();
        config.workflow.terraform_binary = "pulumi".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("terraform_binary"));
    }

    #[test]
    fn validate_rejects_zero_poll_interval() {
        let mut config = InfraprobeConfig::default();
        config.readiness.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_poll_interval_above_ceiling() {
        let mut config = InfraprobeConfig::default();
        config.readiness.ceiling_secs = 10;
        config.readiness.poll_interval_secs = 20;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ceiling_secs"));
    }

    #[test]
    fn validate_rejects_half_specified_readiness_tag() {
        let mut config = InfraprobeConfig::default();
        config.readiness.tag_key = Some("Name".to_owned());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_too_many_retries() {
        let mut config = InfraprobeConfig::default();
        config.retry.max_retries = MAX_RETRIES + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry.max_retries"));
    }

    #[test]
    fn validate_rejects_empty_secret_path() {
        let mut config = InfraprobeConfig::default();
        config.verify.secrets.push(SecretCheck {
            path: String::new(),
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("verify.secrets[0].path"));
    }

    #[test]
    #[serial]
    fn env_override_region_and_retries() {
        // SAFETY: serial 테스트에서만 환경변수를 변경합니다.
        unsafe {
            std::env::set_var("INFRAPROBE_WORKFLOW_REGION", "ap-northeast-2");
            std::env::set_var("INFRAPROBE_RETRY_MAX_RETRIES", "7");
        }
        let mut config = InfraprobeConfig::default();
        config.apply_env_overrides();
        // SAFETY: 테스트 정리
        unsafe {
            std::env::remove_var("INFRAPROBE_WORKFLOW_REGION");
            std::env::remove_var("INFRAPROBE_RETRY_MAX_RETRIES");
        }
        assert_eq!(config.workflow.region, "ap-northeast-2");
        assert_eq!(config.retry.max_retries, 7);
    }

    #[test]
    #[serial]
    fn env_override_ignores_unparseable_number() {
        // SAFETY: serial 테스트에서만 환경변수를 변경합니다.
        unsafe {
            std::env::set_var("INFRAPROBE_READINESS_CEILING_SECS", "five minutes");
        }
        let mut config = InfraprobeConfig::default();
        config.apply_env_overrides();
        // SAFETY: 테스트 정리
        unsafe {
            std::env::remove_var("INFRAPROBE_READINESS_CEILING_SECS");
        }
        assert_eq!(config.readiness.ceiling_secs, 300);
    }

    #[test]
    #[serial]
    fn env_override_empty_profile_clears_it() {
        // SAFETY: serial 테스트에서만 환경변수를 변경합니다.
        unsafe {
            std::env::set_var("INFRAPROBE_WORKFLOW_AWS_PROFILE", "");
        }
        let mut config = InfraprobeConfig::default();
        config.workflow.aws_profile = Some("dev".to_owned());
        config.apply_env_overrides();
        // SAFETY: 테스트 정리
        unsafe {
            std::env::remove_var("INFRAPROBE_WORKFLOW_AWS_PROFILE");
        }
        assert!(config.workflow.aws_profile.is_none());
    }

    #[tokio::test]
    async fn load_missing_file_is_file_not_found() {
        let err = InfraprobeConfig::load("/nonexistent/infraprobe.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InfraprobeError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
