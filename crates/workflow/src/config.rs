//! 워크플로우 설정 -- configure 단계
//!
//! [`WorkflowOptions`]는 호출자가 채우는 가변 입력이고,
//! [`configure`]를 통과한 [`WorkflowConfig`]는 생성 이후 변경되지 않습니다.
//!
//! # 사용 예시
//! ```ignore
//! use infraprobe_workflow::config::{configure, WorkflowOptions};
//!
//! let config = configure(
//!     WorkflowOptions::new("../", "us-west-2")
//!         .var("instance_type", "t3.small"),
//! )?;
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use infraprobe_core::config::WorkflowSection;
use infraprobe_core::types::VarValue;

use crate::error::WorkflowError;

/// 리전을 담는 변수 키
pub const REGION_VAR_KEYS: [&str; 2] = ["aws_region", "region"];

/// 리전을 담는 환경변수 키
pub const REGION_ENV_KEYS: [&str; 2] = ["AWS_DEFAULT_REGION", "AWS_REGION"];

/// configure 입력
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    /// 인프라 정의 디렉토리
    pub working_dir: PathBuf,
    /// 프로비저닝 변수
    pub variables: BTreeMap<String, VarValue>,
    /// 백엔드 실행 환경변수
    pub environment: BTreeMap<String, String>,
    /// 배포 대상 리전
    pub region: String,
    /// `aws_region` / `AWS_DEFAULT_REGION`을 리전에서 채울지 여부
    pub inject_region: bool,
}

impl WorkflowOptions {
    /// 작업 디렉토리와 리전으로 옵션을 생성합니다.
    pub fn new(working_dir: impl Into<PathBuf>, region: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            variables: BTreeMap::new(),
            environment: BTreeMap::new(),
            region: region.into(),
            inject_region: true,
        }
    }

    /// core 설정의 `[workflow]` 섹션에서 옵션을 생성합니다.
    pub fn from_core(section: &WorkflowSection) -> Self {
        Self {
            working_dir: PathBuf::from(&section.working_dir),
            variables: section.vars.clone(),
            environment: section.env.clone(),
            region: section.region.clone(),
            inject_region: section.inject_region,
        }
    }

    /// 프로비저닝 변수를 추가합니다.
    pub fn var(mut self, key: impl Into<String>, value: impl Into<VarValue>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// 환경변수를 추가합니다.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// 리전 자동 주입 여부를 설정합니다.
    pub fn inject_region(mut self, inject: bool) -> Self {
        self.inject_region = inject;
        self
    }
}

/// 검증을 통과한 불변 워크플로우 설정
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowConfig {
    working_dir: PathBuf,
    variables: BTreeMap<String, VarValue>,
    environment: BTreeMap<String, String>,
    region: String,
}

impl WorkflowConfig {
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn variables(&self) -> &BTreeMap<String, VarValue> {
        &self.variables
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

/// 옵션을 검증하고 [`WorkflowConfig`]를 생성합니다.
///
/// 외부 호출이나 파일 쓰기 없이 다음을 확인합니다:
/// - `working_dir`가 비어 있지 않고 실제 디렉토리임
/// - `region`이 비어 있지 않음
/// - 리전을 담는 변수/환경변수가 `region`과 일치함
pub fn configure(options: WorkflowOptions) -> Result<WorkflowConfig, WorkflowError> {
    let WorkflowOptions {
        working_dir,
        mut variables,
        mut environment,
        region,
        inject_region,
    } = options;

    if working_dir.as_os_str().is_empty() {
        return Err(WorkflowError::config(
            "working_dir",
            "must not be empty",
        ));
    }

    if !working_dir.is_dir() {
        return Err(WorkflowError::config(
            "working_dir",
            format!("'{}' is not an existing directory", working_dir.display()),
        ));
    }

    let region = region.trim().to_owned();
    if region.is_empty() {
        return Err(WorkflowError::config("region", "must not be empty"));
    }

    if let Some((key, _)) = variables.iter().find(|(_, value)| !value.is_finite()) {
        return Err(WorkflowError::config(
            format!("variables.{key}"),
            "NaN and infinite numbers cannot be passed to terraform",
        ));
    }

    if inject_region {
        variables
            .entry(REGION_VAR_KEYS[0].to_owned())
            .or_insert_with(|| VarValue::from(region.as_str()));
        environment
            .entry(REGION_ENV_KEYS[0].to_owned())
            .or_insert_with(|| region.clone());
    }

    for key in REGION_VAR_KEYS {
        if let Some(value) = variables.get(key) {
            if value.as_str() != Some(region.as_str()) {
                return Err(WorkflowError::config(
                    format!("variables.{key}"),
                    format!(
                        "'{}' disagrees with region '{region}'",
                        value.to_cli_value()
                    ),
                ));
            }
        }
    }

    for key in REGION_ENV_KEYS {
        if let Some(value) = environment.get(key) {
            if value != &region {
                return Err(WorkflowError::config(
                    format!("environment.{key}"),
                    format!("'{value}' disagrees with region '{region}'"),
                ));
            }
        }
    }

    Ok(WorkflowConfig {
        working_dir,
        variables,
        environment,
        region,
    })
}
