//! 워크플로우 에러 타입
//!
//! [`WorkflowError`]는 워크플로우 러너 내부에서 발생하는 모든 에러를 표현합니다.
//! 각 에러는 [`WorkflowError::phase`]로 발생 단계를 알려주며,
//! `From<WorkflowError> for InfraprobeError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use infraprobe_core::error::{BackendError, ConfigError, InfraprobeError};

/// 워크플로우 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// 입력 검증
    Configure,
    /// init + apply
    Apply,
    /// 출력/리소스/시크릿 검증
    Verify,
    /// 정리
    Destroy,
}

impl Phase {
    /// 메트릭 레이블용 고정 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Apply => "apply",
            Self::Verify => "verify",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 워크플로우 도메인 에러
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkflowError {
    /// configure 단계 입력 오류
    #[error("config error: {field}: {reason}")]
    Config {
        /// 문제가 된 필드
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// apply 실패 (재시도 소진 또는 재시도 불가 에러)
    #[error("apply failed after {attempts} attempt(s): {reason}")]
    Apply {
        /// 수행한 시도 횟수
        attempts: u32,
        /// 마지막 실패 사유
        reason: String,
    },

    /// 요청한 출력이 없음 (apply 이전/destroy 이후 조회 포함)
    #[error("output not found: {0}")]
    OutputNotFound(String),

    /// 시크릿이 없거나 비어 있음
    #[error("secret not found: {0}")]
    SecretNotFound(String),

    /// 하나 이상의 검증 실패
    #[error("{failed} of {total} verification(s) failed: {summary}")]
    AssertionFailed {
        /// 실패한 검증 수
        failed: usize,
        /// 전체 검증 수
        total: usize,
        /// 실패 항목 요약
        summary: String,
    },

    /// 협력자 호출 실패
    #[error("backend error during {phase}: {source}")]
    Backend {
        /// 호출이 일어난 단계
        phase: Phase,
        /// 원본 에러
        #[source]
        source: BackendError,
    },

    /// destroy 실패 (제한된 재시도 이후)
    #[error("destroy failed after {attempts} attempt(s): {reason}")]
    Destroy {
        /// 수행한 시도 횟수
        attempts: u32,
        /// 마지막 실패 사유
        reason: String,
    },

    /// 검증 본문이 패닉하거나 취소됨
    #[error("verification body aborted: {0}")]
    Panicked(String),
}

impl WorkflowError {
    /// 에러가 발생한 단계를 반환합니다.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Config { .. } => Phase::Configure,
            Self::Apply { .. } => Phase::Apply,
            Self::OutputNotFound(_)
            | Self::SecretNotFound(_)
            | Self::AssertionFailed { .. }
            | Self::Panicked(_) => Phase::Verify,
            Self::Backend { phase, .. } => *phase,
            Self::Destroy { .. } => Phase::Destroy,
        }
    }

    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<WorkflowError> for InfraprobeError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Config { field, reason } => {
                InfraprobeError::Config(ConfigError::InvalidValue { field, reason })
            }
            WorkflowError::Backend { source, .. } => InfraprobeError::Backend(source),
            other => InfraprobeError::Workflow {
                phase: other.phase().to_string(),
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_error_display() {
        let err = WorkflowError::Apply {
            attempts: 4,
            reason: "Error installing provider".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("4 attempt(s)"));
        assert!(msg.contains("Error installing provider"));
    }

    #[test]
    fn assertion_failed_display() {
        let err = WorkflowError::AssertionFailed {
            failed: 1,
            total: 5,
            summary: "output.public_ip: value is empty".to_owned(),
        };
        assert!(err.to_string().contains("1 of 5"));
    }

    #[test]
    fn phases_are_assigned() {
        assert_eq!(WorkflowError::config("x", "y").phase(), Phase::Configure);
        assert_eq!(
            WorkflowError::Apply {
                attempts: 1,
                reason: String::new()
            }
            .phase(),
            Phase::Apply
        );
        assert_eq!(
            WorkflowError::OutputNotFound("a".to_owned()).phase(),
            Phase::Verify
        );
        assert_eq!(
            WorkflowError::SecretNotFound("a".to_owned()).phase(),
            Phase::Verify
        );
        assert_eq!(
            WorkflowError::Destroy {
                attempts: 1,
                reason: String::new()
            }
            .phase(),
            Phase::Destroy
        );
        assert_eq!(
            WorkflowError::Backend {
                phase: Phase::Apply,
                source: BackendError::NotFound("x".to_owned()),
            }
            .phase(),
            Phase::Apply
        );
    }

    #[test]
    fn phase_display_is_lowercase() {
        assert_eq!(Phase::Destroy.to_string(), "destroy");
        assert_eq!(
            serde_json::to_string(&Phase::Verify).unwrap(),
            "\"verify\""
        );
    }

    #[test]
    fn config_error_converts_to_core_config() {
        let err: InfraprobeError = WorkflowError::config("working_dir", "empty").into();
        assert!(matches!(
            err,
            InfraprobeError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn backend_error_converts_to_core_backend() {
        let err: InfraprobeError = WorkflowError::Backend {
            phase: Phase::Verify,
            source: BackendError::InvalidResponse("bad json".to_owned()),
        }
        .into();
        assert!(matches!(err, InfraprobeError::Backend(_)));
    }

    #[test]
    fn other_errors_keep_phase_in_core_error() {
        let err: InfraprobeError = WorkflowError::SecretNotFound("/p".to_owned()).into();
        match err {
            InfraprobeError::Workflow { phase, reason } => {
                assert_eq!(phase, "verify");
                assert!(reason.contains("/p"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
