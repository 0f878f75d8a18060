//! 재시도 분류와 재시도 루프
//!
//! 프로비저닝 단계의 일시적 장애(레지스트리 연결 끊김, 플러그인 핸드셰이크
//! 타임아웃 등)는 같은 입력으로 다시 실행하면 대부분 성공합니다.
//! [`RetryClassifier`]가 에러의 재시도 가능 여부를 판단하고,
//! [`retry`]가 [`RetryPolicy`]에 따라 고정 간격으로 재시도합니다.

use std::future::Future;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use infraprobe_core::config::RetrySection;
use infraprobe_core::error::BackendError;

use crate::error::WorkflowError;

/// 잘 알려진 Terraform 일시 장애 패턴 (정규식, 설명)
const TERRAFORM_TRANSIENT_PATTERNS: &[(&str, &str)] = &[
    (
        ".*read: connection reset by peer.*",
        "failed to reach the provider registry",
    ),
    (
        ".*transport is closing.*",
        "plugin transport closed unexpectedly",
    ),
    (
        ".*unable to verify signature.*",
        "provider signature could not be verified",
    ),
    (
        ".*unable to verify checksum.*",
        "provider checksum could not be verified",
    ),
    (
        ".*no provider exists with the given name.*",
        "provider registry returned an incomplete listing",
    ),
    (
        ".*registry service is unreachable.*",
        "provider registry unreachable",
    ),
    (".*Error installing provider.*", "provider installation failed"),
    (
        ".*Failed to query available provider packages.*",
        "provider package query failed",
    ),
    (
        ".*timeout while waiting for plugin to start.*",
        "plugin start timed out",
    ),
    (
        ".*timed out waiting for server handshake.*",
        "plugin handshake timed out",
    ),
    (
        "could not query provider registry for",
        "provider registry query failed",
    ),
    (
        ".*Provider produced inconsistent result after apply.*",
        "eventually consistent cloud API",
    ),
    ("TLS handshake timeout", "TLS handshake timed out"),
];

/// 에러의 재시도 가능 여부를 판단하는 분류기
pub trait RetryClassifier: Send + Sync {
    /// 같은 입력으로 다시 시도하면 성공할 가능성이 있으면 `true`
    fn is_retryable(&self, err: &BackendError) -> bool;
}

impl<F> RetryClassifier for F
where
    F: Fn(&BackendError) -> bool + Send + Sync,
{
    fn is_retryable(&self, err: &BackendError) -> bool {
        self(err)
    }
}

/// 어떤 에러도 재시도하지 않는 분류기
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryClassifier for NeverRetry {
    fn is_retryable(&self, _err: &BackendError) -> bool {
        false
    }
}

/// 에러 메시지를 정규식 목록과 대조하는 분류기
#[derive(Debug, Clone, Default)]
pub struct PatternClassifier {
    patterns: Vec<(Regex, String)>,
}

impl PatternClassifier {
    /// 빈 분류기를 생성합니다. 패턴이 없으면 아무것도 재시도하지 않습니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 잘 알려진 Terraform 일시 장애 패턴으로 분류기를 생성합니다.
    pub fn terraform_defaults() -> Self {
        let mut patterns = Vec::with_capacity(TERRAFORM_TRANSIENT_PATTERNS.len());
        for (pattern, description) in TERRAFORM_TRANSIENT_PATTERNS {
            match Regex::new(pattern) {
                Ok(re) => patterns.push((re, (*description).to_owned())),
                Err(e) => warn!(pattern, error = %e, "skipping invalid built-in retry pattern"),
            }
        }
        Self { patterns }
    }

    /// `[retry]` 설정 섹션으로 분류기를 구성합니다.
    pub fn from_core(section: &RetrySection) -> Result<Self, WorkflowError> {
        let mut classifier = if section.use_default_patterns {
            Self::terraform_defaults()
        } else {
            Self::new()
        };
        for (pattern, description) in &section.extra_patterns {
            classifier = classifier.with_pattern(pattern, description)?;
        }
        Ok(classifier)
    }

    /// 패턴을 추가합니다.
    ///
    /// # Errors
    ///
    /// 정규식이 유효하지 않으면 `WorkflowError::Config`를 반환합니다.
    pub fn with_pattern(
        mut self,
        pattern: &str,
        description: impl Into<String>,
    ) -> Result<Self, WorkflowError> {
        let re = Regex::new(pattern).map_err(|e| {
            WorkflowError::config(format!("retry.extra_patterns.{pattern}"), e.to_string())
        })?;
        self.patterns.push((re, description.into()));
        Ok(self)
    }

    /// 등록된 패턴 수
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// 에러와 일치하는 첫 패턴의 설명을 반환합니다.
    pub fn matching_description(&self, err: &BackendError) -> Option<&str> {
        let message = err.to_string();
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(&message))
            .map(|(_, description)| description.as_str())
    }
}

impl RetryClassifier for PatternClassifier {
    fn is_retryable(&self, err: &BackendError) -> bool {
        self.matching_description(err).is_some()
    }
}

/// 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 첫 시도 이후 최대 재시도 횟수
    pub max_retries: u32,
    /// 재시도 간격 (고정)
    pub time_between_retries: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            time_between_retries: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_core(section: &RetrySection) -> Self {
        Self {
            max_retries: section.max_retries,
            time_between_retries: Duration::from_secs(section.time_between_retries_secs),
        }
    }

    /// 재시도 없이 한 번만 시도하는 정책
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            time_between_retries: Duration::ZERO,
        }
    }
}

/// 성공한 재시도 루프의 결과
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// 성공까지의 시도 횟수 (1 이상)
    pub attempts: u32,
}

/// 실패한 재시도 루프의 결과
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed after {attempts} attempt(s): {last}")]
pub struct RetryExhausted {
    /// 수행한 시도 횟수
    pub attempts: u32,
    /// 마지막 에러
    pub last: BackendError,
    /// 마지막 에러가 재시도 가능으로 분류되었는지 여부
    pub retryable: bool,
}

/// 정책에 따라 `op`를 재시도합니다.
///
/// 재시도 불가로 분류된 에러는 즉시 반환하고, 재시도 가능 에러는
/// `time_between_retries` 간격으로 최대 `max_retries`번 다시 시도합니다.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    classifier: &dyn RetryClassifier,
    description: &str,
    mut op: F,
) -> Result<RetryOutcome<T>, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(description, attempts = attempt, "succeeded after retry");
                }
                return Ok(RetryOutcome {
                    value,
                    attempts: attempt,
                });
            }
            Err(err) => {
                let retryable = classifier.is_retryable(&err);
                if !retryable || attempt > policy.max_retries {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last: err,
                        retryable,
                    });
                }

                warn!(
                    description,
                    attempt,
                    max_retries = policy.max_retries,
                    backoff_ms = u64::try_from(policy.time_between_retries.as_millis())
                        .unwrap_or(u64::MAX),
                    error = %err,
                    "retryable error, retrying"
                );
                tokio::time::sleep(policy.time_between_retries).await;
            }
        }
    }
}
