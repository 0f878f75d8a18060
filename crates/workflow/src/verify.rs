//! 검증 누적기
//!
//! [`Verifier`]는 검증 실패가 발생해도 중단하지 않고 모든 결과를 모읍니다.
//! 검증 본문이 끝나면 [`Verifier::finish`]로 [`VerificationReport`]를 만들고,
//! 실패가 하나라도 있으면 `WorkflowError::AssertionFailed`로 변환합니다.

use std::fmt::Display;

use serde::Serialize;
use tracing::{debug, warn};

use infraprobe_core::metrics as m;
use infraprobe_core::types::VerificationResult;

use crate::error::WorkflowError;

/// 검증 결과 누적기
#[derive(Debug, Default)]
pub struct Verifier {
    results: Vec<VerificationResult>,
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 값이 비어 있지 않은지 확인합니다. 공백만 있는 값도 비어 있지 않은 것으로 봅니다.
    pub fn non_empty(&mut self, name: impl Into<String>, value: &str) -> bool {
        let result = if value.is_empty() {
            VerificationResult::fail(name, "value is empty")
        } else {
            VerificationResult::pass(name, value)
        };
        self.record(result)
    }

    /// 값이 기대 값과 같은지 확인합니다.
    pub fn equals(&mut self, name: impl Into<String>, expected: &str, actual: &str) -> bool {
        let result = if expected == actual {
            VerificationResult::pass(name, actual)
        } else {
            VerificationResult::fail(name, format!("expected '{expected}', got '{actual}'"))
        };
        self.record(result)
    }

    /// 시크릿 값이 비어 있지 않은지 확인합니다. 값은 리포트에 남기지 않습니다.
    pub fn secret_present(&mut self, name: impl Into<String>, value: &str) -> bool {
        let result = if value.is_empty() {
            VerificationResult::fail(name, "value is empty")
        } else {
            VerificationResult::pass(name, "present (redacted)")
        };
        self.record(result)
    }

    /// 목록이 하나 이상의 항목을 가지는지 확인합니다.
    pub fn non_empty_list<T: Display>(&mut self, name: impl Into<String>, items: &[T]) -> bool {
        let result = if items.is_empty() {
            VerificationResult::fail(name, "no matching items")
        } else {
            let joined = items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            VerificationResult::pass(name, joined)
        };
        self.record(result)
    }

    /// 조회 결과를 검증으로 기록합니다. 에러는 실패로 기록되고 `None`을 반환합니다.
    pub fn check_result<T>(
        &mut self,
        name: impl Into<String>,
        result: Result<T, WorkflowError>,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.record(VerificationResult::fail(name, e.to_string()));
                None
            }
        }
    }

    /// 검증 결과를 직접 기록합니다.
    pub fn record(&mut self, result: VerificationResult) -> bool {
        let passed = result.passed;
        let label = if passed { "pass" } else { "fail" };
        metrics::counter!(m::VERIFY_ASSERTIONS_TOTAL, m::LABEL_RESULT => label).increment(1);
        if passed {
            debug!(check = %result.name, "verification passed");
        } else {
            warn!(check = %result.name, detail = %result.detail, "verification failed");
        }
        self.results.push(result);
        passed
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// 누적된 결과로 리포트를 만듭니다.
    pub fn finish(self) -> VerificationReport {
        VerificationReport {
            results: self.results,
        }
    }
}

/// 검증 리포트
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationReport {
    pub results: Vec<VerificationResult>,
}

impl VerificationReport {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// 실패한 검증들
    pub fn failures(&self) -> impl Iterator<Item = &VerificationResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// 실패가 있으면 모든 실패 항목을 담은 `AssertionFailed`를 반환합니다.
    pub fn failure(&self) -> Option<WorkflowError> {
        if self.is_success() {
            return None;
        }
        let summary = self
            .failures()
            .map(|r| format!("{}: {}", r.name, r.detail))
            .collect::<Vec<_>>()
            .join("; ");
        Some(WorkflowError::AssertionFailed {
            failed: self.failed(),
            total: self.results.len(),
            summary,
        })
    }

    pub fn into_result(self) -> Result<Self, WorkflowError> {
        match self.failure() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}
