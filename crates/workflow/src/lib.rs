#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: 워크플로우 에러 (`WorkflowError`, `Phase`)
//! - [`config`]: configure 단계 (`WorkflowOptions`, `WorkflowConfig`)
//! - [`backend`]: 협력자 trait (`ProvisioningBackend`, `ResourceQuery`, `SecretStore`)
//! - [`retry`]: 재시도 분류기와 정책 (`RetryClassifier`, `PatternClassifier`, `RetryPolicy`)
//! - [`session`]: 세션 상태 (`Session`, `SessionState`)
//! - [`teardown`]: 범위 기반 정리 (`TeardownGuard`, `TeardownStack`)
//! - [`readiness`]: 준비 상태 대기 (`ReadinessPolicy`, `ReadinessOutcome`)
//! - [`verify`]: 검증 누적 (`Verifier`, `VerificationReport`)
//! - [`runner`]: 오케스트레이터 (`WorkflowRunner`, `WorkflowRunnerBuilder`)
//! - [`terraform`]: Terraform/OpenTofu CLI 백엔드
//! - [`aws`]: AWS CLI 조회/파라미터 저장소

pub mod aws;
pub mod backend;
pub mod config;
pub mod error;
mod process;
pub mod readiness;
pub mod retry;
pub mod runner;
pub mod session;
pub mod teardown;
pub mod terraform;
pub mod verify;

// --- Public API Re-exports ---

// Runner
pub use runner::{WorkflowContext, WorkflowReport, WorkflowRunner, WorkflowRunnerBuilder};

// Configure
pub use config::{WorkflowConfig, WorkflowOptions, configure};

// Error
pub use error::{Phase, WorkflowError};

// Collaborators
pub use aws::AwsCli;
pub use backend::{ProvisioningBackend, ResourceQuery, SecretStore};
pub use terraform::TerraformBackend;

// Retry / teardown / readiness / verification
pub use readiness::{ReadinessOutcome, ReadinessPolicy};
pub use retry::{NeverRetry, PatternClassifier, RetryClassifier, RetryPolicy};
pub use session::{Session, SessionState};
pub use teardown::{TeardownGuard, TeardownStack};
pub use verify::{VerificationReport, Verifier};
