//! 메트릭 이름 상수
//!
//! 모든 메트릭의 이름을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `infraprobe_`
//! - 단계명: `apply_`, `destroy_`, `verify_`, `readiness_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! 레코더가 설치되지 않으면 모든 호출은 no-op입니다.

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 단계 레이블 키 (configure, apply, verify, destroy)
pub const LABEL_PHASE: &str = "phase";

// ─── Workflow 메트릭 ───────────────────────────────────────────────

/// 실행 중인 워크플로우 수 (gauge)
pub const WORKFLOWS_ACTIVE: &str = "infraprobe_workflows_active";

/// 실패한 워크플로우 수 (counter, label: phase)
pub const WORKFLOW_FAILURES_TOTAL: &str = "infraprobe_workflow_failures_total";

/// apply 시도 수 (counter, 재시도 포함)
pub const APPLY_ATTEMPTS_TOTAL: &str = "infraprobe_apply_attempts_total";

/// 재시도 가능한 에러로 분류된 apply 실패 수 (counter)
pub const APPLY_RETRIES_TOTAL: &str = "infraprobe_apply_retries_total";

/// apply 소요 시간 (histogram, 초)
pub const APPLY_DURATION_SECONDS: &str = "infraprobe_apply_duration_seconds";

/// destroy 실행 수 (counter, label: result)
pub const DESTROY_TOTAL: &str = "infraprobe_destroy_total";

/// destroy 소요 시간 (histogram, 초)
pub const DESTROY_DURATION_SECONDS: &str = "infraprobe_destroy_duration_seconds";

/// 검증 수 (counter, label: result)
pub const VERIFY_ASSERTIONS_TOTAL: &str = "infraprobe_verify_assertions_total";

/// 준비 상태 대기 시간 (histogram, 초)
pub const READINESS_WAIT_SECONDS: &str = "infraprobe_readiness_wait_seconds";
