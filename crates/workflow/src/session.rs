//! 워크플로우 세션 -- 단일 워크플로우 실행의 상태
//!
//! 세션은 `Configured → Applied → Destroyed` 순서로만 전이합니다.
//! apply가 실패하면 teardown 이후 `Configured`에서 곧바로 `Destroyed`가 됩니다.
//! teardown 결과는 [`OnceCell`]에 한 번만 기록되므로 가드와 호출자가 모두
//! destroy를 요청해도 백엔드 destroy는 최대 한 번 실행됩니다.

use std::future::Future;

use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

use infraprobe_core::types::OutputSet;

use crate::config::WorkflowConfig;
use crate::error::WorkflowError;

/// 세션 상태
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// configure 완료, 아직 apply 전
    Configured,
    /// apply 성공, 출력 조회 가능
    Applied(OutputSet),
    /// teardown 실행됨
    Destroyed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Applied(_) => "applied",
            Self::Destroyed => "destroyed",
        }
    }
}

/// 단일 워크플로우 실행 세션
#[derive(Debug)]
pub struct Session {
    run_id: Uuid,
    config: WorkflowConfig,
    state: Mutex<SessionState>,
    teardown: OnceCell<Result<(), WorkflowError>>,
}

impl Session {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            state: Mutex::new(SessionState::Configured),
            teardown: OnceCell::new(),
        }
    }

    /// 로그/리포트 상관관계용 실행 ID
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// 현재 상태의 스냅샷을 반환합니다.
    pub async fn state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// apply 이후 destroy 이전이면 출력 스냅샷을 반환합니다.
    pub async fn outputs(&self) -> Option<OutputSet> {
        match &*self.state.lock().await {
            SessionState::Applied(outputs) => Some(outputs.clone()),
            _ => None,
        }
    }

    /// teardown이 이미 실행되었는지 확인합니다.
    pub fn is_torn_down(&self) -> bool {
        self.teardown.initialized()
    }

    /// 기록된 teardown 결과 (아직 실행 전이면 `None`)
    pub fn teardown_result(&self) -> Option<Result<(), WorkflowError>> {
        self.teardown.get().cloned()
    }

    pub(crate) async fn mark_applied(&self, outputs: OutputSet) {
        let mut state = self.state.lock().await;
        // teardown이 먼저 끝난 세션은 다시 살아나지 않음
        if *state == SessionState::Configured {
            *state = SessionState::Applied(outputs);
        }
    }

    pub(crate) async fn mark_destroyed(&self) {
        *self.state.lock().await = SessionState::Destroyed;
    }

    /// `f`를 세션당 최대 한 번 실행하고 그 결과를 반환합니다.
    ///
    /// 동시에 호출되면 나중 호출자는 첫 실행이 끝날 때까지 기다린 뒤
    /// 같은 결과를 받습니다.
    pub(crate) async fn teardown_once<F, Fut>(&self, f: F) -> Result<(), WorkflowError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), WorkflowError>>,
    {
        self.teardown.get_or_init(f).await.clone()
    }
}
