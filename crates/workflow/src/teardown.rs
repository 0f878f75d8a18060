//! 범위 기반 teardown -- 워크플로우 시작 시 destroy를 등록하고 모든 종료 경로에서 실행
//!
//! [`TeardownGuard`]는 apply 이전에 생성되어 세션의 destroy를 책임집니다.
//! 정상 경로에서는 [`TeardownGuard::release`]를 await 하고,
//! 가드가 release 없이 drop되면 (예: 실행 future 취소) 현재 Tokio 런타임에
//! best-effort destroy를 spawn 합니다.
//!
//! 여러 워크플로우를 중첩할 때는 [`TeardownStack`]이 가장 나중에 획득한
//! 가드부터 역순으로 해제합니다.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use infraprobe_core::metrics as m;

use crate::backend::ProvisioningBackend;
use crate::error::WorkflowError;
use crate::retry::{RetryClassifier, RetryPolicy, retry};
use crate::session::Session;

/// 세션의 인프라를 정리합니다. 세션당 백엔드 destroy는 최대 한 번 실행됩니다.
pub(crate) async fn destroy_session<P: ProvisioningBackend>(
    provisioner: &P,
    session: &Session,
    policy: &RetryPolicy,
    classifier: &dyn RetryClassifier,
) -> Result<(), WorkflowError> {
    session
        .teardown_once(|| async {
            let run_id = session.run_id();
            info!(
                %run_id,
                working_dir = %session.config().working_dir().display(),
                "destroying infrastructure"
            );

            let start = Instant::now();
            let result = retry(policy, classifier, "destroy", || {
                provisioner.destroy(session.config())
            })
            .await;
            metrics::histogram!(m::DESTROY_DURATION_SECONDS)
                .record(start.elapsed().as_secs_f64());
            session.mark_destroyed().await;

            match result {
                Ok(outcome) => {
                    metrics::counter!(m::DESTROY_TOTAL, m::LABEL_RESULT => "success").increment(1);
                    info!(%run_id, attempts = outcome.attempts, "infrastructure destroyed");
                    Ok(())
                }
                Err(exhausted) => {
                    metrics::counter!(m::DESTROY_TOTAL, m::LABEL_RESULT => "failure").increment(1);
                    error!(
                        %run_id,
                        attempts = exhausted.attempts,
                        error = %exhausted.last,
                        "destroy failed, resources may remain"
                    );
                    Err(WorkflowError::Destroy {
                        attempts: exhausted.attempts,
                        reason: exhausted.last.to_string(),
                    })
                }
            }
        })
        .await
}

/// 해제 시 destroy를 실행하는 정리 책임
struct Armed<P: ProvisioningBackend> {
    provisioner: Arc<P>,
    policy: RetryPolicy,
    classifier: Arc<dyn RetryClassifier>,
}

/// 세션 destroy를 범위에 묶는 가드
///
/// # 사용 예시
/// ```ignore
/// let guard = runner.begin(config);
/// let outcome = runner.apply(guard.session()).await;
/// // ...검증...
/// let teardown = guard.release().await;
/// ```
pub struct TeardownGuard<P: ProvisioningBackend> {
    session: Arc<Session>,
    armed: Option<Armed<P>>,
}

impl<P: ProvisioningBackend> TeardownGuard<P> {
    pub(crate) fn new(
        session: Arc<Session>,
        provisioner: Arc<P>,
        policy: RetryPolicy,
        classifier: Arc<dyn RetryClassifier>,
    ) -> Self {
        Self {
            session,
            armed: Some(Armed {
                provisioner,
                policy,
                classifier,
            }),
        }
    }

    /// 가드가 책임지는 세션
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// 아직 release 되지 않았는지 확인합니다.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// destroy를 실행하고 가드를 해제합니다.
    ///
    /// 세션이 이미 정리되었으면 백엔드를 다시 호출하지 않고 기록된 결과를 반환합니다.
    pub async fn release(mut self) -> Result<(), WorkflowError> {
        match self.armed.take() {
            Some(armed) => {
                destroy_session(
                    armed.provisioner.as_ref(),
                    &self.session,
                    &armed.policy,
                    armed.classifier.as_ref(),
                )
                .await
            }
            None => self.session.teardown_result().unwrap_or(Ok(())),
        }
    }
}

impl<P: ProvisioningBackend> Drop for TeardownGuard<P> {
    fn drop(&mut self) {
        let Some(armed) = self.armed.take() else {
            return;
        };
        if self.session.is_torn_down() {
            return;
        }

        let run_id = self.session.run_id();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                error!(%run_id, "teardown guard dropped while armed, scheduling destroy");
                let session = Arc::clone(&self.session);
                handle.spawn(async move {
                    if let Err(e) = destroy_session(
                        armed.provisioner.as_ref(),
                        &session,
                        &armed.policy,
                        armed.classifier.as_ref(),
                    )
                    .await
                    {
                        error!(%run_id, error = %e, "background destroy failed");
                    }
                });
            }
            Err(_) => {
                error!(
                    %run_id,
                    working_dir = %self.session.config().working_dir().display(),
                    "teardown guard dropped outside a runtime, infrastructure may leak"
                );
            }
        }
    }
}

/// 여러 가드를 획득 역순으로 해제하는 스택
pub struct TeardownStack<P: ProvisioningBackend> {
    guards: Vec<TeardownGuard<P>>,
}

impl<P: ProvisioningBackend> Default for TeardownStack<P> {
    fn default() -> Self {
        Self { guards: Vec::new() }
    }
}

impl<P: ProvisioningBackend> TeardownStack<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 가드를 스택에 올립니다.
    pub fn push(&mut self, guard: TeardownGuard<P>) {
        self.guards.push(guard);
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// 모든 가드를 LIFO 순서로 해제하고 발생한 에러를 모두 반환합니다.
    ///
    /// 한 가드의 실패가 나머지 가드의 해제를 막지 않습니다.
    pub async fn release_all(mut self) -> Vec<WorkflowError> {
        let mut errors = Vec::new();
        while let Some(guard) = self.guards.pop() {
            let run_id = guard.session().run_id();
            if let Err(e) = guard.release().await {
                warn!(%run_id, error = %e, "teardown failed, continuing with remaining guards");
                errors.push(e);
            }
        }
        errors
    }
}
