//! 워크플로우 러너 -- configure → apply → verify → destroy 생명주기 관리
//!
//! [`WorkflowRunner`]는 세 협력자(프로비저닝, 리소스 조회, 시크릿 저장소)를
//! 조합하여 단일 워크플로우를 실행합니다. destroy는 apply 이전에
//! [`TeardownGuard`]로 등록되어 모든 종료 경로에서 정확히 한 번 실행됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! configure ──> begin (guard armed)
//!                  |
//!               apply  ──(retry)──> ProvisioningBackend
//!                  |
//!               body(WorkflowContext) ──> ResourceQuery / SecretStore
//!                  |
//!               guard.release() ──> destroy
//!                  |
//!               WorkflowReport
//! ```
//!
//! # 사용 예시
//! ```ignore
//! let runner = WorkflowRunnerBuilder::new()
//!     .provisioner(Arc::new(TerraformBackend::new()))
//!     .resource_query(Arc::clone(&aws))
//!     .secret_store(aws)
//!     .build()?;
//!
//! let config = runner.configure(WorkflowOptions::new("../", "us-west-2"))?;
//! let report = runner
//!     .run(config, |ctx| async move {
//!         let mut v = Verifier::new();
//!         v.non_empty("instance_id", ctx.outputs().get("instance_id").unwrap_or_default());
//!         Ok(v.finish())
//!     })
//!     .await;
//! report.into_result()?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use infraprobe_core::metrics as m;
use infraprobe_core::types::OutputSet;

use crate::backend::{ProvisioningBackend, ResourceQuery, SecretStore};
use crate::config::{WorkflowConfig, WorkflowOptions, configure};
use crate::error::{Phase, WorkflowError};
use crate::readiness::{ReadinessOutcome, ReadinessPolicy, await_fixed, wait_until_ready};
use crate::retry::{PatternClassifier, RetryClassifier, RetryPolicy, retry};
use crate::session::Session;
use crate::teardown::{TeardownGuard, destroy_session};
use crate::verify::VerificationReport;

/// 워크플로우 러너
pub struct WorkflowRunner<P, Q, S>
where
    P: ProvisioningBackend,
    Q: ResourceQuery,
    S: SecretStore,
{
    provisioner: Arc<P>,
    query: Arc<Q>,
    secrets: Arc<S>,
    retry_policy: RetryPolicy,
    classifier: Arc<dyn RetryClassifier>,
    readiness: ReadinessPolicy,
}

impl<P, Q, S> Clone for WorkflowRunner<P, Q, S>
where
    P: ProvisioningBackend,
    Q: ResourceQuery,
    S: SecretStore,
{
    fn clone(&self) -> Self {
        Self {
            provisioner: Arc::clone(&self.provisioner),
            query: Arc::clone(&self.query),
            secrets: Arc::clone(&self.secrets),
            retry_policy: self.retry_policy,
            classifier: Arc::clone(&self.classifier),
            readiness: self.readiness,
        }
    }
}

impl<P, Q, S> WorkflowRunner<P, Q, S>
where
    P: ProvisioningBackend,
    Q: ResourceQuery,
    S: SecretStore,
{
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn readiness_policy(&self) -> &ReadinessPolicy {
        &self.readiness
    }

    /// 옵션을 검증하고 불변 설정을 만듭니다. 외부 호출은 없습니다.
    pub fn configure(&self, options: WorkflowOptions) -> Result<WorkflowConfig, WorkflowError> {
        let config = configure(options)?;
        debug!(
            working_dir = %config.working_dir().display(),
            region = config.region(),
            variables = config.variables().len(),
            "workflow configured"
        );
        Ok(config)
    }

    /// 세션을 시작하고 destroy를 책임지는 가드를 반환합니다.
    ///
    /// 가드는 apply 이전에 생성되므로 apply가 부분적으로 실패해도 정리가 실행됩니다.
    pub fn begin(&self, config: WorkflowConfig) -> TeardownGuard<P> {
        let session = Arc::new(Session::new(config));
        info!(
            run_id = %session.run_id(),
            region = session.config().region(),
            "workflow session started"
        );
        TeardownGuard::new(
            session,
            Arc::clone(&self.provisioner),
            self.retry_policy,
            Arc::clone(&self.classifier),
        )
    }

    /// init + apply를 실행하고 선언된 모든 출력을 반환합니다.
    ///
    /// 재시도 가능 에러는 정책에 따라 재시도하고, 재시도 불가 에러는
    /// 즉시 `WorkflowError::Apply`로 반환합니다.
    pub async fn apply(&self, session: &Session) -> Result<OutputSet, WorkflowError> {
        let run_id = session.run_id();
        if session.is_torn_down() {
            return Err(WorkflowError::Apply {
                attempts: 0,
                reason: "session already destroyed".to_owned(),
            });
        }

        info!(%run_id, phase = %Phase::Apply, "applying infrastructure");
        let start = Instant::now();
        let result = retry(
            &self.retry_policy,
            self.classifier.as_ref(),
            "apply",
            || {
                metrics::counter!(m::APPLY_ATTEMPTS_TOTAL).increment(1);
                self.provisioner.init_and_apply(session.config())
            },
        )
        .await;
        metrics::histogram!(m::APPLY_DURATION_SECONDS).record(start.elapsed().as_secs_f64());

        let attempts = match &result {
            Ok(outcome) => outcome.attempts,
            Err(exhausted) => exhausted.attempts,
        };
        metrics::counter!(m::APPLY_RETRIES_TOTAL).increment(u64::from(attempts.saturating_sub(1)));

        if let Err(exhausted) = result {
            error!(
                %run_id,
                attempts,
                retryable = exhausted.retryable,
                error = %exhausted.last,
                "apply failed"
            );
            return Err(WorkflowError::Apply {
                attempts,
                reason: exhausted.last.to_string(),
            });
        }

        let outputs = self
            .provisioner
            .outputs(session.config())
            .await
            .map_err(|source| WorkflowError::Backend {
                phase: Phase::Apply,
                source,
            })?;
        session.mark_applied(outputs.clone()).await;

        info!(%run_id, attempts, outputs = outputs.len(), "apply completed");
        Ok(outputs)
    }

    /// 이름으로 단일 출력을 조회합니다.
    ///
    /// apply 이전이나 destroy 이후에는 `OutputNotFound`를 반환합니다.
    pub async fn get_output(&self, session: &Session, name: &str) -> Result<String, WorkflowError> {
        if session.outputs().await.is_none() {
            return Err(WorkflowError::OutputNotFound(name.to_owned()));
        }
        match self.provisioner.output(session.config(), name).await {
            Ok(value) => {
                debug!(run_id = %session.run_id(), output = name, "output read");
                Ok(value)
            }
            Err(e) if e.is_not_found() => Err(WorkflowError::OutputNotFound(name.to_owned())),
            Err(source) => Err(WorkflowError::Backend {
                phase: Phase::Verify,
                source,
            }),
        }
    }

    /// 태그로 리소스를 찾아 ID 목록을 반환합니다. 일치하는 리소스가 없으면 빈 목록입니다.
    pub async fn verify_resource_tag(
        &self,
        region: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<String>, WorkflowError> {
        let resources = self
            .query
            .find_by_tag(region, key, value)
            .await
            .map_err(|source| WorkflowError::Backend {
                phase: Phase::Verify,
                source,
            })?;
        let ids: Vec<String> = resources.into_iter().map(|r| r.id).collect();
        debug!(region, tag_key = key, tag_value = value, matches = ids.len(), "tag lookup");
        Ok(ids)
    }

    /// 고정 시간 동안 대기합니다.
    pub async fn await_readiness(&self, duration: Duration) {
        await_fixed(duration).await;
    }

    /// 모든 리소스가 준비될 때까지 러너의 준비 정책에 따라 폴링합니다.
    pub async fn await_ready(&self, region: &str, ids: &[String]) -> ReadinessOutcome {
        wait_until_ready(self.query.as_ref(), region, ids, &self.readiness).await
    }

    /// 시크릿을 조회합니다. 없거나 비어 있으면 `SecretNotFound`를 반환합니다.
    pub async fn get_secret(&self, region: &str, path: &str) -> Result<String, WorkflowError> {
        match self.secrets.get_parameter(region, path).await {
            Ok(value) if value.is_empty() => {
                warn!(region, path, "secret exists but is empty");
                Err(WorkflowError::SecretNotFound(path.to_owned()))
            }
            Ok(value) => Ok(value),
            Err(e) if e.is_not_found() => Err(WorkflowError::SecretNotFound(path.to_owned())),
            Err(source) => Err(WorkflowError::Backend {
                phase: Phase::Verify,
                source,
            }),
        }
    }

    /// 세션의 인프라를 정리합니다. 세션당 한 번만 실제로 실행됩니다.
    pub async fn destroy(&self, session: &Session) -> Result<(), WorkflowError> {
        destroy_session(
            self.provisioner.as_ref(),
            session,
            &self.retry_policy,
            self.classifier.as_ref(),
        )
        .await
    }

    /// 전체 워크플로우를 실행합니다.
    ///
    /// apply 성공 시 `body`에 [`WorkflowContext`]를 넘겨 검증을 수행하고,
    /// 결과와 상관없이 destroy를 실행합니다. `body`가 패닉하면 destroy 이후
    /// 패닉을 그대로 다시 발생시킵니다.
    pub async fn run<F, Fut>(&self, config: WorkflowConfig, body: F) -> WorkflowReport
    where
        F: FnOnce(WorkflowContext<P, Q, S>) -> Fut,
        Fut: Future<Output = Result<VerificationReport, WorkflowError>> + Send + 'static,
    {
        let guard = self.begin(config);
        // guard보다 먼저 drop되어, 취소 시 destroy가 spawn되기 전에 본문을 중단합니다.
        let mut scope = RunScope::enter();
        let session = Arc::clone(guard.session());
        let run_id = session.run_id();

        let mut outputs = OutputSet::new();
        let mut verification = VerificationReport::default();
        let mut failure = None;
        let mut panic_payload = None;

        match self.apply(&session).await {
            Ok(applied) => {
                outputs = applied.clone();
                let ctx = WorkflowContext {
                    runner: self.clone(),
                    session: Arc::clone(&session),
                    outputs: applied,
                };
                let handle = tokio::spawn(body(ctx));
                scope.body = Some(handle.abort_handle());
                match handle.await {
                    Ok(Ok(report)) => {
                        failure = report.failure();
                        verification = report;
                    }
                    Ok(Err(e)) => failure = Some(e),
                    Err(join_err) if join_err.is_panic() => {
                        error!(%run_id, "verification body panicked, tearing down before resuming");
                        panic_payload = Some(join_err.into_panic());
                    }
                    Err(join_err) => {
                        failure = Some(WorkflowError::Panicked(join_err.to_string()));
                    }
                }
            }
            Err(e) => failure = Some(e),
        }

        let teardown = guard.release().await;
        drop(scope);

        if let Some(payload) = panic_payload {
            std::panic::resume_unwind(payload);
        }

        let teardown_error = teardown.err();
        let failed_phase = failure
            .as_ref()
            .map(WorkflowError::phase)
            .or(teardown_error.as_ref().map(|_| Phase::Destroy));
        if let Some(phase) = failed_phase {
            metrics::counter!(m::WORKFLOW_FAILURES_TOTAL, m::LABEL_PHASE => phase.as_str())
                .increment(1);
        }

        match (&failure, &teardown_error) {
            (None, None) => info!(%run_id, "workflow succeeded"),
            (Some(e), _) => error!(%run_id, phase = %e.phase(), error = %e, "workflow failed"),
            (None, Some(e)) => error!(%run_id, error = %e, "workflow failed during teardown"),
        }

        WorkflowReport {
            run_id,
            outputs,
            verification,
            failure,
            teardown_error,
        }
    }
}

/// 실행 중인 `run` 한 건의 범위
///
/// drop 시 아직 진행 중인 검증 본문 task를 abort 하고 활성 워크플로우 게이지를 되돌립니다.
struct RunScope {
    body: Option<AbortHandle>,
}

impl RunScope {
    fn enter() -> Self {
        metrics::gauge!(m::WORKFLOWS_ACTIVE).increment(1.0);
        Self { body: None }
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        if let Some(body) = self.body.take() {
            body.abort();
        }
        metrics::gauge!(m::WORKFLOWS_ACTIVE).decrement(1.0);
    }
}

/// 검증 본문에 전달되는 실행 컨텍스트
pub struct WorkflowContext<P, Q, S>
where
    P: ProvisioningBackend,
    Q: ResourceQuery,
    S: SecretStore,
{
    runner: WorkflowRunner<P, Q, S>,
    session: Arc<Session>,
    outputs: OutputSet,
}

impl<P, Q, S> WorkflowContext<P, Q, S>
where
    P: ProvisioningBackend,
    Q: ResourceQuery,
    S: SecretStore,
{
    pub fn run_id(&self) -> Uuid {
        self.session.run_id()
    }

    /// 배포 리전
    pub fn region(&self) -> &str {
        self.session.config().region()
    }

    /// apply 직후의 출력 스냅샷
    pub fn outputs(&self) -> &OutputSet {
        &self.outputs
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn runner(&self) -> &WorkflowRunner<P, Q, S> {
        &self.runner
    }

    pub async fn output(&self, name: &str) -> Result<String, WorkflowError> {
        self.runner.get_output(&self.session, name).await
    }

    /// 세션 리전에서 태그로 리소스 ID를 조회합니다.
    pub async fn verify_resource_tag(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<String>, WorkflowError> {
        self.runner.verify_resource_tag(self.region(), key, value).await
    }

    pub async fn await_readiness(&self, duration: Duration) {
        self.runner.await_readiness(duration).await;
    }

    pub async fn await_ready(&self, ids: &[String]) -> ReadinessOutcome {
        self.runner.await_ready(self.region(), ids).await
    }

    /// 세션 리전에서 시크릿을 조회합니다.
    pub async fn secret(&self, path: &str) -> Result<String, WorkflowError> {
        self.runner.get_secret(self.region(), path).await
    }
}

/// 워크플로우 실행 리포트
#[derive(Debug)]
pub struct WorkflowReport {
    /// 실행 ID (UUID v4)
    pub run_id: Uuid,
    /// apply 직후의 출력 스냅샷 (apply 실패 시 비어 있음)
    pub outputs: OutputSet,
    /// 검증 결과
    pub verification: VerificationReport,
    /// 주 실패 (발생 단계 포함)
    pub failure: Option<WorkflowError>,
    /// teardown 실패
    pub teardown_error: Option<WorkflowError>,
}

impl WorkflowReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.teardown_error.is_none()
    }

    /// 리포트를 결과로 변환합니다.
    ///
    /// 주 실패가 있으면 teardown 실패보다 우선합니다.
    pub fn into_result(self) -> Result<Self, WorkflowError> {
        let mut report = self;
        if let Some(failure) = report.failure.take() {
            return Err(failure);
        }
        if let Some(teardown) = report.teardown_error.take() {
            return Err(teardown);
        }
        Ok(report)
    }
}

/// 워크플로우 러너 빌더
pub struct WorkflowRunnerBuilder<P, Q, S>
where
    P: ProvisioningBackend,
    Q: ResourceQuery,
    S: SecretStore,
{
    provisioner: Option<Arc<P>>,
    query: Option<Arc<Q>>,
    secrets: Option<Arc<S>>,
    retry_policy: RetryPolicy,
    classifier: Option<Arc<dyn RetryClassifier>>,
    readiness: ReadinessPolicy,
}

impl<P, Q, S> WorkflowRunnerBuilder<P, Q, S>
where
    P: ProvisioningBackend,
    Q: ResourceQuery,
    S: SecretStore,
{
    pub fn new() -> Self {
        Self {
            provisioner: None,
            query: None,
            secrets: None,
            retry_policy: RetryPolicy::default(),
            classifier: None,
            readiness: ReadinessPolicy::default(),
        }
    }

    /// 프로비저닝 백엔드를 설정합니다.
    pub fn provisioner(mut self, provisioner: Arc<P>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// 리소스 조회 백엔드를 설정합니다.
    pub fn resource_query(mut self, query: Arc<Q>) -> Self {
        self.query = Some(query);
        self
    }

    /// 시크릿 저장소를 설정합니다.
    pub fn secret_store(mut self, secrets: Arc<S>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// 재시도 분류기를 설정합니다. 기본값은 Terraform 일시 장애 패턴입니다.
    pub fn classifier(mut self, classifier: impl RetryClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn readiness_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// 러너를 생성합니다.
    ///
    /// # Errors
    ///
    /// 협력자 중 하나라도 설정되지 않으면 `WorkflowError::Config`를 반환합니다.
    pub fn build(self) -> Result<WorkflowRunner<P, Q, S>, WorkflowError> {
        let provisioner = self
            .provisioner
            .ok_or_else(|| WorkflowError::config("provisioner", "provisioning backend is required"))?;
        let query = self
            .query
            .ok_or_else(|| WorkflowError::config("resource_query", "resource query backend is required"))?;
        let secrets = self
            .secrets
            .ok_or_else(|| WorkflowError::config("secret_store", "secret store is required"))?;
        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(PatternClassifier::terraform_defaults()));

        Ok(WorkflowRunner {
            provisioner,
            query,
            secrets,
            retry_policy: self.retry_policy,
            classifier,
            readiness: self.readiness,
        })
    }
}

impl<P, Q, S> Default for WorkflowRunnerBuilder<P, Q, S>
where
    P: ProvisioningBackend,
    Q: ResourceQuery,
    S: SecretStore,
{
    fn default() -> Self {
        Self::new()
    }
}
