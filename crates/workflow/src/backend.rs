//! 외부 협력자 추상화 -- 테스트 가능성을 위한 trait 정의
//!
//! 워크플로우 러너는 세 종류의 외부 협력자와만 통신합니다.
//!
//! ```text
//!            ┌────────────────┐
//!            │ WorkflowRunner │
//!            └───────┬────────┘
//!        ┌───────────┼─────────────┐
//!        ▼           ▼             ▼
//! ┌─────────────┐ ┌─────────────┐ ┌───────────┐
//! │Provisioning │ │ResourceQuery│ │SecretStore│  (trait)
//! │  Backend    │ └──────┬──────┘ └─────┬─────┘
//! └──────┬──────┘        │              │
//!        ▼               ▼              ▼
//!  TerraformBackend    AwsCli        AwsCli
//! ```
//!
//! 모든 trait은 `Send + Sync + 'static`이며, 실제 구현은
//! [`TerraformBackend`](crate::terraform::TerraformBackend)와
//! [`AwsCli`](crate::aws::AwsCli), 테스트는 mock 구현을 사용합니다.

use std::future::Future;

use infraprobe_core::error::BackendError;
use infraprobe_core::types::{OutputSet, ResourceInfo};

use crate::config::WorkflowConfig;

/// 프로비저닝 백엔드 (init/apply/output/destroy)
///
/// # Error Handling
///
/// - 외부 명령 실패: `BackendError::CommandFailed` (stderr 포함, 재시도 분류에 사용)
/// - 존재하지 않는 출력: `BackendError::NotFound`
pub trait ProvisioningBackend: Send + Sync + 'static {
    /// 초기화 후 apply를 수행합니다.
    fn init_and_apply(
        &self,
        config: &WorkflowConfig,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// 선언된 모든 출력을 조회합니다.
    fn outputs(
        &self,
        config: &WorkflowConfig,
    ) -> impl Future<Output = Result<OutputSet, BackendError>> + Send;

    /// 이름으로 단일 출력을 조회합니다.
    fn output(
        &self,
        config: &WorkflowConfig,
        name: &str,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    /// 생성한 인프라를 정리합니다.
    fn destroy(
        &self,
        config: &WorkflowConfig,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// 리소스 조회 백엔드
pub trait ResourceQuery: Send + Sync + 'static {
    /// 태그 필터에 일치하는 리소스를 조회합니다.
    ///
    /// 일치하는 리소스가 없으면 빈 목록을 반환합니다 (에러 아님).
    fn find_by_tag(
        &self,
        region: &str,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<Vec<ResourceInfo>, BackendError>> + Send;

    /// 리소스가 사용 가능한 상태인지 확인합니다.
    fn is_ready(
        &self,
        region: &str,
        id: &str,
    ) -> impl Future<Output = Result<bool, BackendError>> + Send;
}

/// 시크릿/파라미터 저장소
pub trait SecretStore: Send + Sync + 'static {
    /// 경로로 파라미터 값을 조회합니다.
    ///
    /// 존재하지 않으면 `BackendError::NotFound`를 반환합니다.
    fn get_parameter(
        &self,
        region: &str,
        path: &str,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;
}

/// 테스트용 Mock 협력자
///
/// 설정 가능한 응답을 반환하여 Terraform이나 클라우드 없이 테스트할 수 있습니다.
#[cfg(test)]
pub(crate) mod mock {
    use std::collections::{BTreeMap, HashSet, VecDeque};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// 호출 횟수를 기록하는 mock 프로비저너
    #[derive(Default)]
    pub struct MockProvisioner {
        pub outputs: OutputSet,
        apply_errors: Mutex<VecDeque<BackendError>>,
        destroy_errors: Mutex<VecDeque<BackendError>>,
        pub apply_calls: AtomicU32,
        pub destroy_calls: AtomicU32,
        /// destroy가 호출된 작업 디렉토리 (호출 순서)
        pub destroyed_dirs: Mutex<Vec<PathBuf>>,
    }

    impl MockProvisioner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_output(mut self, name: &str, value: &str) -> Self {
            self.outputs.insert(name, value);
            self
        }

        /// 다음 apply 호출들이 순서대로 이 에러를 반환합니다.
        pub fn with_apply_errors(self, errors: Vec<BackendError>) -> Self {
            *self.apply_errors.lock().unwrap() = errors.into();
            self
        }

        pub fn with_destroy_errors(self, errors: Vec<BackendError>) -> Self {
            *self.destroy_errors.lock().unwrap() = errors.into();
            self
        }

        pub fn apply_count(&self) -> u32 {
            self.apply_calls.load(Ordering::SeqCst)
        }

        pub fn destroy_count(&self) -> u32 {
            self.destroy_calls.load(Ordering::SeqCst)
        }
    }

    impl ProvisioningBackend for MockProvisioner {
        async fn init_and_apply(&self, _config: &WorkflowConfig) -> Result<(), BackendError> {
            self.apply_calls.fetch_add(1, Ordering::SeqCst);
            match self.apply_errors.lock().unwrap().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn outputs(&self, _config: &WorkflowConfig) -> Result<OutputSet, BackendError> {
            Ok(self.outputs.clone())
        }

        async fn output(&self, _config: &WorkflowConfig, name: &str) -> Result<String, BackendError> {
            self.outputs
                .get(name)
                .map(str::to_owned)
                .ok_or_else(|| BackendError::NotFound(name.to_owned()))
        }

        async fn destroy(&self, config: &WorkflowConfig) -> Result<(), BackendError> {
            self.destroy_calls.fetch_add(1, Ordering::SeqCst);
            self.destroyed_dirs
                .lock()
                .unwrap()
                .push(config.working_dir().to_path_buf());
            match self.destroy_errors.lock().unwrap().pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    /// 태그 조회와 준비 상태를 흉내 내는 mock 클라우드
    #[derive(Default)]
    pub struct MockCloud {
        pub resources: Vec<ResourceInfo>,
        pub parameters: BTreeMap<String, String>,
        /// 준비 완료로 보고할 리소스
        pub ready: Mutex<HashSet<String>>,
        /// `is_ready` 호출이 이 횟수를 넘으면 모든 리소스가 준비됩니다.
        pub ready_after_polls: Option<u32>,
        pub ready_polls: AtomicU32,
    }

    impl MockCloud {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_instance(mut self, id: &str, tag_key: &str, tag_value: &str) -> Self {
            let mut tags = BTreeMap::new();
            tags.insert(tag_key.to_owned(), tag_value.to_owned());
            self.resources.push(ResourceInfo {
                id: id.to_owned(),
                state: "running".to_owned(),
                tags,
            });
            self
        }

        pub fn with_parameter(mut self, path: &str, value: &str) -> Self {
            self.parameters.insert(path.to_owned(), value.to_owned());
            self
        }

        pub fn ready_after(mut self, polls: u32) -> Self {
            self.ready_after_polls = Some(polls);
            self
        }
    }

    impl ResourceQuery for MockCloud {
        async fn find_by_tag(
            &self,
            _region: &str,
            key: &str,
            value: &str,
        ) -> Result<Vec<ResourceInfo>, BackendError> {
            Ok(self
                .resources
                .iter()
                .filter(|r| r.tags.get(key).map(String::as_str) == Some(value))
                .cloned()
                .collect())
        }

        async fn is_ready(&self, _region: &str, id: &str) -> Result<bool, BackendError> {
            let polls = self.ready_polls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(after) = self.ready_after_polls {
                if polls > after {
                    return Ok(true);
                }
            }
            Ok(self.ready.lock().unwrap().contains(id))
        }
    }

    impl SecretStore for MockCloud {
        async fn get_parameter(&self, _region: &str, path: &str) -> Result<String, BackendError> {
            self.parameters
                .get(path)
                .cloned()
                .ok_or_else(|| BackendError::NotFound(path.to_owned()))
        }
    }
}
