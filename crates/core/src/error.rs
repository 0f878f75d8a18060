//! 에러 타입 -- 도메인별 에러 정의

/// infraprobe 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum InfraprobeError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 외부 협력자(프로비저닝/조회/시크릿) 호출 에러
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// 워크플로우 실행 에러 (단계 정보 포함)
    #[error("workflow error in {phase} phase: {reason}")]
    Workflow { phase: String, reason: String },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 외부 협력자 호출 에러
///
/// 재시도 분류기는 이 에러의 `Display` 문자열(특히 `CommandFailed`의 stderr)을
/// 검사하여 일시적 장애인지 판단합니다.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// 외부 프로세스 실행 실패
    #[error("failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// 외부 명령이 0이 아닌 종료 코드로 끝남
    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// 명령 타임아웃
    #[error("'{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// 응답을 해석할 수 없음
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// 요청한 대상이 존재하지 않음
    #[error("not found: {0}")]
    NotFound(String),
}

impl BackendError {
    /// 대상 부재를 나타내는 에러인지 확인합니다.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
