//! 에러 타입 — 도메인별 에러 정의

/// Ironwatch 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum IronwatchError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 리소스 감시 에러
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

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

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}

/// 클러스터/스토리지 감시 에러
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// 클러스터 API 호출 실패
    #[error("cluster api error: {0}")]
    ClusterApi(String),

    /// 스토리지 API 호출 실패
    #[error("storage api error: {0}")]
    StorageApi(String),

    /// 워크로드 해석 실패
    #[error("workload resolution failed: {0}")]
    Resolution(String),

    /// 이벤트 처리 실패
    #[error("event handling failed: {0}")]
    Handling(String),
}
