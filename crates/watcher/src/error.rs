//! 리소스 감시 에러 타입
//!
//! [`WatcherError`]는 watcher 크레이트 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<WatcherError> for IronwatchError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 감시 루프, 핸들러, 정리 태스크 안에서는 어떤 에러도 치명적이지 않습니다.
//! 로그와 메트릭으로 남기고 루프는 계속 진행합니다.

use ironwatch_core::error::{IronwatchError, WatchError};

/// 리소스 감시 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    /// 클러스터 API 호출 실패 (목록 조회, 단건 조회, 구독)
    #[error("cluster api error: {0}")]
    Cluster(String),

    /// 스토리지 API 호출 실패 (목록 조회, 구독, 삭제)
    #[error("storage api error: {0}")]
    Storage(String),

    /// 대상 객체가 존재하지 않음
    #[error("object not found: {0}")]
    NotFound(String),

    /// 구독이 기대와 다른 종류의 객체를 전달함
    #[error("unsupported object: expected {expected}, found {found}")]
    UnsupportedObject {
        /// 기대한 종류
        expected: String,
        /// 실제 수신한 종류
        found: String,
    },

    /// 상관관계 어노테이션 누락
    #[error("{kind} '{name}' is missing annotation '{key}'")]
    MissingAnnotation {
        /// 아티팩트 종류
        kind: String,
        /// 아티팩트 이름
        name: String,
        /// 누락된 어노테이션 키
        key: String,
    },

    /// 상위 워크로드 해석 실패
    #[error("failed to resolve parent workload for pod '{pod}': {reason}")]
    ParentResolution {
        /// `namespace/name`
        pod: String,
        /// 실패 사유
        reason: String,
    },

    /// 소유자 체인이 최대 깊이를 초과함 (순환 참조 의심)
    #[error("owner chain of pod '{pod}' exceeds depth {depth}")]
    OwnerChainTooDeep {
        /// `namespace/name`
        pod: String,
        /// 설정된 최대 깊이
        depth: usize,
    },

    /// 인스턴스 ID 계산 실패
    #[error("failed to derive instance id for pod '{pod}': {reason}")]
    InstanceId {
        /// `namespace/name`
        pod: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),
}

impl From<WatcherError> for IronwatchError {
    fn from(err: WatcherError) -> Self {
        match &err {
            WatcherError::Cluster(msg) => IronwatchError::Watch(WatchError::ClusterApi(msg.clone())),
            WatcherError::Storage(msg) => IronwatchError::Watch(WatchError::StorageApi(msg.clone())),
            WatcherError::ParentResolution { .. }
            | WatcherError::OwnerChainTooDeep { .. }
            | WatcherError::InstanceId { .. } => {
                IronwatchError::Watch(WatchError::Resolution(err.to_string()))
            }
            WatcherError::Config { field, reason } => {
                IronwatchError::Config(ironwatch_core::error::ConfigError::InvalidValue {
                    field: field.clone(),
                    reason: reason.clone(),
                })
            }
            WatcherError::Channel(msg) => IronwatchError::Pipeline(
                ironwatch_core::error::PipelineError::ChannelSend(msg.clone()),
            ),
            WatcherError::NotFound(_)
            | WatcherError::UnsupportedObject { .. }
            | WatcherError::MissingAnnotation { .. } => {
                IronwatchError::Watch(WatchError::Handling(err.to_string()))
            }
        }
    }
}
