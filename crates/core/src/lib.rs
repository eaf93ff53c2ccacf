//! Ironwatch 공통 크레이트
//!
//! 워크로드/스토리지 도메인 타입, 감시 이벤트와 스캔 명령, 설정, 에러,
//! 모듈 생명주기 trait, 메트릭 이름을 정의합니다.

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, IronwatchError, PipelineError, WatchError};

// 설정
pub use config::IronwatchConfig;

// 이벤트
pub use event::{Event, EventMetadata, EventType, ScanCommand, WatchEvent};

// 파이프라인 trait
pub use pipeline::{DynPipeline, HealthStatus, Pipeline};

// 도메인 타입
pub use types::{
    ArtifactKind, ArtifactMeta, ContainerStatus, OwnerReference, PodInfo, PodPhase, StorageObject,
    VulnerabilityManifest, Wlid, WorkloadRef,
};
