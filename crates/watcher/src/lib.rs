//! Ironwatch 리소스 감시 엔진
//!
//! 클러스터의 실행 중인 파드와 스토리지의 SBOM/필터링된 SBOM/취약점 매니페스트를 구독하여
//! 이미지와 워크로드의 상관관계를 메모리에 유지하고, 더 이상 실행 중인 워크로드와 대응하지 않는
//! 아티팩트를 삭제하며, 새로 관측된 이미지에 대해 스캔 명령을 내보냅니다.
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`WatcherError`)
//! - [`config`]: Watcher configuration (`WatcherConfig`, builder)
//! - [`store`]: Correlation indices (`CorrelationStore`, `StoreSnapshot`)
//! - [`image`]: Image id normalisation and hash extraction
//! - [`instance_id`]: Container instance identifiers
//! - [`cluster`]: Cluster API abstraction (`ClusterClient` trait, `KubeClusterClient`)
//! - [`storage`]: Storage API abstraction (`StorageClient` trait, `KubeStorageClient`)
//! - [`watch`]: Generic reconnecting watch engine (`ReconnectingWatch`)
//! - [`parent`]: Owner-chain resolution (`ParentResolver`)
//! - [`pod`]: Pod event pipeline (`PodEventPipeline`, `PodWatchSource`)
//! - [`handlers`]: Per-kind storage artifact handlers
//! - [`cleanup`]: Periodic store rebuild (`CleanupTask`)
//! - [`watcher`]: Main orchestrator (`ResourceWatcher`, `ResourceWatcherBuilder`)
//!
//! # Architecture
//!
//! ```text
//! pods ──────────> ReconnectingWatch --> PodEventPipeline ──┐
//! sbom ──────────> ReconnectingWatch --> SbomHandler        ├──> CorrelationStore
//! filtered_sbom ─> ReconnectingWatch --> FilteredSbomHandler┤
//! vuln_manifest ─> ReconnectingWatch --> VulnManifestHandler┘
//!                                              |
//!                                         ScanCommand --mpsc--> downstream
//! ```

pub mod cleanup;
pub mod cluster;
pub mod config;
pub mod error;
pub mod handlers;
pub mod image;
pub mod instance_id;
pub mod parent;
pub mod pod;
pub mod storage;
pub mod store;
pub mod watch;
pub mod watcher;

// --- Public API Re-exports ---

// Watcher (main orchestrator)
pub use watcher::{ResourceWatcher, ResourceWatcherBuilder};

// Configuration
pub use config::{WatcherConfig, WatcherConfigBuilder};

// Error
pub use error::WatcherError;

// Store
pub use store::{ContainerImages, CorrelationStore, PodObservation, StoreSnapshot};

// Cluster / storage API
pub use cluster::{ClusterClient, KubeClusterClient, PodListing};
pub use storage::{KubeStorageClient, StorageClient};

// Watch engine
pub use watch::{
    ConnectionBoard, ConnectionState, EventHandler, EventStream, ReconnectingWatch, WatchSource,
};

// Pipelines and handlers
pub use cleanup::{CleanupTask, RebuildMode, RebuildSummary};
pub use handlers::{
    FilteredSbomHandler, SbomHandler, StorageWatchSource, VulnerabilityManifestHandler,
    WLID_ANNOTATION_KEY,
};
pub use parent::ParentResolver;
pub use pod::{PodEventPipeline, PodHandler, PodWatchSource};
