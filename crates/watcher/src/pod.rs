//! 파드 이벤트 파이프라인
//!
//! 파드 "Modified" 이벤트 하나를 처리하는 단계:
//!
//! 1. 필터 -- Running 단계의 Modified 이벤트만 통과, 단건 조회로 존재 재확인
//! 2. 상위 워크로드 해석 ([`ParentResolver`])
//! 3. Running 컨테이너의 이미지 추출
//! 4. 이미지 해시가 인덱스에 없으면 "new", 있으면 "known"으로 분류
//! 5. 저장소 갱신과 스캔 명령 결정
//! 6. 인스턴스 ID 기록
//! 7. 스캔 명령 전송
//!
//! 2~4단계([`PodEventPipeline::observe`])는 정리 태스크의 재구축에서도 그대로 사용됩니다.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info};

use ironwatch_core::event::{EventType, ScanCommand, WatchEvent};
use ironwatch_core::metrics as m;
use ironwatch_core::types::PodInfo;

use crate::cluster::ClusterClient;
use crate::error::WatcherError;
use crate::image::{image_hash, running_container_images};
use crate::instance_id::hashed_instance_ids;
use crate::parent::ParentResolver;
use crate::store::{ContainerImages, CorrelationStore, PodObservation};
use crate::watch::{EventHandler, EventStream, WatchSource};

/// 파드 구독의 종류 레이블
pub const POD_STREAM: &str = "pods";

/// 스캔 명령 출처 레이블
const SOURCE_POD: &str = "pod";

/// 파드 이벤트 파이프라인
pub struct PodEventPipeline<C> {
    cluster: Arc<C>,
    resolver: ParentResolver<C>,
    store: Arc<CorrelationStore>,
    commands: mpsc::Sender<ScanCommand>,
}

impl<C: ClusterClient> PodEventPipeline<C> {
    /// 새 파이프라인을 생성합니다.
    pub fn new(
        cluster: Arc<C>,
        store: Arc<CorrelationStore>,
        commands: mpsc::Sender<ScanCommand>,
        cluster_name: impl Into<String>,
        max_owner_depth: usize,
    ) -> Self {
        let resolver = ParentResolver::new(Arc::clone(&cluster), cluster_name, max_owner_depth);
        Self {
            cluster,
            resolver,
            store,
            commands,
        }
    }

    /// 클러스터 클라이언트
    pub fn cluster(&self) -> &Arc<C> {
        &self.cluster
    }

    /// 상관관계 저장소
    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    /// 파드를 등록 단위로 변환합니다. 저장소는 건드리지 않습니다.
    pub async fn observe(&self, pod: &PodInfo) -> Result<PodObservation, WatcherError> {
        let wlid = self.resolver.resolve(pod).await?;
        let containers = running_container_images(pod);
        let instance_ids = hashed_instance_ids(pod)?;
        Ok(PodObservation {
            wlid,
            containers,
            instance_ids,
        })
    }

    /// 관측 결과를 저장소에 반영하고, 필요하면 스캔 명령을 만듭니다.
    pub fn apply(&self, obs: &PodObservation) -> Option<ScanCommand> {
        let new_images: ContainerImages = obs
            .containers
            .iter()
            .filter(|(_, image_ref)| !self.store.contains_image(&image_hash(image_ref)))
            .map(|(container, image_ref)| (container.clone(), image_ref.clone()))
            .collect();

        let to_scan = if !new_images.is_empty() {
            for (container, image_ref) in &new_images {
                self.store
                    .add_image_workload(image_hash(image_ref), obs.wlid.clone());
                self.store
                    .add_container_mapping(obs.wlid.clone(), container, image_ref);
            }
            Some(new_images)
        } else if self.store.has_workload(&obs.wlid) {
            debug!(wlid = %obs.wlid, "workload already known, nothing to scan");
            None
        } else {
            for (container, image_ref) in &obs.containers {
                self.store
                    .add_container_mapping(obs.wlid.clone(), container, image_ref);
            }
            Some(obs.containers.clone())
        };

        for id in &obs.instance_ids {
            self.store.add_instance(id.clone());
        }

        to_scan
            .filter(|containers| !containers.is_empty())
            .map(|containers| ScanCommand::new(obs.wlid.clone(), containers))
    }

    /// 파드 이벤트 하나를 처리합니다. 전송된 스캔 명령을 반환합니다.
    pub async fn handle_event(
        &self,
        event: WatchEvent<PodInfo>,
    ) -> Result<Option<ScanCommand>, WatcherError> {
        if event.event_type != EventType::Modified || !event.object.is_running() {
            return Ok(None);
        }
        let pod = event.object;

        if self.cluster.get_pod(&pod.namespace, &pod.name).await?.is_none() {
            debug!(namespace = %pod.namespace, pod = %pod.name, "pod no longer exists, skipping");
            return Ok(None);
        }

        let obs = self.observe(&pod).await?;
        let Some(command) = self.apply(&obs) else {
            return Ok(None);
        };

        self.commands
            .send(command.clone())
            .await
            .map_err(|_| WatcherError::Channel("scan command receiver dropped".to_owned()))?;
        metrics::counter!(m::WATCHER_SCAN_COMMANDS_TOTAL, m::LABEL_SOURCE => SOURCE_POD)
            .increment(1);
        info!(
            wlid = %command.wlid,
            containers = command.containers.len(),
            "scan command emitted for pod workload"
        );
        Ok(Some(command))
    }
}

/// 파드 구독 핸들러
pub struct PodHandler<C> {
    pipeline: Arc<PodEventPipeline<C>>,
}

impl<C> PodHandler<C> {
    pub fn new(pipeline: Arc<PodEventPipeline<C>>) -> Self {
        Self { pipeline }
    }
}

impl<C: ClusterClient> EventHandler<PodInfo> for PodHandler<C> {
    async fn handle(&self, event: WatchEvent<PodInfo>) -> Result<(), WatcherError> {
        self.pipeline.handle_event(event).await.map(|_| ())
    }
}

/// 파드 구독 원천
///
/// 만료된 resourceVersion으로 재구독하면 거부되므로
/// 재구독 전마다 전체 목록을 다시 조회해 새 버전을 얻습니다.
pub struct PodWatchSource<C> {
    cluster: Arc<C>,
    resource_version: Mutex<String>,
}

impl<C: ClusterClient> PodWatchSource<C> {
    /// 초기 목록 조회에서 얻은 resourceVersion으로 생성합니다. 비어 있으면 첫 구독 전에 조회합니다.
    pub fn new(cluster: Arc<C>, resource_version: impl Into<String>) -> Self {
        Self {
            cluster,
            resource_version: Mutex::new(resource_version.into()),
        }
    }

    /// 현재 resourceVersion
    pub fn resource_version(&self) -> String {
        self.resource_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn refresh(&self) -> Result<(), WatcherError> {
        let listing = self.cluster.list_pods(None, None).await?;
        debug!(resource_version = %listing.resource_version, "refreshed pod resource version");
        *self
            .resource_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = listing.resource_version;
        Ok(())
    }
}

impl<C: ClusterClient> WatchSource for PodWatchSource<C> {
    type Object = PodInfo;

    fn kind(&self) -> &'static str {
        POD_STREAM
    }

    async fn subscribe(&self) -> Result<EventStream<PodInfo>, WatcherError> {
        if self.resource_version().is_empty() {
            self.refresh().await?;
        }
        let version = self.resource_version();
        self.cluster.watch_pods(&version).await
    }

    async fn before_resubscribe(&self) -> Result<(), WatcherError> {
        self.refresh().await
    }
}
