//! 리소스 감시 오케스트레이터 -- 감시 루프, 핸들러, 정리 태스크 전체 생명주기 관리
//!
//! [`ResourceWatcher`]는 core의 [`Pipeline`] trait을 구현하여
//! `ironwatch-operator`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! ClusterClient ──pods──────────> ReconnectingWatch ──> PodHandler ──────────┐
//! StorageClient ──sbom──────────> ReconnectingWatch ──> SbomHandler          │
//!               ──filtered_sbom─> ReconnectingWatch ──> FilteredSbomHandler ─┼──> ScanCommand ──mpsc──> downstream
//!               ──vuln_manifest─> ReconnectingWatch ──> VulnManifestHandler  │
//!                                                                            │
//!                    CleanupTask ──(interval)──> CorrelationStore <──────────┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ironwatch_core::error::{IronwatchError, PipelineError};
use ironwatch_core::event::ScanCommand;
use ironwatch_core::pipeline::{HealthStatus, Pipeline};
use ironwatch_core::types::{ArtifactKind, StorageObject, Wlid};

use crate::cleanup::{CleanupTask, RebuildMode, RebuildSummary, rebuild};
use crate::cluster::ClusterClient;
use crate::config::WatcherConfig;
use crate::error::WatcherError;
use crate::handlers::{
    FilteredSbomHandler, SbomHandler, StorageWatchSource, VulnerabilityManifestHandler,
};
use crate::pod::{POD_STREAM, PodEventPipeline, PodHandler, PodWatchSource};
use crate::storage::StorageClient;
use crate::store::CorrelationStore;
use crate::watch::{
    ConnectionBoard, ConnectionState, EventHandler, ReconnectingWatch, sleep_or_cancel,
};

/// 정지 시 태스크별 종료 대기 시간
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// 감시기 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum WatcherState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 리소스 감시기 -- 파드와 스토리지 아티팩트 구독, 상관관계 유지, 고아 정리를 관리합니다.
///
/// # 사용 예시
/// ```ignore
/// use ironwatch_watcher::{ResourceWatcher, ResourceWatcherBuilder};
///
/// let (mut watcher, command_rx) = ResourceWatcherBuilder::new()
///     .config(config)
///     .cluster_client(Arc::new(cluster))
///     .storage_client(Arc::new(storage))
///     .build()?;
///
/// watcher.start().await?;
/// ```
pub struct ResourceWatcher<C: ClusterClient, S: StorageClient> {
    /// 감시기 설정
    config: WatcherConfig,
    /// 현재 상태
    state: WatcherState,
    /// 클러스터 클라이언트 (공유)
    cluster: Arc<C>,
    /// 스토리지 클라이언트 (공유)
    storage: Arc<S>,
    /// 상관관계 저장소 (공유)
    store: Arc<CorrelationStore>,
    /// 파드 이벤트 파이프라인 (파드 핸들러와 정리 태스크가 공유)
    pipeline: Arc<PodEventPipeline<C>>,
    /// 스캔 명령 전송 채널
    command_tx: mpsc::Sender<ScanCommand>,
    /// 종류별 연결 상태
    board: ConnectionBoard,
    /// 백그라운드 태스크 취소 토큰
    cancel: CancellationToken,
    /// 백그라운드 태스크 핸들
    tasks: Vec<JoinHandle<()>>,
}

impl<C: ClusterClient, S: StorageClient> ResourceWatcher<C, S> {
    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            WatcherState::Initialized => "initialized",
            WatcherState::Running => "running",
            WatcherState::Stopped => "stopped",
        }
    }

    /// 감시기 설정
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// 상관관계 저장소에 대한 Arc 참조를 반환합니다.
    pub fn store(&self) -> Arc<CorrelationStore> {
        Arc::clone(&self.store)
    }

    /// 종류별 구독 연결 상태
    pub fn connection_states(&self) -> BTreeMap<&'static str, ConnectionState> {
        self.board.snapshot()
    }

    fn watch_set(&self) -> WatchSet<C, S> {
        WatchSet {
            cluster: Arc::clone(&self.cluster),
            storage: Arc::clone(&self.storage),
            store: Arc::clone(&self.store),
            pipeline: Arc::clone(&self.pipeline),
            command_tx: self.command_tx.clone(),
            board: self.board.clone(),
            cancel: self.cancel.clone(),
            retry_interval: self.config.retry_interval(),
            cleanup_interval: self.config.cleanup_interval(),
        }
    }
}

impl<C: ClusterClient, S: StorageClient> Pipeline for ResourceWatcher<C, S> {
    async fn start(&mut self) -> Result<(), IronwatchError> {
        if self.state == WatcherState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!(cluster = %self.config.cluster_name, "starting resource watcher");
        self.cancel = CancellationToken::new();
        let watches = self.watch_set();

        // 초기 전체 목록이 성공해야 감시 루프를 엽니다 (주입된 초기값 유지).
        match rebuild(self.pipeline.as_ref(), RebuildMode::Merge).await {
            Ok(summary) => {
                log_inventory(&summary, self.store.workload_count());
                self.tasks.extend(watches.spawn(summary.resource_version));
            }
            Err(e) => {
                warn!(
                    error = %e,
                    retry_secs = self.config.retry_interval_secs,
                    "failed to load initial pod inventory, watches wait for a successful listing"
                );
                for kind in stream_kinds() {
                    self.board.set(kind, ConnectionState::Disconnected);
                }
                self.tasks.push(tokio::spawn(bootstrap(watches)));
            }
        }

        self.state = WatcherState::Running;
        info!(tasks = self.tasks.len(), "resource watcher started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), IronwatchError> {
        if self.state != WatcherState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping resource watcher");
        self.cancel.cancel();

        for task in self.tasks.drain(..) {
            let abort = task.abort_handle();
            match tokio::time::timeout(STOP_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "watcher task ended abnormally"),
                Err(_) => {
                    warn!("watcher task did not stop in time, aborting");
                    abort.abort();
                }
            }
        }

        self.state = WatcherState::Stopped;
        info!("resource watcher stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            WatcherState::Running => {
                let disconnected = self.board.disconnected();
                if disconnected.is_empty() {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Degraded(format!(
                        "disconnected streams: {}",
                        disconnected.join(", ")
                    ))
                }
            }
            WatcherState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            WatcherState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 구독 종류 이름 (파드 + 스토리지 아티팩트 3종)
fn stream_kinds() -> [&'static str; 4] {
    [
        POD_STREAM,
        ArtifactKind::Sbom.label(),
        ArtifactKind::FilteredSbom.label(),
        ArtifactKind::VulnerabilityManifest.label(),
    ]
}

fn log_inventory(summary: &RebuildSummary, workloads: usize) {
    info!(
        pods = summary.listed,
        registered = summary.registered,
        skipped = summary.skipped,
        workloads,
        "initial pod inventory loaded"
    );
}

/// 초기 목록 이후 함께 스폰되는 감시 루프와 정리 태스크
struct WatchSet<C: ClusterClient, S: StorageClient> {
    cluster: Arc<C>,
    storage: Arc<S>,
    store: Arc<CorrelationStore>,
    pipeline: Arc<PodEventPipeline<C>>,
    command_tx: mpsc::Sender<ScanCommand>,
    board: ConnectionBoard,
    cancel: CancellationToken,
    retry_interval: Duration,
    cleanup_interval: Duration,
}

impl<C: ClusterClient, S: StorageClient> WatchSet<C, S> {
    fn spawn(self, resource_version: String) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::with_capacity(5);

        let pods = ReconnectingWatch::new(
            PodWatchSource::new(Arc::clone(&self.cluster), resource_version),
            Arc::new(PodHandler::new(Arc::clone(&self.pipeline))),
            self.retry_interval,
            self.board.clone(),
            self.cancel.clone(),
        );
        tasks.push(tokio::spawn(pods.run()));

        let sbom = SbomHandler::new(Arc::clone(&self.storage), Arc::clone(&self.store));
        tasks.push(self.storage_watch(ArtifactKind::Sbom, sbom));

        let filtered = FilteredSbomHandler::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.store),
            self.command_tx.clone(),
        );
        tasks.push(self.storage_watch(ArtifactKind::FilteredSbom, filtered));

        let manifests =
            VulnerabilityManifestHandler::new(Arc::clone(&self.storage), Arc::clone(&self.store));
        tasks.push(self.storage_watch(ArtifactKind::VulnerabilityManifest, manifests));

        let cleanup = CleanupTask::new(self.pipeline, self.cleanup_interval, self.cancel);
        tasks.push(tokio::spawn(cleanup.run()));

        tasks
    }

    fn storage_watch<H>(&self, kind: ArtifactKind, handler: H) -> JoinHandle<()>
    where
        H: EventHandler<StorageObject>,
    {
        let engine = ReconnectingWatch::new(
            StorageWatchSource::new(Arc::clone(&self.storage), kind),
            Arc::new(handler),
            self.retry_interval,
            self.board.clone(),
            self.cancel.clone(),
        );
        tokio::spawn(engine.run())
    }
}

/// 초기 목록이 성공할 때까지 `retry_interval` 간격으로 재시도한 뒤 감시 루프를 실행합니다.
///
/// 빈 저장소로 스토리지 구독을 열면 재생된 아티팩트가 모두 고아로 판정되므로,
/// 목록이 성공하기 전에는 어떤 구독도 열지 않습니다. 취소되면 아무것도 스폰하지 않고 끝납니다.
async fn bootstrap<C: ClusterClient, S: StorageClient>(watches: WatchSet<C, S>) {
    let mut attempts: u32 = 1;
    let resource_version = loop {
        if !sleep_or_cancel(&watches.cancel, watches.retry_interval).await {
            debug!(attempts, "initial pod inventory retry cancelled");
            return;
        }
        attempts += 1;
        match rebuild(watches.pipeline.as_ref(), RebuildMode::Merge).await {
            Ok(summary) => {
                log_inventory(&summary, watches.store.workload_count());
                break summary.resource_version;
            }
            Err(e) => warn!(error = %e, attempts, "initial pod inventory still unavailable"),
        }
    };

    for task in watches.spawn(resource_version) {
        if let Err(e) = task.await {
            warn!(error = %e, "watcher task ended abnormally");
        }
    }
}

/// 리소스 감시기 빌더
///
/// 감시기를 구성하고 필요한 채널을 생성합니다.
pub struct ResourceWatcherBuilder<C: ClusterClient, S: StorageClient> {
    config: WatcherConfig,
    cluster: Option<Arc<C>>,
    storage: Option<Arc<S>>,
    command_tx: Option<mpsc::Sender<ScanCommand>>,
    seed_images: HashMap<String, Vec<Wlid>>,
    seed_instances: Vec<String>,
}

impl<C: ClusterClient, S: StorageClient> ResourceWatcherBuilder<C, S> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: WatcherConfig::default(),
            cluster: None,
            storage: None,
            command_tx: None,
            seed_images: HashMap::new(),
            seed_instances: Vec::new(),
        }
    }

    /// 감시기 설정을 지정합니다.
    pub fn config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// 클러스터 클라이언트를 설정합니다.
    pub fn cluster_client(mut self, cluster: Arc<C>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// 스토리지 클라이언트를 설정합니다.
    pub fn storage_client(mut self, storage: Arc<S>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// 외부 스캔 명령 전송 채널을 설정합니다.
    ///
    /// 설정하지 않으면 빌더가 `command_channel_capacity` 크기의 새 채널을 생성합니다.
    pub fn command_sender(mut self, tx: mpsc::Sender<ScanCommand>) -> Self {
        self.command_tx = Some(tx);
        self
    }

    /// 초기 이미지 해시 → WLID 매핑을 주입합니다.
    pub fn seed_image_workloads(mut self, seed: HashMap<String, Vec<Wlid>>) -> Self {
        self.seed_images = seed;
        self
    }

    /// 초기 인스턴스 ID를 주입합니다.
    pub fn seed_instance_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.seed_instances = ids.into_iter().collect();
        self
    }

    /// 감시기를 빌드합니다.
    ///
    /// # Returns
    /// - `ResourceWatcher`: 감시기 인스턴스
    /// - `Option<mpsc::Receiver<ScanCommand>>`: 스캔 명령 수신 채널
    ///   (외부 command_sender를 설정한 경우 None)
    pub fn build(
        self,
    ) -> Result<(ResourceWatcher<C, S>, Option<mpsc::Receiver<ScanCommand>>), WatcherError> {
        self.config.validate()?;

        let cluster = self.cluster.ok_or_else(|| WatcherError::Config {
            field: "cluster_client".to_owned(),
            reason: "cluster client must be provided".to_owned(),
        })?;
        let storage = self.storage.ok_or_else(|| WatcherError::Config {
            field: "storage_client".to_owned(),
            reason: "storage client must be provided".to_owned(),
        })?;

        let (command_tx, command_rx) = if let Some(tx) = self.command_tx {
            (tx, None)
        } else {
            let (tx, rx) = mpsc::channel(self.config.command_channel_capacity);
            (tx, Some(rx))
        };

        let store = Arc::new(CorrelationStore::new());
        store.seed_images(self.seed_images);
        store.seed_instances(self.seed_instances);

        let pipeline = Arc::new(PodEventPipeline::new(
            Arc::clone(&cluster),
            Arc::clone(&store),
            command_tx.clone(),
            self.config.cluster_name.clone(),
            self.config.max_owner_depth,
        ));

        let watcher = ResourceWatcher {
            config: self.config,
            state: WatcherState::Initialized,
            cluster,
            storage,
            store,
            pipeline,
            command_tx,
            board: ConnectionBoard::new(),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        };

        Ok((watcher, command_rx))
    }
}

impl<C: ClusterClient, S: StorageClient> Default for ResourceWatcherBuilder<C, S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterClient;
    use crate::config::WatcherConfigBuilder;
    use crate::handlers::WLID_ANNOTATION_KEY;
    use crate::storage::MockStorageClient;
    use ironwatch_core::event::WatchEvent;
    use ironwatch_core::types::{ArtifactMeta, ContainerStatus, PodInfo, PodPhase};

    type TestWatcher = ResourceWatcher<MockClusterClient, MockStorageClient>;

    fn make_builder(
        cluster: MockClusterClient,
        storage: MockStorageClient,
    ) -> ResourceWatcherBuilder<MockClusterClient, MockStorageClient> {
        let config = WatcherConfigBuilder::new()
            .cluster_name("test")
            .retry_interval_secs(1)
            .build()
            .unwrap();
        ResourceWatcherBuilder::new()
            .config(config)
            .cluster_client(Arc::new(cluster))
            .storage_client(Arc::new(storage))
    }

    fn build(cluster: MockClusterClient, storage: MockStorageClient) -> (TestWatcher, mpsc::Receiver<ScanCommand>) {
        let (watcher, rx) = make_builder(cluster, storage).build().unwrap();
        (watcher, rx.unwrap())
    }

    fn pod(name: &str, phase: PodPhase) -> PodInfo {
        PodInfo {
            name: name.to_owned(),
            namespace: "n".to_owned(),
            api_version: "v1".to_owned(),
            phase,
            owner_references: Vec::new(),
            containers: vec!["app".to_owned()],
            container_statuses: vec![ContainerStatus {
                name: "app".to_owned(),
                image: "repo/img".to_owned(),
                image_id: "docker-pullable://repo/img@sha256:aaa".to_owned(),
                running: true,
            }],
        }
    }

    #[test]
    fn builder_creates_watcher() {
        let (watcher, _rx) = build(MockClusterClient::new(), MockStorageClient::new());
        assert_eq!(watcher.state_name(), "initialized");
        assert_eq!(watcher.config().cluster_name, "test");
        assert!(watcher.connection_states().is_empty());
    }

    #[test]
    fn builder_requires_cluster_client() {
        let result = ResourceWatcherBuilder::<MockClusterClient, MockStorageClient>::new()
            .storage_client(Arc::new(MockStorageClient::new()))
            .build();
        assert!(matches!(result, Err(WatcherError::Config { .. })));
    }

    #[test]
    fn builder_requires_storage_client() {
        let result = ResourceWatcherBuilder::<MockClusterClient, MockStorageClient>::new()
            .cluster_client(Arc::new(MockClusterClient::new()))
            .build();
        assert!(matches!(result, Err(WatcherError::Config { .. })));
    }

    #[test]
    fn external_sender_returns_no_receiver() {
        let (tx, _rx) = mpsc::channel(4);
        let (_watcher, rx) = make_builder(MockClusterClient::new(), MockStorageClient::new())
            .command_sender(tx)
            .build()
            .unwrap();
        assert!(rx.is_none());
    }

    #[test]
    fn builder_applies_seeds() {
        let mut images = HashMap::new();
        images.insert("seeded".to_owned(), vec![Wlid::from_raw("wlid://x")]);
        let (watcher, _rx) = make_builder(MockClusterClient::new(), MockStorageClient::new())
            .seed_image_workloads(images)
            .seed_instance_ids(vec!["id-1".to_owned()])
            .build()
            .unwrap();

        let store = watcher.store();
        assert!(store.contains_image("seeded"));
        assert!(store.contains_instance("id-1"));
    }

    #[tokio::test]
    async fn start_and_stop_lifecycle() {
        let (mut watcher, _rx) = build(MockClusterClient::new(), MockStorageClient::new());

        assert!(watcher.health_check().await.is_unhealthy());
        watcher.start().await.unwrap();
        assert_eq!(watcher.state_name(), "running");

        let err = watcher.start().await.unwrap_err();
        assert!(matches!(
            err,
            IronwatchError::Pipeline(PipelineError::AlreadyRunning)
        ));

        watcher.stop().await.unwrap();
        assert_eq!(watcher.state_name(), "stopped");
        assert_eq!(
            watcher.health_check().await,
            HealthStatus::Unhealthy("stopped".to_owned())
        );
        assert!(
            watcher
                .connection_states()
                .values()
                .all(|s| *s == ConnectionState::Disconnected)
        );
    }

    #[tokio::test]
    async fn stop_without_start_is_error() {
        let (mut watcher, _rx) = build(MockClusterClient::new(), MockStorageClient::new());
        let err = watcher.stop().await.unwrap_err();
        assert!(matches!(err, IronwatchError::Pipeline(PipelineError::NotRunning)));
    }

    #[tokio::test]
    async fn healthy_once_all_streams_connect() {
        let (mut watcher, _rx) = build(MockClusterClient::new(), MockStorageClient::new());
        watcher.start().await.unwrap();

        let mut status = watcher.health_check().await;
        for _ in 0..100 {
            if status.is_healthy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = watcher.health_check().await;
        }
        assert_eq!(status, HealthStatus::Healthy);
        assert_eq!(watcher.connection_states().len(), 4);

        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn degraded_while_a_stream_is_down() {
        let cluster = MockClusterClient::new().with_watch_failure("connection refused");
        let config = WatcherConfigBuilder::new()
            .retry_interval_secs(300)
            .build()
            .unwrap();
        let (mut watcher, _rx) = ResourceWatcherBuilder::new()
            .config(config)
            .cluster_client(Arc::new(cluster))
            .storage_client(Arc::new(MockStorageClient::new()))
            .build()
            .unwrap();
        watcher.start().await.unwrap();

        let mut status = watcher.health_check().await;
        for _ in 0..100 {
            if matches!(&status, HealthStatus::Degraded(reason) if reason.contains("pods")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = watcher.health_check().await;
        }
        assert!(matches!(&status, HealthStatus::Degraded(reason) if reason.contains("pods")));

        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failed_initial_listing_still_starts() {
        let cluster = MockClusterClient::new().with_failing_list();
        let (mut watcher, _rx) = build(cluster, MockStorageClient::new());

        watcher.start().await.unwrap();
        assert_eq!(watcher.state_name(), "running");
        // 목록이 성공할 때까지 모든 구독이 닫혀 있습니다.
        assert!(matches!(watcher.health_check().await, HealthStatus::Degraded(_)));
        assert_eq!(watcher.board.disconnected().len(), 4);
        watcher.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn live_image_sbom_survives_initial_listing_failure() {
        let cluster = Arc::new(
            MockClusterClient::new()
                .with_pods(vec![pod("p1", PodPhase::Running)])
                .with_failing_list(),
        );
        let storage = Arc::new(MockStorageClient::new().with_watch(
            ArtifactKind::Sbom,
            vec![WatchEvent::added(StorageObject::Sbom(ArtifactMeta {
                name: "aaa".to_owned(),
                namespace: "kubescape".to_owned(),
                ..Default::default()
            }))],
        ));
        let config = WatcherConfigBuilder::new()
            .cluster_name("test")
            .retry_interval_secs(1)
            .build()
            .unwrap();
        let (mut watcher, _rx) = ResourceWatcherBuilder::new()
            .config(config)
            .cluster_client(Arc::clone(&cluster))
            .storage_client(Arc::clone(&storage))
            .build()
            .unwrap();

        watcher.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        // 목록 실패가 이어지는 동안 스토리지 구독은 열리지 않습니다.
        assert!(cluster.list_calls() >= 3);
        assert!(storage.deleted().is_empty());
        assert_eq!(watcher.store().image_count(), 0);
        assert!(
            watcher
                .connection_states()
                .values()
                .all(|s| *s == ConnectionState::Disconnected)
        );

        cluster.set_fail_list(false);
        tokio::time::sleep(Duration::from_secs(3)).await;

        let store = watcher.store();
        assert!(store.contains_image("aaa"));
        assert_eq!(store.instance_count(), 1);
        assert!(storage.deleted().is_empty());
        assert_eq!(watcher.health_check().await, HealthStatus::Healthy);

        watcher.stop().await.unwrap();
        assert_eq!(watcher.state_name(), "stopped");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_initial_listing_retry() {
        let cluster = Arc::new(MockClusterClient::new().with_failing_list());
        let (mut watcher, _rx) = ResourceWatcherBuilder::new()
            .config(
                WatcherConfigBuilder::new()
                    .cluster_name("test")
                    .retry_interval_secs(1)
                    .build()
                    .unwrap(),
            )
            .cluster_client(Arc::clone(&cluster))
            .storage_client(Arc::new(MockStorageClient::new()))
            .build()
            .unwrap();

        watcher.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        watcher.stop().await.unwrap();

        let calls = cluster.list_calls();
        cluster.set_fail_list(false);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(cluster.list_calls(), calls);
        assert!(cluster.watch_versions().is_empty());
    }

    #[tokio::test]
    async fn initial_listing_populates_store() {
        let cluster = MockClusterClient::new().with_pods(vec![pod("p1", PodPhase::Running)]);
        let (mut watcher, mut rx) = build(cluster, MockStorageClient::new());

        watcher.start().await.unwrap();
        let store = watcher.store();
        assert!(store.contains_image("aaa"));
        assert_eq!(store.instance_count(), 1);
        watcher.stop().await.unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn pod_event_reaches_command_channel() {
        // 목록에서는 Pending이라 초기 적재에서 제외되고, 이벤트에서 Running으로 전환됩니다.
        let cluster = MockClusterClient::new()
            .with_pods(vec![pod("p1", PodPhase::Pending)])
            .with_watch(vec![WatchEvent::modified(pod("p1", PodPhase::Running))]);
        let (mut watcher, mut rx) = build(cluster, MockStorageClient::new());
        watcher.start().await.unwrap();

        let command = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            command.wlid,
            Wlid::new("test", "n", "Pod", "p1")
        );
        assert_eq!(command.containers["app"], "repo/img@sha256:aaa");

        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn orphaned_sbom_is_deleted_after_start() {
        let storage = Arc::new(MockStorageClient::new().with_watch(
            ArtifactKind::Sbom,
            vec![
                WatchEvent::added(StorageObject::Sbom(ArtifactMeta {
                    name: "aaa".to_owned(),
                    namespace: "kubescape".to_owned(),
                    ..Default::default()
                })),
                WatchEvent::added(StorageObject::Sbom(ArtifactMeta {
                    name: "zzz".to_owned(),
                    namespace: "kubescape".to_owned(),
                    ..Default::default()
                })),
            ],
        ));
        let cluster = MockClusterClient::new().with_pods(vec![pod("p1", PodPhase::Running)]);
        let (mut watcher, _rx) = ResourceWatcherBuilder::new()
            .cluster_client(Arc::new(cluster))
            .storage_client(Arc::clone(&storage))
            .build()
            .unwrap();
        watcher.start().await.unwrap();

        for _ in 0..100 {
            if !storage.deleted().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            storage.deleted(),
            vec![(ArtifactKind::Sbom, "kubescape".to_owned(), "zzz".to_owned())]
        );

        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn filtered_sbom_triggers_rescan_of_known_workload() {
        let cluster = MockClusterClient::new().with_pods(vec![pod("p1", PodPhase::Running)]);
        let instance_id = crate::instance_id::hashed_instance_ids(&pod("p1", PodPhase::Running))
            .unwrap()
            .remove(0);
        let wlid = Wlid::new("test", "n", "Pod", "p1");
        let mut annotations = std::collections::BTreeMap::new();
        annotations.insert(WLID_ANNOTATION_KEY.to_owned(), wlid.to_string());
        let storage = MockStorageClient::new().with_watch(
            ArtifactKind::FilteredSbom,
            vec![WatchEvent::modified(StorageObject::FilteredSbom(ArtifactMeta {
                name: instance_id,
                namespace: "kubescape".to_owned(),
                annotations,
            }))],
        );

        let (mut watcher, mut rx) = build(cluster, storage);
        watcher.start().await.unwrap();

        let command = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(command.wlid, wlid);
        assert_eq!(command.containers["app"], "repo/img@sha256:aaa");

        watcher.stop().await.unwrap();
    }
}
