//! 스토리지 아티팩트 종류별 이벤트 핸들러
//!
//! - [`SbomHandler`]: 이름(이미지 해시)이 이미지 인덱스에 없으면 삭제
//! - [`VulnerabilityManifestHandler`]: relevancy 추적이면 인스턴스 ID, 아니면 이미지 해시로 판정
//! - [`FilteredSbomHandler`]: 이름(인스턴스 ID)이 없으면 삭제, 있으면 워크로드 스캔 명령 전송
//!
//! 세 핸들러 모두 Deleted 이벤트는 무시하고, 종류가 맞지 않는 객체는 에러로 돌려줍니다.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use ironwatch_core::event::{ScanCommand, WatchEvent};
use ironwatch_core::metrics as m;
use ironwatch_core::types::{ArtifactKind, ArtifactMeta, StorageObject, Wlid};

use crate::error::WatcherError;
use crate::storage::StorageClient;
use crate::store::CorrelationStore;
use crate::watch::{EventHandler, EventStream, WatchSource};

/// 필터링된 SBOM이 대상 워크로드를 가리키는 어노테이션
pub const WLID_ANNOTATION_KEY: &str = "kubescape.io/wlid";

/// 스캔 명령 출처 레이블
const SOURCE_FILTERED_SBOM: &str = "filtered_sbom";

fn unsupported(expected: ArtifactKind, found: &StorageObject) -> WatcherError {
    WatcherError::UnsupportedObject {
        expected: expected.to_string(),
        found: found.kind().to_string(),
    }
}

/// 고아 아티팩트를 삭제합니다. 이미 삭제된 경우는 성공으로 취급합니다.
async fn delete_orphan<S: StorageClient>(
    storage: &S,
    kind: ArtifactKind,
    meta: &ArtifactMeta,
) -> Result<(), WatcherError> {
    match storage.delete(kind, &meta.namespace, &meta.name).await {
        Ok(()) => {
            metrics::counter!(m::WATCHER_ORPHANS_DELETED_TOTAL, m::LABEL_KIND => kind.label())
                .increment(1);
            info!(kind = %kind, namespace = %meta.namespace, name = %meta.name, "deleted orphaned artifact");
            Ok(())
        }
        Err(WatcherError::NotFound(_)) => {
            debug!(kind = %kind, name = %meta.name, "orphaned artifact already gone");
            Ok(())
        }
        Err(e) => {
            metrics::counter!(m::WATCHER_ORPHAN_DELETE_FAILURES_TOTAL, m::LABEL_KIND => kind.label())
                .increment(1);
            Err(e)
        }
    }
}

/// SBOM 핸들러
pub struct SbomHandler<S> {
    storage: Arc<S>,
    store: Arc<CorrelationStore>,
}

impl<S> SbomHandler<S> {
    pub fn new(storage: Arc<S>, store: Arc<CorrelationStore>) -> Self {
        Self { storage, store }
    }
}

impl<S: StorageClient> EventHandler<StorageObject> for SbomHandler<S> {
    async fn handle(&self, event: WatchEvent<StorageObject>) -> Result<(), WatcherError> {
        let StorageObject::Sbom(meta) = &event.object else {
            return Err(unsupported(ArtifactKind::Sbom, &event.object));
        };
        if event.is_deleted() {
            return Ok(());
        }
        if self.store.contains_image(&meta.name) {
            return Ok(());
        }
        delete_orphan(self.storage.as_ref(), ArtifactKind::Sbom, meta).await
    }
}

/// 취약점 매니페스트 핸들러
pub struct VulnerabilityManifestHandler<S> {
    storage: Arc<S>,
    store: Arc<CorrelationStore>,
}

impl<S> VulnerabilityManifestHandler<S> {
    pub fn new(storage: Arc<S>, store: Arc<CorrelationStore>) -> Self {
        Self { storage, store }
    }
}

impl<S: StorageClient> EventHandler<StorageObject> for VulnerabilityManifestHandler<S> {
    async fn handle(&self, event: WatchEvent<StorageObject>) -> Result<(), WatcherError> {
        let StorageObject::VulnerabilityManifest(manifest) = &event.object else {
            return Err(unsupported(ArtifactKind::VulnerabilityManifest, &event.object));
        };
        if event.is_deleted() {
            return Ok(());
        }

        let name = &manifest.meta.name;
        let live = if manifest.with_relevancy {
            self.store.contains_instance(name)
        } else {
            self.store.contains_image(name)
        };
        if live {
            return Ok(());
        }
        delete_orphan(
            self.storage.as_ref(),
            ArtifactKind::VulnerabilityManifest,
            &manifest.meta,
        )
        .await
    }
}

/// 필터링된 SBOM 핸들러
pub struct FilteredSbomHandler<S> {
    storage: Arc<S>,
    store: Arc<CorrelationStore>,
    commands: mpsc::Sender<ScanCommand>,
}

impl<S> FilteredSbomHandler<S> {
    pub fn new(
        storage: Arc<S>,
        store: Arc<CorrelationStore>,
        commands: mpsc::Sender<ScanCommand>,
    ) -> Self {
        Self {
            storage,
            store,
            commands,
        }
    }
}

impl<S: StorageClient> EventHandler<StorageObject> for FilteredSbomHandler<S> {
    async fn handle(&self, event: WatchEvent<StorageObject>) -> Result<(), WatcherError> {
        let StorageObject::FilteredSbom(meta) = &event.object else {
            return Err(unsupported(ArtifactKind::FilteredSbom, &event.object));
        };
        if event.is_deleted() {
            return Ok(());
        }

        if !self.store.contains_instance(&meta.name) {
            return delete_orphan(self.storage.as_ref(), ArtifactKind::FilteredSbom, meta).await;
        }

        let wlid = meta
            .annotations
            .get(WLID_ANNOTATION_KEY)
            .map(Wlid::from_raw)
            .ok_or_else(|| WatcherError::MissingAnnotation {
                kind: ArtifactKind::FilteredSbom.to_string(),
                name: meta.name.clone(),
                key: WLID_ANNOTATION_KEY.to_owned(),
            })?;

        let containers = self.store.lookup_containers(&wlid);
        let command = ScanCommand::new(wlid, containers);
        let wlid_str = command.wlid.to_string();
        let container_count = command.containers.len();
        self.commands
            .send(command)
            .await
            .map_err(|_| WatcherError::Channel("scan command receiver dropped".to_owned()))?;
        metrics::counter!(m::WATCHER_SCAN_COMMANDS_TOTAL, m::LABEL_SOURCE => SOURCE_FILTERED_SBOM)
            .increment(1);
        info!(wlid = %wlid_str, containers = container_count, "scan command emitted for filtered sbom");
        Ok(())
    }
}

/// 스토리지 종류별 구독 원천
pub struct StorageWatchSource<S> {
    storage: Arc<S>,
    kind: ArtifactKind,
}

impl<S> StorageWatchSource<S> {
    pub fn new(storage: Arc<S>, kind: ArtifactKind) -> Self {
        Self { storage, kind }
    }
}

impl<S: StorageClient> WatchSource for StorageWatchSource<S> {
    type Object = StorageObject;

    fn kind(&self) -> &'static str {
        self.kind.label()
    }

    async fn subscribe(&self) -> Result<EventStream<StorageObject>, WatcherError> {
        self.storage.watch(self.kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockStorageClient;
    use ironwatch_core::types::VulnerabilityManifest;
    use std::collections::BTreeMap;

    fn meta(name: &str) -> ArtifactMeta {
        ArtifactMeta {
            name: name.to_owned(),
            namespace: "kubescape".to_owned(),
            annotations: BTreeMap::new(),
        }
    }

    fn manifest(name: &str, with_relevancy: bool) -> StorageObject {
        StorageObject::VulnerabilityManifest(VulnerabilityManifest {
            meta: meta(name),
            with_relevancy,
        })
    }

    fn fixture() -> (Arc<MockStorageClient>, Arc<CorrelationStore>) {
        (
            Arc::new(MockStorageClient::new()),
            Arc::new(CorrelationStore::new()),
        )
    }

    #[tokio::test]
    async fn sbom_for_unknown_image_is_deleted_once() {
        let (storage, store) = fixture();
        let handler = SbomHandler::new(Arc::clone(&storage), store);

        handler
            .handle(WatchEvent::added(StorageObject::Sbom(meta("aaa"))))
            .await
            .unwrap();
        assert_eq!(
            storage.deleted(),
            vec![(ArtifactKind::Sbom, "kubescape".to_owned(), "aaa".to_owned())]
        );
    }

    #[tokio::test]
    async fn sbom_for_known_image_is_kept() {
        let (storage, store) = fixture();
        store.add_image_workload("aaa", Wlid::from_raw("wlid://x"));
        let handler = SbomHandler::new(Arc::clone(&storage), store);

        handler
            .handle(WatchEvent::modified(StorageObject::Sbom(meta("aaa"))))
            .await
            .unwrap();
        assert!(storage.deleted().is_empty());
    }

    #[tokio::test]
    async fn deleted_events_are_ignored() {
        let (storage, store) = fixture();
        let handler = SbomHandler::new(Arc::clone(&storage), store);

        handler
            .handle(WatchEvent::deleted(StorageObject::Sbom(meta("aaa"))))
            .await
            .unwrap();
        assert!(storage.deleted().is_empty());
    }

    #[tokio::test]
    async fn mismatched_object_is_unsupported() {
        let (storage, store) = fixture();
        let handler = SbomHandler::new(Arc::clone(&storage), store);

        let err = handler
            .handle(WatchEvent::added(StorageObject::FilteredSbom(meta("aaa"))))
            .await
            .unwrap_err();
        assert!(matches!(err, WatcherError::UnsupportedObject { .. }));
        assert!(storage.deleted().is_empty());
    }

    #[tokio::test]
    async fn manifest_handler_rejects_sbom_payload() {
        let (storage, store) = fixture();
        let handler = VulnerabilityManifestHandler::new(Arc::clone(&storage), store);

        let err = handler
            .handle(WatchEvent::added(StorageObject::Sbom(meta("aaa"))))
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            WatcherError::UnsupportedObject { expected, found }
                if expected == "vulnerability_manifest" && found == "sbom"
        ));
        assert!(storage.deleted().is_empty());
    }

    #[tokio::test]
    async fn filtered_sbom_handler_rejects_manifest_payload() {
        let (storage, store) = fixture();
        let wlid = Wlid::new("test", "n", "Deployment", "D");
        store.add_instance("inst-1");
        store.add_container_mapping(wlid, "app", "repo/img@sha256:aaa");
        let (tx, mut rx) = mpsc::channel(4);
        let handler = FilteredSbomHandler::new(Arc::clone(&storage), store, tx);

        let err = handler
            .handle(WatchEvent::modified(manifest("inst-1", true)))
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            WatcherError::UnsupportedObject { expected, found }
                if expected == "filtered_sbom" && found == "vulnerability_manifest"
        ));
        assert!(storage.deleted().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delete_failure_is_reported() {
        let storage = Arc::new(MockStorageClient::new().with_failing_deletes());
        let handler = SbomHandler::new(storage, Arc::new(CorrelationStore::new()));

        let err = handler
            .handle(WatchEvent::added(StorageObject::Sbom(meta("aaa"))))
            .await
            .unwrap_err();
        assert!(matches!(err, WatcherError::Storage(_)));
    }

    #[tokio::test]
    async fn relevancy_manifest_checks_instance_ids() {
        let (storage, store) = fixture();
        store.add_instance("inst-1");
        store.add_image_workload("img-1", Wlid::from_raw("wlid://x"));
        let handler = VulnerabilityManifestHandler::new(Arc::clone(&storage), store);

        handler
            .handle(WatchEvent::added(manifest("inst-1", true)))
            .await
            .unwrap();
        handler
            .handle(WatchEvent::added(manifest("img-1", true)))
            .await
            .unwrap();

        assert_eq!(storage.deleted().len(), 1);
        assert_eq!(storage.deleted()[0].2, "img-1");
    }

    #[tokio::test]
    async fn plain_manifest_checks_image_hashes() {
        let (storage, store) = fixture();
        store.add_image_workload("img-1", Wlid::from_raw("wlid://x"));
        let handler = VulnerabilityManifestHandler::new(Arc::clone(&storage), store);

        handler
            .handle(WatchEvent::modified(manifest("img-1", false)))
            .await
            .unwrap();
        handler
            .handle(WatchEvent::modified(manifest("img-2", false)))
            .await
            .unwrap();

        assert_eq!(
            storage.deleted(),
            vec![(
                ArtifactKind::VulnerabilityManifest,
                "kubescape".to_owned(),
                "img-2".to_owned()
            )]
        );
    }

    #[tokio::test]
    async fn filtered_sbom_for_dead_instance_is_deleted() {
        let (storage, store) = fixture();
        let (tx, mut rx) = mpsc::channel(4);
        let handler = FilteredSbomHandler::new(Arc::clone(&storage), store, tx);

        handler
            .handle(WatchEvent::added(StorageObject::FilteredSbom(meta("inst-1"))))
            .await
            .unwrap();
        assert_eq!(storage.deleted().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn filtered_sbom_for_live_instance_emits_scan_command() {
        let (storage, store) = fixture();
        let wlid = Wlid::new("test", "n", "Deployment", "D");
        store.add_instance("inst-1");
        store.add_container_mapping(wlid.clone(), "app", "repo/img@sha256:aaa");
        let (tx, mut rx) = mpsc::channel(4);
        let handler = FilteredSbomHandler::new(Arc::clone(&storage), store, tx);

        let mut artifact = meta("inst-1");
        artifact
            .annotations
            .insert(WLID_ANNOTATION_KEY.to_owned(), wlid.to_string());
        handler
            .handle(WatchEvent::added(StorageObject::FilteredSbom(artifact)))
            .await
            .unwrap();

        let command = rx.try_recv().unwrap();
        assert_eq!(command.wlid, wlid);
        assert_eq!(command.containers["app"], "repo/img@sha256:aaa");
        assert!(rx.try_recv().is_err());
        assert!(storage.deleted().is_empty());
    }

    #[tokio::test]
    async fn filtered_sbom_without_annotation_is_skipped() {
        let (storage, store) = fixture();
        store.add_instance("inst-1");
        let (tx, mut rx) = mpsc::channel(4);
        let handler = FilteredSbomHandler::new(Arc::clone(&storage), store, tx);

        let err = handler
            .handle(WatchEvent::modified(StorageObject::FilteredSbom(meta("inst-1"))))
            .await
            .unwrap_err();
        assert!(matches!(err, WatcherError::MissingAnnotation { .. }));
        assert!(rx.try_recv().is_err());
        assert!(storage.deleted().is_empty());
    }

    #[tokio::test]
    async fn storage_source_uses_kind_label() {
        let storage = Arc::new(MockStorageClient::new().with_watch(
            ArtifactKind::Sbom,
            vec![WatchEvent::added(StorageObject::Sbom(meta("aaa")))],
        ));
        let source = StorageWatchSource::new(storage, ArtifactKind::Sbom);
        assert_eq!(source.kind(), "sbom");

        use futures::StreamExt;
        let mut stream = source.subscribe().await.unwrap();
        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.object.meta().name, "aaa");
    }
}
