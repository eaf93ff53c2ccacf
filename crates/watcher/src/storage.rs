//! 스토리지 API 추상화
//!
//! [`StorageClient`] trait은 SBOM, 필터링된 SBOM, 취약점 매니페스트 커스텀 객체의
//! 목록 조회, 구독, 이름 기반 삭제를 추상화합니다. 이 엔진은 객체를 생성하지 않습니다.
//!
//! 구독 경계에서 각 객체는 종류별로 태깅된 [`StorageObject`]로 변환되므로
//! 핸들러는 동적 타입 검사 없이 variant만 확인합니다.

use std::future::Future;

use futures::StreamExt;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, WatchParams,
};

use ironwatch_core::types::{ArtifactKind, ArtifactMeta, StorageObject, VulnerabilityManifest};

use crate::cluster::convert_watch_event;
use crate::error::WatcherError;
use crate::watch::EventStream;

/// 스토리지 API trait
pub trait StorageClient: Send + Sync + 'static {
    /// 종류의 전체 객체를 조회합니다.
    ///
    /// 스토리지 API 계약의 일부입니다. 감시기 자체는 구독 재생(`watch`)으로
    /// 기존 객체를 받으므로 호출하지 않고, 운영 도구와 테스트가 사용합니다.
    fn list(
        &self,
        kind: ArtifactKind,
    ) -> impl Future<Output = Result<Vec<StorageObject>, WatcherError>> + Send;

    /// 종류의 전체 네임스페이스 객체를 구독합니다.
    fn watch(
        &self,
        kind: ArtifactKind,
    ) -> impl Future<Output = Result<EventStream<StorageObject>, WatcherError>> + Send;

    /// 이름으로 객체를 삭제합니다. 이미 없으면 [`WatcherError::NotFound`].
    fn delete(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), WatcherError>> + Send;
}

/// 종류별 CRD kind/plural 이름
fn resource_names(kind: ArtifactKind) -> (&'static str, &'static str) {
    match kind {
        ArtifactKind::Sbom => ("SBOMSPDXv2p3", "sbomspdxv2p3s"),
        ArtifactKind::FilteredSbom => ("SBOMSPDXv2p3Filtered", "sbomspdxv2p3filtereds"),
        ArtifactKind::VulnerabilityManifest => {
            ("VulnerabilityManifest", "vulnerabilitymanifests")
        }
    }
}

/// `kube` 기반 운영 클라이언트 (`DynamicObject` 사용)
#[derive(Clone)]
pub struct KubeStorageClient {
    client: kube::Client,
    group: String,
    version: String,
}

impl KubeStorageClient {
    /// 이미 구성된 `kube::Client`와 스토리지 API 그룹/버전으로 생성합니다.
    pub fn new(client: kube::Client, group: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            client,
            group: group.into(),
            version: version.into(),
        }
    }

    fn resource(&self, kind: ArtifactKind) -> ApiResource {
        let (kind_name, plural) = resource_names(kind);
        let gvk = GroupVersionKind::gvk(&self.group, &self.version, kind_name);
        ApiResource::from_gvk_with_plural(&gvk, plural)
    }
}

impl StorageClient for KubeStorageClient {
    async fn list(&self, kind: ArtifactKind) -> Result<Vec<StorageObject>, WatcherError> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &self.resource(kind));
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| WatcherError::Storage(format!("list {kind} failed: {e}")))?;
        Ok(list.items.iter().map(|obj| storage_object(kind, obj)).collect())
    }

    async fn watch(&self, kind: ArtifactKind) -> Result<EventStream<StorageObject>, WatcherError> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &self.resource(kind));
        let stream = api
            .watch(&WatchParams::default(), "0")
            .await
            .map_err(|e| WatcherError::Storage(format!("watch {kind} failed: {e}")))?;

        Ok(stream
            .filter_map(move |item| {
                futures::future::ready(convert_watch_event(
                    item,
                    |obj: &DynamicObject| storage_object(kind, obj),
                    WatcherError::Storage,
                ))
            })
            .boxed())
    }

    async fn delete(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), WatcherError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.resource(kind));
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(status)) if status.code == 404 => Err(WatcherError::NotFound(
                format!("{kind} {namespace}/{name}"),
            )),
            Err(e) => Err(WatcherError::Storage(format!(
                "delete {kind} {namespace}/{name} failed: {e}"
            ))),
        }
    }
}

/// `DynamicObject` → 종류별 [`StorageObject`]
pub fn storage_object(kind: ArtifactKind, obj: &DynamicObject) -> StorageObject {
    let meta = ArtifactMeta {
        name: obj.metadata.name.clone().unwrap_or_default(),
        namespace: obj.metadata.namespace.clone().unwrap_or_default(),
        annotations: obj.metadata.annotations.clone().unwrap_or_default(),
    };

    match kind {
        ArtifactKind::Sbom => StorageObject::Sbom(meta),
        ArtifactKind::FilteredSbom => StorageObject::FilteredSbom(meta),
        ArtifactKind::VulnerabilityManifest => {
            StorageObject::VulnerabilityManifest(VulnerabilityManifest {
                meta,
                with_relevancy: obj.data["spec"]["metadata"]["withRelevancy"]
                    .as_bool()
                    .unwrap_or(false),
            })
        }
    }
}

/// 테스트용 Mock 스토리지 클라이언트
///
/// 삭제 요청을 기록하고, 종류별 구독 스크립트를 순서대로 돌려줍니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockStorageClient {
    objects: std::sync::Mutex<Vec<StorageObject>>,
    watch_scripts: std::sync::Mutex<
        std::collections::HashMap<
            ArtifactKind,
            std::collections::VecDeque<Vec<ironwatch_core::event::WatchEvent<StorageObject>>>,
        >,
    >,
    deleted: std::sync::Mutex<Vec<(ArtifactKind, String, String)>>,
    fail_deletes: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MockStorageClient {
    /// 빈 스토리지로 mock 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 목록 조회가 돌려줄 객체를 설정합니다.
    pub fn with_objects(self, objects: Vec<StorageObject>) -> Self {
        *self.objects.lock().unwrap() = objects;
        self
    }

    /// 종류의 다음 구독이 내보낼 이벤트를 추가합니다.
    pub fn with_watch(
        self,
        kind: ArtifactKind,
        events: Vec<ironwatch_core::event::WatchEvent<StorageObject>>,
    ) -> Self {
        self.watch_scripts
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(events);
        self
    }

    /// 삭제가 실패하도록 설정합니다.
    pub fn with_failing_deletes(self) -> Self {
        self.fail_deletes
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// 지금까지의 삭제 요청 (종류, 네임스페이스, 이름)
    pub fn deleted(&self) -> Vec<(ArtifactKind, String, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl StorageClient for MockStorageClient {
    async fn list(&self, kind: ArtifactKind) -> Result<Vec<StorageObject>, WatcherError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.kind() == kind)
            .cloned()
            .collect())
    }

    async fn watch(&self, kind: ArtifactKind) -> Result<EventStream<StorageObject>, WatcherError> {
        let next = self
            .watch_scripts
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(|scripts| scripts.pop_front());
        match next {
            Some(events) => Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }

    async fn delete(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), WatcherError> {
        if self.fail_deletes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(WatcherError::Storage("delete rejected".to_owned()));
        }
        self.deleted
            .lock()
            .unwrap()
            .push((kind, namespace.to_owned(), name.to_owned()));
        Ok(())
    }
}
