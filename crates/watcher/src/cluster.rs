//! 클러스터 API 추상화
//!
//! [`ClusterClient`] trait은 파드 목록/단건 조회/구독과 소유자 워크로드 조회를 추상화합니다.
//! 운영 코드는 [`KubeClusterClient`]를, 테스트는 `MockClusterClient`를 사용합니다.
//!
//! 와이어 객체(`k8s_openapi` Pod, `DynamicObject`)는 이 모듈 경계에서
//! core 도메인 타입([`PodInfo`], [`WorkloadRef`])으로 변환됩니다.

use std::future::Future;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference as KubeOwnerReference;
use kube::api::{
    Api, ApiResource, DynamicObject, GroupVersionKind, ListParams, WatchEvent as KubeWatchEvent,
    WatchParams,
};

use ironwatch_core::event::WatchEvent;
use ironwatch_core::types::{ContainerStatus, OwnerReference, PodInfo, PodPhase, WorkloadRef};

use crate::error::WatcherError;
use crate::watch::EventStream;

/// 파드 목록 조회 결과
#[derive(Debug, Clone, Default)]
pub struct PodListing {
    /// 조회된 파드
    pub pods: Vec<PodInfo>,
    /// 이어서 구독할 때 사용할 resourceVersion
    pub resource_version: String,
}

/// 클러스터 API trait
///
/// `Send + Sync + 'static`이므로 여러 태스크가 `Arc`로 공유합니다.
pub trait ClusterClient: Send + Sync + 'static {
    /// 파드 목록을 조회합니다. `namespace`가 `None`이면 전체 네임스페이스.
    fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> impl Future<Output = Result<PodListing, WatcherError>> + Send;

    /// 파드를 단건 조회합니다. 없으면 `None`.
    fn get_pod(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<PodInfo>, WatcherError>> + Send;

    /// `resource_version`부터 전체 네임스페이스 파드를 구독합니다.
    fn watch_pods(
        &self,
        resource_version: &str,
    ) -> impl Future<Output = Result<EventStream<PodInfo>, WatcherError>> + Send;

    /// 소유자 참조가 가리키는 워크로드를 조회합니다. 없으면 `None`.
    fn get_workload(
        &self,
        namespace: &str,
        owner: &OwnerReference,
    ) -> impl Future<Output = Result<Option<WorkloadRef>, WatcherError>> + Send;
}

/// `kube` 기반 운영 클라이언트
#[derive(Clone)]
pub struct KubeClusterClient {
    client: kube::Client,
}

impl KubeClusterClient {
    /// 이미 구성된 `kube::Client`로 생성합니다.
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: Option<&str>) -> Api<Pod> {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

impl ClusterClient for KubeClusterClient {
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<PodListing, WatcherError> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }

        let list = self
            .pods(namespace)
            .list(&params)
            .await
            .map_err(|e| WatcherError::Cluster(format!("list pods failed: {e}")))?;

        Ok(PodListing {
            resource_version: list.metadata.resource_version.clone().unwrap_or_default(),
            pods: list.items.iter().map(pod_info).collect(),
        })
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodInfo>, WatcherError> {
        let pod = self
            .pods(Some(namespace))
            .get_opt(name)
            .await
            .map_err(|e| WatcherError::Cluster(format!("get pod {namespace}/{name} failed: {e}")))?;
        Ok(pod.as_ref().map(pod_info))
    }

    async fn watch_pods(&self, resource_version: &str) -> Result<EventStream<PodInfo>, WatcherError> {
        let stream = self
            .pods(None)
            .watch(&WatchParams::default(), resource_version)
            .await
            .map_err(|e| WatcherError::Cluster(format!("watch pods failed: {e}")))?;

        Ok(stream
            .filter_map(|item| {
                futures::future::ready(convert_watch_event(item, pod_info, WatcherError::Cluster))
            })
            .boxed())
    }

    async fn get_workload(
        &self,
        namespace: &str,
        owner: &OwnerReference,
    ) -> Result<Option<WorkloadRef>, WatcherError> {
        let (group, version) = split_api_version(&owner.api_version);
        let gvk = GroupVersionKind::gvk(group, version, &owner.kind);
        let resource = ApiResource::from_gvk_with_plural(&gvk, &plural(&owner.kind));
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);

        let object = api.get_opt(&owner.name).await.map_err(|e| {
            WatcherError::Cluster(format!(
                "get {} {namespace}/{} failed: {e}",
                owner.kind, owner.name
            ))
        })?;

        Ok(object.map(|obj| WorkloadRef {
            api_version: owner.api_version.clone(),
            kind: owner.kind.clone(),
            name: owner.name.clone(),
            namespace: namespace.to_owned(),
            owner_references: owner_references(obj.metadata.owner_references.as_deref()),
        }))
    }
}

/// kube 감시 이벤트를 도메인 이벤트로 변환합니다. Bookmark는 건너뜁니다.
pub(crate) fn convert_watch_event<K, T>(
    item: Result<KubeWatchEvent<K>, kube::Error>,
    convert: impl Fn(&K) -> T,
    api_error: fn(String) -> WatcherError,
) -> Option<Result<WatchEvent<T>, WatcherError>> {
    match item {
        Ok(KubeWatchEvent::Added(obj)) => Some(Ok(WatchEvent::added(convert(&obj)))),
        Ok(KubeWatchEvent::Modified(obj)) => Some(Ok(WatchEvent::modified(convert(&obj)))),
        Ok(KubeWatchEvent::Deleted(obj)) => Some(Ok(WatchEvent::deleted(convert(&obj)))),
        Ok(KubeWatchEvent::Bookmark(_)) => None,
        Ok(KubeWatchEvent::Error(status)) => Some(Err(api_error(format!(
            "watch error {}: {}",
            status.code, status.message
        )))),
        Err(e) => Some(Err(api_error(format!("watch stream failed: {e}")))),
    }
}

/// `apps/v1` → (`apps`, `v1`), `v1` → (``, `v1`)
pub(crate) fn split_api_version(api_version: &str) -> (&str, &str) {
    api_version.split_once('/').unwrap_or(("", api_version))
}

/// 소문자 복수형 리소스 이름 (`NetworkPolicy` → `networkpolicies`, `Ingress` → `ingresses`)
pub(crate) fn plural(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with("endpoints") {
        return lower;
    }
    match lower.strip_suffix('y') {
        Some(stem) if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) => {
            return format!("{stem}ies");
        }
        _ => {}
    }
    if lower.ends_with(['s', 'x', 'z']) || lower.ends_with("ch") || lower.ends_with("sh") {
        return format!("{lower}es");
    }
    format!("{lower}s")
}

fn owner_references(refs: Option<&[KubeOwnerReference]>) -> Vec<OwnerReference> {
    refs.unwrap_or_default()
        .iter()
        .map(|r| OwnerReference {
            api_version: r.api_version.clone(),
            kind: r.kind.clone(),
            name: r.name.clone(),
            controller: r.controller.unwrap_or(false),
        })
        .collect()
}

/// k8s Pod → [`PodInfo`]
pub fn pod_info(pod: &Pod) -> PodInfo {
    let meta = &pod.metadata;
    let status = pod.status.as_ref();

    PodInfo {
        name: meta.name.clone().unwrap_or_default(),
        namespace: meta.namespace.clone().unwrap_or_default(),
        api_version: "v1".to_owned(),
        phase: status
            .and_then(|s| s.phase.as_deref())
            .map(PodPhase::parse)
            .unwrap_or_default(),
        owner_references: owner_references(meta.owner_references.as_deref()),
        containers: pod
            .spec
            .as_ref()
            .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default(),
        container_statuses: status
            .and_then(|s| s.container_statuses.as_ref())
            .map(|statuses| {
                statuses
                    .iter()
                    .map(|c| ContainerStatus {
                        name: c.name.clone(),
                        image: c.image.clone(),
                        image_id: c.image_id.clone(),
                        running: c.state.as_ref().is_some_and(|s| s.running.is_some()),
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// 테스트용 Mock 클러스터 클라이언트
///
/// 파드 목록, 소유자 워크로드, 구독 스크립트를 미리 설정해 두고 사용합니다.
/// 구독 스크립트가 떨어지면 열린 채로 아무 이벤트도 내보내지 않습니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockClusterClient {
    pods: std::sync::Mutex<Vec<PodInfo>>,
    resource_version: std::sync::Mutex<String>,
    workloads: std::sync::Mutex<std::collections::HashMap<(String, String, String), WorkloadRef>>,
    watch_scripts: std::sync::Mutex<
        std::collections::VecDeque<Result<Vec<Result<WatchEvent<PodInfo>, WatcherError>>, String>>,
    >,
    watch_versions: std::sync::Mutex<Vec<String>>,
    fail_list: std::sync::atomic::AtomicBool,
    fail_get_pod: std::sync::atomic::AtomicBool,
    list_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockClusterClient {
    /// 빈 클러스터로 mock 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self {
            resource_version: std::sync::Mutex::new("1".to_owned()),
            ..Self::default()
        }
    }

    /// 목록/단건 조회에 사용할 파드를 설정합니다.
    pub fn with_pods(self, pods: Vec<PodInfo>) -> Self {
        self.set_pods(pods);
        self
    }

    /// 소유자 조회 결과로 돌려줄 워크로드를 추가합니다.
    pub fn with_workload(self, workload: WorkloadRef) -> Self {
        self.workloads.lock().unwrap().insert(
            (
                workload.namespace.clone(),
                workload.kind.clone(),
                workload.name.clone(),
            ),
            workload,
        );
        self
    }

    /// 다음 구독이 내보낼 이벤트 목록을 추가합니다. 목록이 끝나면 스트림이 닫힙니다.
    pub fn with_watch(self, events: Vec<WatchEvent<PodInfo>>) -> Self {
        self.watch_scripts
            .lock()
            .unwrap()
            .push_back(Ok(events.into_iter().map(Ok).collect()));
        self
    }

    /// 다음 구독이 실패하도록 설정합니다.
    pub fn with_watch_failure(self, msg: &str) -> Self {
        self.watch_scripts.lock().unwrap().push_back(Err(msg.to_owned()));
        self
    }

    /// 목록 조회가 실패하도록 설정합니다.
    pub fn with_failing_list(self) -> Self {
        self.set_fail_list(true);
        self
    }

    /// 단건 조회가 실패하도록 설정합니다.
    pub fn with_failing_get_pod(self) -> Self {
        self.fail_get_pod
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// 파드 목록을 교체합니다.
    pub fn set_pods(&self, pods: Vec<PodInfo>) {
        *self.pods.lock().unwrap() = pods;
    }

    /// 목록 조회 실패 여부를 바꿉니다.
    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// 목록 조회가 돌려줄 resourceVersion을 설정합니다.
    pub fn set_resource_version(&self, version: &str) {
        *self.resource_version.lock().unwrap() = version.to_owned();
    }

    /// 지금까지의 목록 조회 횟수
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// 구독 요청에 사용된 resourceVersion 목록
    pub fn watch_versions(&self) -> Vec<String> {
        self.watch_versions.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl ClusterClient for MockClusterClient {
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        _label_selector: Option<&str>,
    ) -> Result<PodListing, WatcherError> {
        self.list_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_list.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(WatcherError::Cluster("list pods failed".to_owned()));
        }
        let pods = self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|p| namespace.is_none_or(|ns| p.namespace == ns))
            .cloned()
            .collect();
        Ok(PodListing {
            pods,
            resource_version: self.resource_version.lock().unwrap().clone(),
        })
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodInfo>, WatcherError> {
        if self.fail_get_pod.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(WatcherError::Cluster("get pod failed".to_owned()));
        }
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.namespace == namespace && p.name == name)
            .cloned())
    }

    async fn watch_pods(&self, resource_version: &str) -> Result<EventStream<PodInfo>, WatcherError> {
        self.watch_versions
            .lock()
            .unwrap()
            .push(resource_version.to_owned());
        let next = self.watch_scripts.lock().unwrap().pop_front();
        match next {
            Some(Ok(events)) => Ok(futures::stream::iter(events).boxed()),
            Some(Err(msg)) => Err(WatcherError::Cluster(msg)),
            None => Ok(futures::stream::pending().boxed()),
        }
    }

    async fn get_workload(
        &self,
        namespace: &str,
        owner: &OwnerReference,
    ) -> Result<Option<WorkloadRef>, WatcherError> {
        Ok(self
            .workloads
            .lock()
            .unwrap()
            .get(&(
                namespace.to_owned(),
                owner.kind.clone(),
                owner.name.clone(),
            ))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        Container, ContainerState, ContainerStateRunning, ContainerStatus as KubeContainerStatus,
        PodSpec, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn kube_pod() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web-7d9f-abcde".to_owned()),
                namespace: Some("default".to_owned()),
                owner_references: Some(vec![KubeOwnerReference {
                    api_version: "apps/v1".to_owned(),
                    kind: "ReplicaSet".to_owned(),
                    name: "web-7d9f".to_owned(),
                    uid: "uid-1".to_owned(),
                    controller: Some(true),
                    block_owner_deletion: None,
                }]),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "app".to_owned(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_owned()),
                container_statuses: Some(vec![KubeContainerStatus {
                    name: "app".to_owned(),
                    image: "repo/img:1".to_owned(),
                    image_id: "docker-pullable://repo/img@sha256:aaa".to_owned(),
                    state: Some(ContainerState {
                        running: Some(ContainerStateRunning::default()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn pod_info_converts_wire_pod() {
        let info = pod_info(&kube_pod());
        assert_eq!(info.name, "web-7d9f-abcde");
        assert_eq!(info.namespace, "default");
        assert_eq!(info.api_version, "v1");
        assert!(info.is_running());
        assert_eq!(info.containers, vec!["app".to_owned()]);
        assert!(info.has_running_container());
        assert_eq!(info.container_statuses[0].image_id, "docker-pullable://repo/img@sha256:aaa");
        let owner = info.primary_owner().unwrap();
        assert_eq!(owner.kind, "ReplicaSet");
        assert!(owner.controller);
    }

    #[test]
    fn pod_info_handles_missing_status() {
        let mut pod = kube_pod();
        pod.status = None;
        let info = pod_info(&pod);
        assert_eq!(info.phase, PodPhase::Unknown);
        assert!(info.container_statuses.is_empty());
    }

    #[test]
    fn split_api_version_handles_core_group() {
        assert_eq!(split_api_version("apps/v1"), ("apps", "v1"));
        assert_eq!(split_api_version("v1"), ("", "v1"));
    }

    #[test]
    fn plural_lowercases_kind() {
        assert_eq!(plural("ReplicaSet"), "replicasets");
        assert_eq!(plural("CronJob"), "cronjobs");
    }

    #[test]
    fn plural_follows_english_suffix_rules() {
        assert_eq!(plural("NetworkPolicy"), "networkpolicies");
        assert_eq!(plural("Gateway"), "gateways");
        assert_eq!(plural("Ingress"), "ingresses");
        assert_eq!(plural("Box"), "boxes");
        assert_eq!(plural("Patch"), "patches");
        assert_eq!(plural("Mesh"), "meshes");
        assert_eq!(plural("Endpoints"), "endpoints");
    }

    #[test]
    fn convert_watch_event_skips_bookmarks() {
        let added: Result<KubeWatchEvent<Pod>, kube::Error> = Ok(KubeWatchEvent::Added(kube_pod()));
        let converted = convert_watch_event(added, pod_info, WatcherError::Cluster)
            .unwrap()
            .unwrap();
        assert_eq!(converted.event_type, ironwatch_core::event::EventType::Added);

        let deleted: Result<KubeWatchEvent<Pod>, kube::Error> =
            Ok(KubeWatchEvent::Deleted(kube_pod()));
        assert!(
            convert_watch_event(deleted, pod_info, WatcherError::Cluster)
                .unwrap()
                .unwrap()
                .is_deleted()
        );
    }

    #[tokio::test]
    async fn mock_list_and_get() {
        let client = MockClusterClient::new().with_pods(vec![pod_info(&kube_pod())]);
        let listing = client.list_pods(None, None).await.unwrap();
        assert_eq!(listing.pods.len(), 1);
        assert_eq!(listing.resource_version, "1");
        assert_eq!(client.list_calls(), 1);

        assert!(client.get_pod("default", "web-7d9f-abcde").await.unwrap().is_some());
        assert!(client.get_pod("default", "missing").await.unwrap().is_none());
        assert!(client.list_pods(Some("other"), None).await.unwrap().pods.is_empty());
    }

    #[tokio::test]
    async fn mock_watch_scripts_in_order() {
        let client = MockClusterClient::new()
            .with_watch_failure("refused")
            .with_watch(vec![WatchEvent::modified(pod_info(&kube_pod()))]);

        assert!(client.watch_pods("1").await.is_err());
        let events: Vec<_> = client.watch_pods("2").await.unwrap().collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(client.watch_versions(), vec!["1".to_owned(), "2".to_owned()]);
    }
}
