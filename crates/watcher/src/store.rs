//! 상관관계 저장소 -- 이미지/워크로드/인스턴스 인덱스
//!
//! [`CorrelationStore`]는 세 개의 독립된 인덱스를 각자의 `RwLock`으로 보호합니다.
//!
//! - 이미지 해시 → WLID 집합
//! - WLID → (컨테이너 이름 → 이미지 참조)
//! - 살아 있는 인스턴스 ID 집합
//!
//! 외부 코드는 락을 직접 잡지 않고 이 모듈의 원자적 연산만 사용합니다.
//! 여러 인덱스를 동시에 잠글 때는 항상 이미지 → 워크로드 → 인스턴스 순서를 따릅니다.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ironwatch_core::types::Wlid;

/// 컨테이너 이름 → 이미지 참조
pub type ContainerImages = BTreeMap<String, String>;

/// 파드 하나에서 추출한 등록 단위
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodObservation {
    /// 상위 워크로드
    pub wlid: Wlid,
    /// Running 컨테이너의 (이름, 이미지 참조)
    pub containers: ContainerImages,
    /// 컨테이너별 인스턴스 ID
    pub instance_ids: Vec<String>,
}

/// 잠금 없이 구축하는 인덱스 사본
///
/// 정리 태스크가 새 인덱스를 만든 뒤 [`CorrelationStore::replace_all`]로 교체합니다.
#[derive(Debug, Default, Clone)]
pub struct StoreSnapshot {
    images: HashMap<String, HashSet<Wlid>>,
    workloads: HashMap<Wlid, ContainerImages>,
    instances: HashSet<String>,
}

impl StoreSnapshot {
    /// 빈 사본을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 관측 결과 전체를 무조건 등록합니다.
    pub fn register(&mut self, obs: &PodObservation) {
        for (container, image_ref) in &obs.containers {
            self.images
                .entry(crate::image::image_hash(image_ref))
                .or_default()
                .insert(obs.wlid.clone());
            self.workloads
                .entry(obs.wlid.clone())
                .or_default()
                .insert(container.clone(), image_ref.clone());
        }
        self.instances.extend(obs.instance_ids.iter().cloned());
    }

    /// 등록된 워크로드 수
    pub fn workload_count(&self) -> usize {
        self.workloads.len()
    }
}

/// 동시 접근 가능한 상관관계 인덱스
#[derive(Debug, Default)]
pub struct CorrelationStore {
    images: RwLock<HashMap<String, HashSet<Wlid>>>,
    workloads: RwLock<HashMap<Wlid, ContainerImages>>,
    instances: RwLock<HashSet<String>>,
}

// 인덱스는 순수 데이터뿐이므로 poison 상태에서도 내용을 그대로 사용합니다.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl CorrelationStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    // --- 조회 ---

    /// 이미지 해시를 사용하는 워크로드 집합. 없으면 빈 집합.
    pub fn lookup_workloads_for_image(&self, hash: &str) -> HashSet<Wlid> {
        read(&self.images).get(hash).cloned().unwrap_or_default()
    }

    /// 이미지 해시가 인덱스에 있는지 확인합니다.
    pub fn contains_image(&self, hash: &str) -> bool {
        read(&self.images).contains_key(hash)
    }

    /// 워크로드의 컨테이너 → 이미지 참조. 없으면 빈 맵.
    pub fn lookup_containers(&self, wlid: &Wlid) -> ContainerImages {
        read(&self.workloads).get(wlid).cloned().unwrap_or_default()
    }

    /// 워크로드가 인덱스에 있는지 확인합니다.
    pub fn has_workload(&self, wlid: &Wlid) -> bool {
        read(&self.workloads).contains_key(wlid)
    }

    /// 인스턴스 ID가 살아 있는지 확인합니다.
    pub fn contains_instance(&self, id: &str) -> bool {
        read(&self.instances).contains(id)
    }

    // --- 갱신 ---

    /// 이미지 해시 → 워크로드 매핑을 추가합니다. 중복은 무시됩니다.
    pub fn add_image_workload(&self, hash: impl Into<String>, wlid: Wlid) {
        write(&self.images).entry(hash.into()).or_default().insert(wlid);
    }

    /// (워크로드, 컨테이너) → 이미지 참조를 기록합니다. 기존 값은 덮어씁니다.
    pub fn add_container_mapping(
        &self,
        wlid: Wlid,
        container: impl Into<String>,
        image_ref: impl Into<String>,
    ) {
        write(&self.workloads)
            .entry(wlid)
            .or_default()
            .insert(container.into(), image_ref.into());
    }

    /// 인스턴스 ID를 추가합니다.
    pub fn add_instance(&self, id: impl Into<String>) {
        write(&self.instances).insert(id.into());
    }

    /// 세 인덱스를 모두 비웁니다.
    pub fn reset_all(&self) {
        let mut images = write(&self.images);
        let mut workloads = write(&self.workloads);
        let mut instances = write(&self.instances);
        images.clear();
        workloads.clear();
        instances.clear();
    }

    /// 세 인덱스를 한 번에 새 사본으로 교체합니다.
    ///
    /// 교체 중에는 세 락을 모두 잡으므로 읽는 쪽은 빈 인덱스를 관측하지 않습니다.
    pub fn replace_all(&self, snapshot: StoreSnapshot) {
        let mut images = write(&self.images);
        let mut workloads = write(&self.workloads);
        let mut instances = write(&self.instances);
        *images = snapshot.images;
        *workloads = snapshot.workloads;
        *instances = snapshot.instances;
    }

    /// 사본의 내용을 기존 인덱스에 합칩니다. 기존 항목은 유지됩니다.
    pub fn merge_all(&self, snapshot: StoreSnapshot) {
        let mut images = write(&self.images);
        let mut workloads = write(&self.workloads);
        let mut instances = write(&self.instances);
        for (hash, wlids) in snapshot.images {
            images.entry(hash).or_default().extend(wlids);
        }
        for (wlid, containers) in snapshot.workloads {
            workloads.entry(wlid).or_default().extend(containers);
        }
        instances.extend(snapshot.instances);
    }

    /// 초기 이미지 해시 → WLID 매핑을 주입합니다.
    pub fn seed_images(&self, seed: HashMap<String, Vec<Wlid>>) {
        let mut images = write(&self.images);
        for (hash, wlids) in seed {
            if wlids.is_empty() {
                continue;
            }
            images.entry(hash).or_default().extend(wlids);
        }
    }

    /// 초기 인스턴스 ID를 주입합니다.
    pub fn seed_instances(&self, seed: impl IntoIterator<Item = String>) {
        write(&self.instances).extend(seed);
    }

    // --- 스냅샷/크기 ---

    /// 워크로드 → 컨테이너 매핑 전체 사본
    pub fn workload_containers_snapshot(&self) -> HashMap<Wlid, ContainerImages> {
        read(&self.workloads).clone()
    }

    /// 인스턴스 ID 전체 사본
    pub fn instances_snapshot(&self) -> HashSet<String> {
        read(&self.instances).clone()
    }

    /// 추적 중인 이미지 해시 수
    pub fn image_count(&self) -> usize {
        read(&self.images).len()
    }

    /// 추적 중인 워크로드 수
    pub fn workload_count(&self) -> usize {
        read(&self.workloads).len()
    }

    /// 추적 중인 인스턴스 ID 수
    pub fn instance_count(&self) -> usize {
        read(&self.instances).len()
    }

    /// 인덱스 크기를 게이지로 내보냅니다.
    pub fn publish_gauges(&self) {
        use ironwatch_core::metrics as m;
        metrics::gauge!(m::WATCHER_TRACKED_IMAGES).set(self.image_count() as f64);
        metrics::gauge!(m::WATCHER_TRACKED_WORKLOADS).set(self.workload_count() as f64);
        metrics::gauge!(m::WATCHER_TRACKED_INSTANCES).set(self.instance_count() as f64);
    }
}
