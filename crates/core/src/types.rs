//! 도메인 타입 — 클러스터 워크로드와 스토리지 아티팩트
//!
//! 클러스터/스토리지 클라이언트는 와이어 객체를 이 타입들로 변환해서 넘기고,
//! 엔진 내부는 이 타입들만 다룹니다.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// `kind: Node` 소유자 참조 (static/mirror pod)
pub const KIND_NODE: &str = "Node";
/// Pod kind
pub const KIND_POD: &str = "Pod";

/// 워크로드 식별자 (WLID)
///
/// `wlid://cluster-<cluster>/namespace-<ns>/<kind>-<name>` 형식의 불투명 문자열입니다.
/// kind는 소문자로 정규화됩니다. 동등성은 문자열 동등성입니다.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wlid(String);

impl Wlid {
    /// 클러스터, 네임스페이스, kind, 이름으로 WLID를 생성합니다.
    pub fn new(cluster: &str, namespace: &str, kind: &str, name: &str) -> Self {
        Self(format!(
            "wlid://cluster-{cluster}/namespace-{namespace}/{}-{name}",
            kind.to_lowercase()
        ))
    }

    /// 이미 계산된 WLID 문자열을 감쌉니다 (예: 어노테이션 값).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// 문자열 표현을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Wlid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Wlid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Pod 단계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl PodPhase {
    /// Kubernetes `status.phase` 문자열을 파싱합니다. 알 수 없는 값은 `Unknown`.
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// 소유자 참조
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    /// 관리 컨트롤러 여부
    pub controller: bool,
}

/// 컨테이너 런타임 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// 컨테이너 이름
    pub name: String,
    /// spec에 지정된 이미지
    pub image: String,
    /// 런타임이 보고한 이미지 ID (digest 포함)
    pub image_id: String,
    /// 현재 Running 상태인지
    pub running: bool,
}

/// 엔진이 사용하는 Pod 뷰
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub api_version: String,
    pub phase: PodPhase,
    pub owner_references: Vec<OwnerReference>,
    /// spec.containers 이름 목록 (선언 순서)
    pub containers: Vec<String>,
    pub container_statuses: Vec<ContainerStatus>,
}

impl PodInfo {
    /// Running 단계인지 확인합니다.
    pub fn is_running(&self) -> bool {
        self.phase == PodPhase::Running
    }

    /// 하나 이상의 컨테이너가 Running 상태인지 확인합니다.
    pub fn has_running_container(&self) -> bool {
        self.container_statuses.iter().any(|s| s.running)
    }

    /// 이 Pod 자체를 워크로드 참조로 변환합니다.
    pub fn as_workload(&self) -> WorkloadRef {
        WorkloadRef {
            api_version: self.api_version.clone(),
            kind: KIND_POD.to_owned(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            owner_references: self.owner_references.clone(),
        }
    }

    /// 관리 컨트롤러 참조를 우선하고, 없으면 첫 번째 소유자를 반환합니다.
    pub fn primary_owner(&self) -> Option<&OwnerReference> {
        primary_owner(&self.owner_references)
    }
}

/// 소유자 체인 위의 임의 워크로드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub owner_references: Vec<OwnerReference>,
}

impl WorkloadRef {
    /// 관리 컨트롤러 참조를 우선하고, 없으면 첫 번째 소유자를 반환합니다.
    pub fn primary_owner(&self) -> Option<&OwnerReference> {
        primary_owner(&self.owner_references)
    }
}

fn primary_owner(refs: &[OwnerReference]) -> Option<&OwnerReference> {
    refs.iter().find(|r| r.controller).or_else(|| refs.first())
}

/// 감시 대상 스토리지 아티팩트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// 이미지 단위 SBOM (이름 = 이미지 해시)
    Sbom,
    /// 컨테이너 인스턴스 단위 필터링된 SBOM (이름 = 인스턴스 ID)
    FilteredSbom,
    /// 취약점 매니페스트 (이름 = 이미지 해시 또는 인스턴스 ID)
    VulnerabilityManifest,
}

impl ArtifactKind {
    /// 로그/메트릭 레이블에 쓰는 이름
    pub fn label(self) -> &'static str {
        match self {
            Self::Sbom => "sbom",
            Self::FilteredSbom => "filtered_sbom",
            Self::VulnerabilityManifest => "vulnerability_manifest",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 스토리지 아티팩트 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub name: String,
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
}

/// 취약점 매니페스트
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityManifest {
    pub meta: ArtifactMeta,
    /// relevancy 추적 여부 (true면 이름이 인스턴스 ID)
    pub with_relevancy: bool,
}

/// 구독 경계에서 종류별로 태깅된 스토리지 객체
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageObject {
    Sbom(ArtifactMeta),
    FilteredSbom(ArtifactMeta),
    VulnerabilityManifest(VulnerabilityManifest),
}

impl StorageObject {
    /// 객체의 종류를 반환합니다.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Sbom(_) => ArtifactKind::Sbom,
            Self::FilteredSbom(_) => ArtifactKind::FilteredSbom,
            Self::VulnerabilityManifest(_) => ArtifactKind::VulnerabilityManifest,
        }
    }

    /// 공통 메타데이터를 반환합니다.
    pub fn meta(&self) -> &ArtifactMeta {
        match self {
            Self::Sbom(meta) | Self::FilteredSbom(meta) => meta,
            Self::VulnerabilityManifest(vm) => &vm.meta,
        }
    }
}
