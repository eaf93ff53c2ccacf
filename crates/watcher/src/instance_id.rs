//! 컨테이너 인스턴스 ID
//!
//! 인스턴스 ID는 파드의 직접 소유자(없으면 파드 자신)와 컨테이너 이름으로 만든
//! 문자열의 SHA-256 해시입니다. 필터링된 SBOM과 relevancy 취약점 매니페스트의
//! 이름이 이 값이므로 형식이 바뀌면 모든 아티팩트가 고아로 판정됩니다.

use std::fmt;

use ironwatch_core::types::{KIND_NODE, KIND_POD, PodInfo};
use sha2::{Digest, Sha256};

use crate::error::WatcherError;

/// 파드 자신을 기준으로 할 때의 API 버전
const POD_API_VERSION: &str = "v1";

/// 컨테이너 하나의 인스턴스 식별 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceId {
    pub api_version: String,
    pub namespace: String,
    pub kind: String,
    pub name: String,
    pub container_name: String,
}

impl InstanceId {
    /// SHA-256 소문자 hex 해시
    pub fn hashed(&self) -> String {
        hex::encode(Sha256::digest(self.to_string().as_bytes()))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "apiVersion-{}/namespace-{}/kind-{}/name-{}/containerName-{}",
            self.api_version, self.namespace, self.kind, self.name, self.container_name
        )
    }
}

/// 파드의 spec 컨테이너마다 인스턴스 ID를 만듭니다.
pub fn instance_ids_for_pod(pod: &PodInfo) -> Result<Vec<InstanceId>, WatcherError> {
    let pod_key = format!("{}/{}", pod.namespace, pod.name);
    if pod.containers.is_empty() {
        return Err(WatcherError::InstanceId {
            pod: pod_key,
            reason: "pod declares no containers".to_owned(),
        });
    }

    let (api_version, kind, name) = match pod.primary_owner() {
        Some(owner) if owner.kind != KIND_NODE => {
            if owner.kind.is_empty() || owner.name.is_empty() {
                return Err(WatcherError::InstanceId {
                    pod: pod_key,
                    reason: "owner reference has empty kind or name".to_owned(),
                });
            }
            (owner.api_version.as_str(), owner.kind.as_str(), owner.name.as_str())
        }
        _ => {
            let api_version = if pod.api_version.is_empty() {
                POD_API_VERSION
            } else {
                pod.api_version.as_str()
            };
            (api_version, KIND_POD, pod.name.as_str())
        }
    };

    Ok(pod
        .containers
        .iter()
        .map(|container| InstanceId {
            api_version: api_version.to_owned(),
            namespace: pod.namespace.clone(),
            kind: kind.to_owned(),
            name: name.to_owned(),
            container_name: container.clone(),
        })
        .collect())
}

/// 파드의 인스턴스 ID 해시 목록
pub fn hashed_instance_ids(pod: &PodInfo) -> Result<Vec<String>, WatcherError> {
    Ok(instance_ids_for_pod(pod)?
        .iter()
        .map(InstanceId::hashed)
        .collect())
}
