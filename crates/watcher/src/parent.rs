//! 상위 워크로드 해석 -- 소유자 체인 탐색
//!
//! 파드의 소유자 참조를 따라 올라가 소유자가 없는 최상위 컨트롤러를 찾습니다.
//! Node가 소유한 파드(정적 파드)는 파드 자신이 워크로드가 됩니다.
//! 순환 참조를 막기 위해 탐색 깊이는 `max_depth`로 제한됩니다.

use std::sync::Arc;

use tracing::debug;

use ironwatch_core::types::{KIND_NODE, PodInfo, Wlid, WorkloadRef};

use crate::cluster::ClusterClient;
use crate::error::WatcherError;

/// 소유자 체인 해석기
pub struct ParentResolver<C> {
    cluster: Arc<C>,
    cluster_name: String,
    max_depth: usize,
}

impl<C: ClusterClient> ParentResolver<C> {
    /// 새 해석기를 생성합니다.
    pub fn new(cluster: Arc<C>, cluster_name: impl Into<String>, max_depth: usize) -> Self {
        Self {
            cluster,
            cluster_name: cluster_name.into(),
            max_depth,
        }
    }

    /// 파드의 최상위 워크로드를 찾습니다.
    pub async fn resolve_workload(&self, pod: &PodInfo) -> Result<WorkloadRef, WatcherError> {
        let pod_key = format!("{}/{}", pod.namespace, pod.name);
        let mut current = pod.as_workload();
        let mut hops = 0;

        loop {
            let owner = match current.primary_owner() {
                Some(owner) if owner.kind != KIND_NODE => owner.clone(),
                _ => break,
            };
            if hops >= self.max_depth {
                return Err(WatcherError::OwnerChainTooDeep {
                    pod: pod_key,
                    depth: self.max_depth,
                });
            }
            hops += 1;

            let parent = self
                .cluster
                .get_workload(&pod.namespace, &owner)
                .await
                .map_err(|e| WatcherError::ParentResolution {
                    pod: pod_key.clone(),
                    reason: e.to_string(),
                })?;
            current = parent.ok_or_else(|| WatcherError::ParentResolution {
                pod: pod_key.clone(),
                reason: format!("owner {}/{} not found", owner.kind, owner.name),
            })?;
        }

        debug!(pod = %pod_key, kind = %current.kind, name = %current.name, hops, "resolved parent workload");
        Ok(current)
    }

    /// 파드의 상위 워크로드 WLID를 계산합니다.
    pub async fn resolve(&self, pod: &PodInfo) -> Result<Wlid, WatcherError> {
        let workload = self.resolve_workload(pod).await?;
        Ok(Wlid::new(
            &self.cluster_name,
            &pod.namespace,
            &workload.kind,
            &workload.name,
        ))
    }
}
