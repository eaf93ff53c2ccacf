//! 정리(재구축) 태스크
//!
//! 주기마다 전체 파드 목록을 조회해 상관관계 저장소를 처음부터 다시 만듭니다.
//! 더 이상 실행 중이 아닌 워크로드의 항목이 사라지므로, 핸들러는 이 결과를 기준으로
//! 아티팩트의 고아 여부를 판정합니다. 재구축 중에는 스캔 명령을 만들지 않습니다.
//!
//! 새 인덱스는 잠금 없이 [`StoreSnapshot`]에 구축한 뒤 한 번에 교체합니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ironwatch_core::metrics as m;

use crate::cluster::ClusterClient;
use crate::error::WatcherError;
use crate::pod::PodEventPipeline;
use crate::store::StoreSnapshot;
use crate::watch::sleep_or_cancel;

/// 재구축 결과를 저장소에 반영하는 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildMode {
    /// 기존 항목(초기 주입값 포함)을 유지하고 합칩니다.
    Merge,
    /// 세 인덱스를 통째로 교체합니다.
    Replace,
}

/// 재구축 요약
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    /// 목록에 포함된 파드 수
    pub listed: usize,
    /// 등록된 파드 수
    pub registered: usize,
    /// 해석에 실패해 건너뛴 파드 수
    pub skipped: usize,
    /// 목록 조회 시점의 resourceVersion
    pub resource_version: String,
}

/// 전체 파드 목록으로 저장소를 재구축합니다.
pub async fn rebuild<C: ClusterClient>(
    pipeline: &PodEventPipeline<C>,
    mode: RebuildMode,
) -> Result<RebuildSummary, WatcherError> {
    let listing = pipeline.cluster().list_pods(None, None).await?;
    let mut snapshot = StoreSnapshot::new();
    let mut summary = RebuildSummary {
        listed: listing.pods.len(),
        resource_version: listing.resource_version,
        ..RebuildSummary::default()
    };

    for pod in listing
        .pods
        .iter()
        .filter(|p| p.is_running() && p.has_running_container())
    {
        match pipeline.observe(pod).await {
            Ok(obs) => {
                snapshot.register(&obs);
                summary.registered += 1;
            }
            Err(e) => {
                warn!(namespace = %pod.namespace, pod = %pod.name, error = %e, "skipping pod during rebuild");
                summary.skipped += 1;
            }
        }
    }

    let store = pipeline.store();
    match mode {
        RebuildMode::Merge => store.merge_all(snapshot),
        RebuildMode::Replace => store.replace_all(snapshot),
    }
    store.publish_gauges();

    debug!(
        listed = summary.listed,
        registered = summary.registered,
        skipped = summary.skipped,
        "correlation store rebuilt"
    );
    Ok(summary)
}

/// 주기적 정리 태스크
pub struct CleanupTask<C> {
    pipeline: Arc<PodEventPipeline<C>>,
    interval: Duration,
    cancel: CancellationToken,
}

impl<C: ClusterClient> CleanupTask<C> {
    pub fn new(
        pipeline: Arc<PodEventPipeline<C>>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            interval,
            cancel,
        }
    }

    /// 취소될 때까지 주기마다 재구축합니다. 실패한 주기는 다음 주기에 다시 시도합니다.
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "cleanup task started");
        while sleep_or_cancel(&self.cancel, self.interval).await {
            self.run_cycle().await;
        }
        debug!("cleanup task stopped");
    }

    async fn run_cycle(&self) {
        let started = Instant::now();
        let result = rebuild(self.pipeline.as_ref(), RebuildMode::Replace).await;
        metrics::histogram!(m::WATCHER_CLEANUP_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(summary) => {
                metrics::counter!(m::WATCHER_CLEANUP_CYCLES_TOTAL, m::LABEL_RESULT => "success")
                    .increment(1);
                info!(
                    listed = summary.listed,
                    registered = summary.registered,
                    skipped = summary.skipped,
                    "cleanup cycle completed"
                );
            }
            Err(e) => {
                metrics::counter!(m::WATCHER_CLEANUP_CYCLES_TOTAL, m::LABEL_RESULT => "failure")
                    .increment(1);
                warn!(error = %e, "cleanup cycle failed, keeping current indices");
            }
        }
    }
}
