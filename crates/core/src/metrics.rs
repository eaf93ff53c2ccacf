//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ironwatch_`
//! - 모듈명: `watcher_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 감시 대상 종류 레이블 키 (pods, sbom, filtered_sbom, vulnerability_manifest)
pub const LABEL_KIND: &str = "kind";

/// 스캔 명령 출처 레이블 키 (pod, filtered_sbom)
pub const LABEL_SOURCE: &str = "source";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Watcher 메트릭 ────────────────────────────────────────────────

/// Watcher: 수신한 감시 이벤트 수 (counter, label: kind)
pub const WATCHER_EVENTS_TOTAL: &str = "ironwatch_watcher_events_total";

/// Watcher: 재구독 시도 수 (counter, label: kind)
pub const WATCHER_RECONNECTS_TOTAL: &str = "ironwatch_watcher_reconnects_total";

/// Watcher: 핸들러 에러 수 (counter, label: kind)
pub const WATCHER_HANDLER_ERRORS_TOTAL: &str = "ironwatch_watcher_handler_errors_total";

/// Watcher: 삭제한 고아 아티팩트 수 (counter, label: kind)
pub const WATCHER_ORPHANS_DELETED_TOTAL: &str = "ironwatch_watcher_orphans_deleted_total";

/// Watcher: 고아 아티팩트 삭제 실패 수 (counter, label: kind)
pub const WATCHER_ORPHAN_DELETE_FAILURES_TOTAL: &str =
    "ironwatch_watcher_orphan_delete_failures_total";

/// Watcher: 전송한 스캔 명령 수 (counter, label: source)
pub const WATCHER_SCAN_COMMANDS_TOTAL: &str = "ironwatch_watcher_scan_commands_total";

/// Watcher: 정리 주기 실행 수 (counter, label: result)
pub const WATCHER_CLEANUP_CYCLES_TOTAL: &str = "ironwatch_watcher_cleanup_cycles_total";

/// Watcher: 정리 주기 소요 시간 (histogram, 초)
pub const WATCHER_CLEANUP_DURATION_SECONDS: &str = "ironwatch_watcher_cleanup_duration_seconds";

/// Watcher: 추적 중인 이미지 해시 수 (gauge)
pub const WATCHER_TRACKED_IMAGES: &str = "ironwatch_watcher_tracked_images";

/// Watcher: 추적 중인 워크로드 수 (gauge)
pub const WATCHER_TRACKED_WORKLOADS: &str = "ironwatch_watcher_tracked_workloads";

/// Watcher: 추적 중인 인스턴스 ID 수 (gauge)
pub const WATCHER_TRACKED_INSTANCES: &str = "ironwatch_watcher_tracked_instances";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "ironwatch_daemon_uptime_seconds";

/// Daemon: 등록된 모듈 수 (gauge)
pub const DAEMON_MODULES_REGISTERED: &str = "ironwatch_daemon_modules_registered";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "ironwatch_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        WATCHER_EVENTS_TOTAL,
        "Total number of watch events received per resource kind"
    );
    describe_counter!(
        WATCHER_RECONNECTS_TOTAL,
        "Total number of subscription attempts after a disconnect"
    );
    describe_counter!(
        WATCHER_HANDLER_ERRORS_TOTAL,
        "Total number of non-fatal errors reported by event handlers"
    );
    describe_counter!(
        WATCHER_ORPHANS_DELETED_TOTAL,
        "Total number of orphaned storage artifacts deleted"
    );
    describe_counter!(
        WATCHER_ORPHAN_DELETE_FAILURES_TOTAL,
        "Total number of failed orphan deletions"
    );
    describe_counter!(
        WATCHER_SCAN_COMMANDS_TOTAL,
        "Total number of scan commands emitted"
    );
    describe_counter!(
        WATCHER_CLEANUP_CYCLES_TOTAL,
        "Total number of correlation rebuild cycles"
    );
    describe_histogram!(
        WATCHER_CLEANUP_DURATION_SECONDS,
        "Time to list pods and rebuild the correlation indices in seconds"
    );
    describe_gauge!(
        WATCHER_TRACKED_IMAGES,
        "Number of image hashes in the correlation index"
    );
    describe_gauge!(
        WATCHER_TRACKED_WORKLOADS,
        "Number of workloads in the correlation index"
    );
    describe_gauge!(
        WATCHER_TRACKED_INSTANCES,
        "Number of live container instance identifiers"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "Ironwatch operator uptime in seconds");
    describe_gauge!(
        DAEMON_MODULES_REGISTERED,
        "Number of modules registered in the operator"
    );
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information, always 1, labelled with version"
    );
}
