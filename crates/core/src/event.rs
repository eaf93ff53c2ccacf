//! 이벤트 시스템 — 감시 스트림 입력과 스캔 명령 출력
//!
//! [`WatchEvent`]는 클러스터/스토리지 구독이 내보내는 입력 이벤트이고,
//! [`ScanCommand`]는 엔진이 외부 스캔 실행기로 보내는 출력 메시지입니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::Wlid;

// --- 모듈명 상수 ---

/// 리소스 감시 모듈명
pub const MODULE_WATCHER: &str = "watcher";

// --- 이벤트 타입 상수 ---

/// 스캔 명령 이벤트 타입
pub const EVENT_TYPE_SCAN: &str = "scan";

/// 스캔 명령 이름
pub const COMMAND_SCAN_IMAGES: &str = "scan";

/// 이벤트 메타데이터 — 모든 출력 이벤트에 공통으로 포함되는 추적 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명
    pub source_module: String,
    /// 분산 추적 ID
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            unix_timestamp_str(self.timestamp),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 출력 이벤트가 구현하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널 전송을 보장합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅 및 라우팅에 사용)
    fn event_type(&self) -> &str;
}

/// 감시 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "ADDED"),
            Self::Modified => write!(f, "MODIFIED"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

/// 감시 스트림이 내보내는 이벤트 `{Added|Modified|Deleted, payload}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent<T> {
    pub event_type: EventType,
    pub object: T,
}

impl<T> WatchEvent<T> {
    pub fn added(object: T) -> Self {
        Self {
            event_type: EventType::Added,
            object,
        }
    }

    pub fn modified(object: T) -> Self {
        Self {
            event_type: EventType::Modified,
            object,
        }
    }

    pub fn deleted(object: T) -> Self {
        Self {
            event_type: EventType::Deleted,
            object,
        }
    }

    /// 삭제 이벤트인지 확인합니다.
    pub fn is_deleted(&self) -> bool {
        self.event_type == EventType::Deleted
    }
}

/// 이미지 스캔 명령
///
/// 대상 워크로드와 `컨테이너 이름 → 이미지 참조` 맵을 담습니다.
/// 소비자(외부 스캔 실행기)의 결과는 기다리지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCommand {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 명령 이름
    pub command_name: String,
    /// 대상 워크로드
    pub wlid: Wlid,
    /// 컨테이너 이름 → 이미지 참조
    pub containers: BTreeMap<String, String>,
}

impl ScanCommand {
    /// 새로운 trace를 시작하는 스캔 명령을 생성합니다.
    pub fn new(wlid: Wlid, containers: BTreeMap<String, String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_WATCHER),
            command_name: COMMAND_SCAN_IMAGES.to_owned(),
            wlid,
            containers,
        }
    }
}

impl Event for ScanCommand {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_SCAN
    }
}

impl fmt::Display for ScanCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ScanCommand[{}] wlid={} containers={}",
            self.metadata,
            self.command_name,
            self.wlid,
            self.containers.len(),
        )
    }
}

/// SystemTime을 사람이 읽을 수 있는 형태로 변환합니다.
fn unix_timestamp_str(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => format!("{}", duration.as_secs()),
        Err(_) => "unknown".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_wlid() -> Wlid {
        Wlid::new("test", "default", "Deployment", "nginx")
    }

    #[test]
    fn event_metadata_new_preserves_trace_id() {
        let meta = EventMetadata::new("test-module", "trace-abc-123");
        assert_eq!(meta.source_module, "test-module");
        assert_eq!(meta.trace_id, "trace-abc-123");
        assert!(meta.timestamp <= SystemTime::now());
    }

    #[test]
    fn event_metadata_with_new_trace_generates_uuid() {
        let meta = EventMetadata::with_new_trace("test-module");
        // UUID v4 형식 확인: 8-4-4-4-12
        assert_eq!(meta.trace_id.len(), 36);
        assert_eq!(meta.trace_id.chars().filter(|c| *c == '-').count(), 4);
    }

    #[test]
    fn scan_command_implements_event_trait() {
        let mut containers = BTreeMap::new();
        containers.insert("app".to_owned(), "nginx@sha256:aaa".to_owned());
        let cmd = ScanCommand::new(sample_wlid(), containers);

        assert_eq!(cmd.event_type(), "scan");
        assert_eq!(cmd.command_name, COMMAND_SCAN_IMAGES);
        assert_eq!(cmd.metadata().source_module, MODULE_WATCHER);
        assert!(!cmd.event_id().is_empty());
    }

    #[test]
    fn scan_command_display() {
        let cmd = ScanCommand::new(sample_wlid(), BTreeMap::new());
        let display = cmd.to_string();
        assert!(display.contains("ScanCommand"));
        assert!(display.contains("deployment-nginx"));
    }

    #[test]
    fn watch_event_constructors() {
        assert_eq!(WatchEvent::added(1).event_type, EventType::Added);
        assert_eq!(WatchEvent::modified(1).event_type, EventType::Modified);
        assert!(WatchEvent::deleted(1).is_deleted());
        assert!(!WatchEvent::added(1).is_deleted());
    }

    #[test]
    fn scan_command_json_shape() {
        let containers = BTreeMap::from([
            ("sidecar".to_owned(), "envoy:1.29".to_owned()),
            ("app".to_owned(), "nginx:1.25".to_owned()),
        ]);
        let cmd = ScanCommand::new(sample_wlid(), containers);

        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["command_name"], "scan");
        assert_eq!(
            json["wlid"],
            "wlid://cluster-test/namespace-default/deployment-nginx"
        );
        assert_eq!(json["containers"]["app"], "nginx:1.25");
        assert_eq!(json["metadata"]["source_module"], "watcher");

        let back: ScanCommand = serde_json::from_value(json).unwrap();
        assert_eq!(back.wlid, cmd.wlid);
        assert_eq!(back.containers, cmd.containers);
    }

    #[test]
    fn scan_command_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<ScanCommand>();
    }
}
