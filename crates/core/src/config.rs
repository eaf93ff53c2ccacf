//! 설정 관리 — ironwatch.toml 파싱 및 런타임 설정
//!
//! [`IronwatchConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IRONWATCH_WATCHER_RETRY_INTERVAL_SECS=5` 형식)
//! 3. 설정 파일 (`ironwatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ironwatch_core::error::IronwatchError> {
//! use ironwatch_core::config::IronwatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IronwatchConfig::load("ironwatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IronwatchConfig::parse("[cluster]\ncluster_name = \"prod\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IronwatchError};

/// 설정 상한값 상수
const MAX_RETRY_INTERVAL_SECS: u64 = 300;
const MAX_CLEANUP_INTERVAL_SECS: u64 = 86_400;
const MAX_COMMAND_CHANNEL_CAPACITY: usize = 65_536;
const MAX_OWNER_DEPTH: usize = 64;

/// Ironwatch 통합 설정
///
/// `ironwatch.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IronwatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 클러스터 식별 설정
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// 리소스 감시 설정
    #[serde(default)]
    pub watcher: WatcherSection,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl IronwatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronwatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IronwatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IronwatchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IronwatchError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IronwatchError> {
        toml::from_str(toml_str).map_err(|e| {
            IronwatchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IRONWATCH_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IRONWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IRONWATCH_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "IRONWATCH_GENERAL_PID_FILE");

        // Cluster
        override_string(
            &mut self.cluster.cluster_name,
            "IRONWATCH_CLUSTER_CLUSTER_NAME",
        );

        // Watcher
        override_bool(&mut self.watcher.enabled, "IRONWATCH_WATCHER_ENABLED");
        override_u64(
            &mut self.watcher.retry_interval_secs,
            "IRONWATCH_WATCHER_RETRY_INTERVAL_SECS",
        );
        override_u64(
            &mut self.watcher.cleanup_interval_secs,
            "IRONWATCH_WATCHER_CLEANUP_INTERVAL_SECS",
        );
        override_usize(
            &mut self.watcher.command_channel_capacity,
            "IRONWATCH_WATCHER_COMMAND_CHANNEL_CAPACITY",
        );
        override_usize(
            &mut self.watcher.max_owner_depth,
            "IRONWATCH_WATCHER_MAX_OWNER_DEPTH",
        );
        override_string(
            &mut self.watcher.storage_group,
            "IRONWATCH_WATCHER_STORAGE_GROUP",
        );
        override_string(
            &mut self.watcher.storage_version,
            "IRONWATCH_WATCHER_STORAGE_VERSION",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "IRONWATCH_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "IRONWATCH_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "IRONWATCH_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IronwatchError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.cluster.cluster_name.trim().is_empty() {
            return Err(invalid("cluster.cluster_name", "must not be empty"));
        }

        let w = &self.watcher;
        if w.retry_interval_secs == 0 || w.retry_interval_secs > MAX_RETRY_INTERVAL_SECS {
            return Err(invalid(
                "watcher.retry_interval_secs",
                format!("must be 1-{MAX_RETRY_INTERVAL_SECS}"),
            ));
        }
        if w.cleanup_interval_secs == 0 || w.cleanup_interval_secs > MAX_CLEANUP_INTERVAL_SECS {
            return Err(invalid(
                "watcher.cleanup_interval_secs",
                format!("must be 1-{MAX_CLEANUP_INTERVAL_SECS}"),
            ));
        }
        if w.command_channel_capacity == 0
            || w.command_channel_capacity > MAX_COMMAND_CHANNEL_CAPACITY
        {
            return Err(invalid(
                "watcher.command_channel_capacity",
                format!("must be 1-{MAX_COMMAND_CHANNEL_CAPACITY}"),
            ));
        }
        if w.max_owner_depth == 0 || w.max_owner_depth > MAX_OWNER_DEPTH {
            return Err(invalid(
                "watcher.max_owner_depth",
                format!("must be 1-{MAX_OWNER_DEPTH}"),
            ));
        }
        if w.storage_group.is_empty() || w.storage_version.is_empty() {
            return Err(invalid(
                "watcher.storage_group",
                "storage group and version must not be empty",
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must not be 0 when metrics are enabled"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> IronwatchError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 사용하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 클러스터 식별 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// 모든 WLID에 포함되는 클러스터 이름
    pub cluster_name: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: "default".to_owned(),
        }
    }
}

/// 리소스 감시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSection {
    /// 활성화 여부
    pub enabled: bool,
    /// 재구독 백오프 (초, 고정)
    pub retry_interval_secs: u64,
    /// 전체 재구축 주기 (초)
    pub cleanup_interval_secs: u64,
    /// 스캔 명령 큐 용량
    pub command_channel_capacity: usize,
    /// 소유자 체인 탐색 최대 깊이
    pub max_owner_depth: usize,
    /// 스토리지 CRD API 그룹
    pub storage_group: String,
    /// 스토리지 CRD API 버전
    pub storage_version: String,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_interval_secs: 3,
            cleanup_interval_secs: 600,
            command_channel_capacity: 256,
            max_owner_depth: 10,
            storage_group: "spdx.softwarecomposition.kubescape.io".to_owned(),
            storage_version: "v1beta1".to_owned(),
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리스닝 주소
    pub listen_addr: String,
    /// 리스닝 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9090,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}
