//! 리소스 감시 설정
//!
//! [`WatcherConfig`]는 core의 [`IronwatchConfig`]에서 `[cluster]`와 `[watcher]`
//! 섹션을 합쳐 watcher 전용 설정을 만듭니다.
//!
//! # 사용 예시
//! ```ignore
//! use ironwatch_core::config::IronwatchConfig;
//! use ironwatch_watcher::config::WatcherConfig;
//!
//! let core_config = IronwatchConfig::default();
//! let config = WatcherConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use ironwatch_core::config::IronwatchConfig;
use serde::{Deserialize, Serialize};

use crate::error::WatcherError;

/// 설정 상한값 상수
const MAX_RETRY_INTERVAL_SECS: u64 = 300;
const MAX_CLEANUP_INTERVAL_SECS: u64 = 86_400;
const MAX_COMMAND_CHANNEL_CAPACITY: usize = 65_536;
const MAX_OWNER_DEPTH: usize = 64;

/// 리소스 감시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// WLID에 포함되는 클러스터 이름
    pub cluster_name: String,
    /// 재구독 백오프 (초, 고정)
    pub retry_interval_secs: u64,
    /// 전체 재구축 주기 (초)
    pub cleanup_interval_secs: u64,
    /// 스캔 명령 큐 용량 (외부 채널 미사용 시)
    pub command_channel_capacity: usize,
    /// 소유자 체인 탐색 최대 깊이
    pub max_owner_depth: usize,
    /// 스토리지 CRD API 그룹
    pub storage_group: String,
    /// 스토리지 CRD API 버전
    pub storage_version: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cluster_name: "default".to_owned(),
            retry_interval_secs: 3,
            cleanup_interval_secs: 600,
            command_channel_capacity: 256,
            max_owner_depth: 10,
            storage_group: "spdx.softwarecomposition.kubescape.io".to_owned(),
            storage_version: "v1beta1".to_owned(),
        }
    }
}

impl WatcherConfig {
    /// core 설정에서 watcher 설정을 생성합니다.
    pub fn from_core(core: &IronwatchConfig) -> Self {
        let w = &core.watcher;
        Self {
            enabled: w.enabled,
            cluster_name: core.cluster.cluster_name.clone(),
            retry_interval_secs: w.retry_interval_secs,
            cleanup_interval_secs: w.cleanup_interval_secs,
            command_channel_capacity: w.command_channel_capacity,
            max_owner_depth: w.max_owner_depth,
            storage_group: w.storage_group.clone(),
            storage_version: w.storage_version.clone(),
        }
    }

    /// 재구독 백오프
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// 재구축 주기
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), WatcherError> {
        if self.cluster_name.trim().is_empty() {
            return Err(WatcherError::Config {
                field: "cluster_name".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.retry_interval_secs == 0 || self.retry_interval_secs > MAX_RETRY_INTERVAL_SECS {
            return Err(WatcherError::Config {
                field: "retry_interval_secs".to_owned(),
                reason: format!("must be 1-{MAX_RETRY_INTERVAL_SECS}"),
            });
        }

        if self.cleanup_interval_secs == 0 || self.cleanup_interval_secs > MAX_CLEANUP_INTERVAL_SECS
        {
            return Err(WatcherError::Config {
                field: "cleanup_interval_secs".to_owned(),
                reason: format!("must be 1-{MAX_CLEANUP_INTERVAL_SECS}"),
            });
        }

        if self.command_channel_capacity == 0
            || self.command_channel_capacity > MAX_COMMAND_CHANNEL_CAPACITY
        {
            return Err(WatcherError::Config {
                field: "command_channel_capacity".to_owned(),
                reason: format!("must be 1-{MAX_COMMAND_CHANNEL_CAPACITY}"),
            });
        }

        if self.max_owner_depth == 0 || self.max_owner_depth > MAX_OWNER_DEPTH {
            return Err(WatcherError::Config {
                field: "max_owner_depth".to_owned(),
                reason: format!("must be 1-{MAX_OWNER_DEPTH}"),
            });
        }

        if self.storage_group.is_empty() || self.storage_version.is_empty() {
            return Err(WatcherError::Config {
                field: "storage_group".to_owned(),
                reason: "storage group and version must not be empty".to_owned(),
            });
        }

        Ok(())
    }
}

/// 리소스 감시 설정 빌더
#[derive(Default)]
pub struct WatcherConfigBuilder {
    config: WatcherConfig,
}

impl WatcherConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 활성화 여부를 설정합니다.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// 클러스터 이름을 설정합니다.
    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.config.cluster_name = name.into();
        self
    }

    /// 재구독 백오프(초)를 설정합니다.
    pub fn retry_interval_secs(mut self, secs: u64) -> Self {
        self.config.retry_interval_secs = secs;
        self
    }

    /// 재구축 주기(초)를 설정합니다.
    pub fn cleanup_interval_secs(mut self, secs: u64) -> Self {
        self.config.cleanup_interval_secs = secs;
        self
    }

    /// 스캔 명령 큐 용량을 설정합니다.
    pub fn command_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.command_channel_capacity = capacity;
        self
    }

    /// 소유자 체인 탐색 최대 깊이를 설정합니다.
    pub fn max_owner_depth(mut self, depth: usize) -> Self {
        self.config.max_owner_depth = depth;
        self
    }

    /// 스토리지 CRD 그룹/버전을 설정합니다.
    pub fn storage_api(mut self, group: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.storage_group = group.into();
        self.config.storage_version = version.into();
        self
    }

    /// 설정을 검증하고 `WatcherConfig`를 생성합니다.
    pub fn build(self) -> Result<WatcherConfig, WatcherError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
