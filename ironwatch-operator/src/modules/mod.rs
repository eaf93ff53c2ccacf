//! 모듈 레지스트리
//!
//! 엔진마다 [`DynPipeline`]을 [`ModuleHandle`]로 감싸 등록합니다.
//! [`ModuleRegistry`]는 등록 순서대로 시작하고 역순으로 정지하며,
//! 비활성 모듈은 시작/정지 대상에서 빠지고 건강 상태는 항상 `Healthy`입니다.

pub mod watcher;

use anyhow::Context;
use tracing::{debug, error, info};

use ironwatch_core::error::{IronwatchError, PipelineError};
use ironwatch_core::pipeline::{DynPipeline, HealthStatus};

use crate::health::ModuleHealth;

/// 등록된 모듈 하나 (이름 + 활성 여부 + 파이프라인)
pub struct ModuleHandle {
    /// 로그와 건강 보고에 쓰는 모듈 이름
    pub name: String,
    /// 설정상 활성 여부
    pub enabled: bool,
    /// 생명주기 구현체
    pub pipeline: Box<dyn DynPipeline>,
}

impl ModuleHandle {
    pub fn new(name: impl Into<String>, enabled: bool, pipeline: Box<dyn DynPipeline>) -> Self {
        Self {
            name: name.into(),
            enabled,
            pipeline,
        }
    }

    /// 모듈 건강 상태. 비활성 모듈은 파이프라인에 묻지 않습니다.
    pub async fn health_check(&self) -> HealthStatus {
        if self.enabled {
            self.pipeline.health_check().await
        } else {
            HealthStatus::Healthy
        }
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        info!(module = %self.name, "starting module");
        self.pipeline
            .start()
            .await
            .with_context(|| format!("module '{}' failed to start", self.name))?;
        info!(module = %self.name, "module started");
        Ok(())
    }

    /// 정지합니다. 시작된 적 없는 모듈(`NotRunning`)은 성공으로 봅니다.
    async fn stop(&mut self) -> Result<(), IronwatchError> {
        info!(module = %self.name, "stopping module");
        match self.pipeline.stop().await {
            Ok(()) => {
                info!(module = %self.name, "module stopped");
                Ok(())
            }
            Err(IronwatchError::Pipeline(PipelineError::NotRunning)) => {
                debug!(module = %self.name, "module was not running");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn report(&self, status: HealthStatus) -> ModuleHealth {
        ModuleHealth {
            name: self.name.clone(),
            enabled: self.enabled,
            status,
        }
    }
}

/// 오퍼레이터 모듈 목록
#[derive(Default)]
pub struct ModuleRegistry {
    /// 등록 순서 = 시작 순서 (생산자 먼저)
    modules: Vec<ModuleHandle>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 모듈을 등록합니다. 생산자를 소비자보다 먼저 등록해야 합니다.
    pub fn register(&mut self, handle: ModuleHandle) {
        self.modules.push(handle);
    }

    /// 활성 모듈을 등록 순서대로 시작합니다.
    ///
    /// 첫 실패에서 멈추고 이미 시작된 모듈은 되돌리지 않습니다.
    /// 롤백은 호출 측에서 [`stop_all`](Self::stop_all)로 합니다.
    pub async fn start_all(&mut self) -> anyhow::Result<()> {
        for handle in self.modules.iter_mut() {
            if !handle.enabled {
                debug!(module = %handle.name, "module disabled, not starting");
                continue;
            }
            handle.start().await?;
        }
        Ok(())
    }

    /// 활성 모듈을 역순으로 정지합니다. 실패가 있어도 나머지는 계속 정지합니다.
    pub async fn stop_all(&mut self) -> anyhow::Result<()> {
        let mut failures = Vec::new();

        for handle in self.modules.iter_mut().rev().filter(|h| h.enabled) {
            if let Err(e) = handle.stop().await {
                error!(module = %handle.name, error = %e, "module stop failed");
                failures.push(format!("{}: {e}", handle.name));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("errors stopping modules: {}", failures.join("; "))
        }
    }

    /// 모듈별 건강 보고 (등록 순서)
    pub async fn health_statuses(&self) -> Vec<ModuleHealth> {
        let mut reports = Vec::with_capacity(self.modules.len());
        for handle in &self.modules {
            let status = handle.health_check().await;
            reports.push(handle.report(status));
        }
        reports
    }

    pub fn count(&self) -> usize {
        self.modules.len()
    }

    pub fn enabled_count(&self) -> usize {
        self.modules.iter().filter(|h| h.enabled).count()
    }
}
