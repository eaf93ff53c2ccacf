//! Module orchestration -- assembly, channel wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `ironwatch-operator`.
//! It validates configuration, installs the metrics recorder, builds the
//! enabled modules, drains the outbound scan-command queue, and runs the
//! main loop until a shutdown signal arrives.
//!
//! # Startup Order
//!
//! 1. PID file
//! 2. Modules (resource watcher)
//! 3. Background tasks (scan-command logger, uptime updater)
//!
//! # Shutdown Order
//!
//! 1. Background tasks (broadcast)
//! 2. Modules, in reverse registration order
//! 3. PID file removal

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use ironwatch_core::config::IronwatchConfig;
use ironwatch_core::event::ScanCommand;
use ironwatch_core::metrics as m;

use crate::health::{OperatorHealth, aggregate_status};
use crate::metrics_server;
use crate::modules::{self, ModuleRegistry};

/// Interval between aggregated health log lines.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Interval between uptime gauge updates.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// The main operator orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: IronwatchConfig,
    /// Registry of all modules (ordered for start/stop).
    modules: ModuleRegistry,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Operator start time (for uptime reporting).
    start_time: Instant,
    /// Outbound scan commands, taken by the logger task on start.
    command_rx: Option<mpsc::Receiver<ScanCommand>>,
    /// Background tasks spawned by `start`.
    tasks: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Load `ironwatch.toml` (with environment overrides) and build the orchestrator.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = IronwatchConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Installs the Prometheus recorder when `metrics.enabled` and
    /// initializes the resource watcher when `watcher.enabled`.
    pub async fn build_from_config(config: IronwatchConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            let addr = metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(listen_addr = %addr, "metrics endpoint enabled");
        }

        let mut registry = ModuleRegistry::new();
        let mut command_rx = None;

        if let Some((handle, rx)) = modules::watcher::init(&config).await? {
            registry.register(handle);
            command_rx = Some(rx);
        }

        Self::from_modules(config, registry, command_rx)
    }

    /// Assemble the orchestrator from already-built modules.
    pub fn from_modules(
        config: IronwatchConfig,
        modules: ModuleRegistry,
        command_rx: Option<mpsc::Receiver<ScanCommand>>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let (shutdown_tx, _) = broadcast::channel(16);

        tracing::info!(
            total_modules = modules.count(),
            enabled_modules = modules.enabled_count(),
            "orchestrator initialized"
        );

        if config.metrics.enabled {
            record_operator_metrics(modules.count());
        }

        Ok(Self {
            config,
            modules,
            shutdown_tx,
            start_time: Instant::now(),
            command_rx,
            tasks: Vec::new(),
        })
    }

    /// Start all modules, enter the main loop and shut down on SIGTERM/SIGINT.
    ///
    /// An aggregated health line is logged every 30 seconds while running.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let signal = wait_for_shutdown_signal();
        tokio::pin!(signal);
        let mut health_tick = tokio::time::interval(HEALTH_LOG_INTERVAL);
        health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("entering main loop");
        loop {
            tokio::select! {
                result = &mut signal => {
                    let name = result?;
                    tracing::info!(signal = name, "shutdown signal received");
                    break;
                }
                _ = health_tick.tick() => {
                    self.log_health().await;
                }
            }
        }

        self.shutdown().await
    }

    /// Write the PID file, start all modules and spawn background tasks.
    ///
    /// On failure, already-started modules are stopped and the PID file is removed.
    pub async fn start(&mut self) -> Result<()> {
        if let Some(path) = self.pid_path() {
            write_pid_file(path)?;
        }

        tracing::info!("starting all modules");
        if let Err(e) = self.modules.start_all().await {
            tracing::warn!("startup failed, rolling back already-started modules");
            if let Err(stop_err) = self.modules.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            if let Some(path) = self.pid_path() {
                remove_pid_file(path);
            }
            return Err(e);
        }

        if let Some(command_rx) = self.command_rx.take() {
            let shutdown_rx = self.shutdown_tx.subscribe();
            self.tasks.push(spawn_command_logger(command_rx, shutdown_rx));
        }

        if self.config.metrics.enabled {
            let shutdown_rx = self.shutdown_tx.subscribe();
            self.tasks.push(spawn_uptime_updater(self.start_time, shutdown_rx));
        }

        Ok(())
    }

    /// Stop background tasks and modules, then remove the PID file.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("broadcasting shutdown signal to all tasks");
        let _ = self.shutdown_tx.send(());
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }

        tracing::info!("stopping all modules");
        let result = self.modules.stop_all().await;

        if let Some(path) = self.pid_path() {
            remove_pid_file(path);
        }

        result
    }

    /// Current aggregated health report.
    pub async fn health(&self) -> OperatorHealth {
        let modules = self.modules.health_statuses().await;
        let uptime_secs = self.start_time.elapsed().as_secs();
        if self.config.metrics.enabled {
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        OperatorHealth {
            status: aggregate_status(&modules),
            uptime_secs,
            modules,
        }
    }

    /// Loaded configuration.
    pub fn config(&self) -> &IronwatchConfig {
        &self.config
    }

    async fn log_health(&self) {
        let report = self.health().await;
        let modules = serde_json::to_string(&report.modules).unwrap_or_default();
        if report.status.is_healthy() {
            tracing::debug!(uptime_secs = report.uptime_secs, modules = %modules, "health check");
        } else {
            tracing::warn!(
                status = %report.status,
                uptime_secs = report.uptime_secs,
                modules = %modules,
                "operator not fully healthy"
            );
        }
    }

    fn pid_path(&self) -> Option<&Path> {
        if self.config.general.pid_file.is_empty() {
            None
        } else {
            Some(Path::new(&self.config.general.pid_file))
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT) and return its name.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create the file (no TOCTOU race)
/// - Verifies the created file is a regular file
/// - Creates the parent directory with 0o700 and the file with 0o600
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file. Logs a warning if it cannot be removed.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Spawn a task that logs every emitted scan command for audit.
///
/// The scan executor itself runs outside this process; this sink keeps the
/// queue drained so the watcher never blocks on a full channel.
pub fn spawn_command_logger(
    mut command_rx: mpsc::Receiver<ScanCommand>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(command) => {
                            let containers: Vec<String> = command
                                .containers
                                .iter()
                                .map(|(name, image)| format!("{name}={image}"))
                                .collect();
                            tracing::info!(
                                command_id = %command.id,
                                command = %command.command_name,
                                wlid = %command.wlid,
                                containers = %containers.join(","),
                                trace_id = %command.metadata.trace_id,
                                "scan command emitted"
                            );
                        }
                        None => {
                            tracing::debug!("scan command channel closed, exiting logger");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("scan command logger shutting down");
                    break;
                }
            }
        }
    })
}

/// Record operator-level gauges (build info, modules registered).
fn record_operator_metrics(module_count: usize) {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_MODULES_REGISTERED).set(module_count as f64);

    tracing::debug!(
        module_count = module_count,
        version = env!("CARGO_PKG_VERSION"),
        "operator metrics recorded"
    );
}

/// Spawn a task that refreshes the uptime gauge every 10 seconds.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
