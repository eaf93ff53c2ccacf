//! Resource watcher module initialization.
//!
//! Converts `IronwatchConfig.watcher` into a `WatcherConfig`, creates the
//! cluster and storage clients, builds the `ResourceWatcher`, and wraps
//! it in a `ModuleHandle`.
//!
//! # Channel Wiring
//!
//! ```text
//! ResourceWatcher --ScanCommand--> command_rx --> operator (audit log sink)
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use ironwatch_core::config::IronwatchConfig;
use ironwatch_core::event::ScanCommand;

use ironwatch_watcher::{
    ClusterClient, KubeClusterClient, KubeStorageClient, ResourceWatcherBuilder, StorageClient,
    WatcherConfig,
};

use super::ModuleHandle;

/// Registry name of the watcher module.
pub const MODULE_NAME: &str = "resource-watcher";

/// Initialize the resource watcher against the in-cluster (or kubeconfig) API.
///
/// # Returns
///
/// * `Ok(Some((ModuleHandle, Receiver<ScanCommand>)))` - Watcher initialized
/// * `Ok(None)` - Module disabled in configuration
/// * `Err(_)` - Initialization failed (e.g., no cluster credentials)
pub async fn init(
    config: &IronwatchConfig,
) -> Result<Option<(ModuleHandle, mpsc::Receiver<ScanCommand>)>> {
    if !config.watcher.enabled {
        tracing::info!("resource watcher disabled in configuration");
        return Ok(None);
    }

    let client = kube::Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create cluster client: {}", e))?;

    let cluster = Arc::new(KubeClusterClient::new(client.clone()));
    let storage = Arc::new(KubeStorageClient::new(
        client,
        config.watcher.storage_group.clone(),
        config.watcher.storage_version.clone(),
    ));

    init_with_clients(config, cluster, storage)
}

/// Initialize the resource watcher with caller-provided clients.
pub fn init_with_clients<C, S>(
    config: &IronwatchConfig,
    cluster: Arc<C>,
    storage: Arc<S>,
) -> Result<Option<(ModuleHandle, mpsc::Receiver<ScanCommand>)>>
where
    C: ClusterClient,
    S: StorageClient,
{
    if !config.watcher.enabled {
        tracing::info!("resource watcher disabled in configuration");
        return Ok(None);
    }

    tracing::info!(
        cluster_name = %config.cluster.cluster_name,
        storage_group = %config.watcher.storage_group,
        storage_version = %config.watcher.storage_version,
        "initializing resource watcher"
    );

    let (watcher, command_rx) = ResourceWatcherBuilder::new()
        .config(WatcherConfig::from_core(config))
        .cluster_client(cluster)
        .storage_client(storage)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build resource watcher: {}", e))?;

    let command_rx = command_rx
        .ok_or_else(|| anyhow::anyhow!("resource watcher builder did not produce command_rx"))?;

    let handle = ModuleHandle::new(MODULE_NAME, true, Box::new(watcher));

    Ok(Some((handle, command_rx)))
}
