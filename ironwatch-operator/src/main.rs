use anyhow::Result;
use clap::Parser;

use ironwatch_core::config::IronwatchConfig;
use ironwatch_operator::cli::OperatorCli;
use ironwatch_operator::logging::init_tracing;
use ironwatch_operator::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = OperatorCli::parse();

    // 파일 -> 환경변수 -> CLI 순으로 덮어씀
    let mut config = IronwatchConfig::from_file(&cli.config).await.map_err(|e| {
        anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e)
    })?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        println!("configuration is valid: {}", cli.config.display());
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        cluster_name = %config.cluster.cluster_name,
        "ironwatch-operator starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("ironwatch-operator shut down");
    Ok(())
}
