//! CLI argument definitions for ironwatch-operator.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use ironwatch_core::config::IronwatchConfig;

/// Ironwatch workload/SBOM correlation operator.
///
/// Watches running pods and SBOM storage artifacts, deletes orphaned
/// artifacts and emits scan commands for newly observed images.
#[derive(Parser, Debug)]
#[command(name = "ironwatch-operator")]
#[command(version, about, long_about = None)]
pub struct OperatorCli {
    /// Path to ironwatch.toml configuration file.
    #[arg(short, long, default_value = "/etc/ironwatch/ironwatch.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the operator.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl OperatorCli {
    /// CLI 값으로 설정을 덮어씁니다 (파일, 환경변수보다 우선).
    pub fn apply_overrides(&self, config: &mut IronwatchConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file = pid_file.clone();
        }
    }
}
