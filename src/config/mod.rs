pub mod toml_config;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "small-elt")]
#[command(about = "Wait for two Postgres databases, copy source into destination, then run dbt")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "elt.toml")]
    pub config: String,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, help = "Log process CPU and memory after each task")]
    pub monitor: bool,

    #[arg(long, help = "Run only the dump/load pipeline")]
    pub skip_transform: bool,

    /// Print what would be probed and executed without doing it
    #[arg(long)]
    pub dry_run: bool,

    /// Write a JSON run report to this path
    #[arg(long)]
    pub report: Option<String>,

    /// Override readiness.max_attempts
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Override readiness.delay_seconds
    #[arg(long)]
    pub retry_delay: Option<u64>,
}
