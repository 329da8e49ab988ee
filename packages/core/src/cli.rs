use std::path::PathBuf;

use clap::Parser;

/// Market feature cache CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "market-feature-cache",
    version,
    about = "Cache-first resolution of computed market features across rotating data providers"
)]
pub struct Cli {
    /// Feature configuration file (overrides FEATURE_CONFIG_PATH)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// SQLite database URL (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Resolve this feature once, print it as JSON and exit
    #[arg(long)]
    pub feature: Option<String>,

    /// Role whose policy applies to the request
    #[arg(long, default_value = "free")]
    pub role: String,

    /// Cache warmer interval in seconds (overrides WARM_INTERVAL_SECONDS)
    #[arg(long)]
    pub warm_interval: Option<u64>,

    /// Prometheus textfile to rewrite after each warmer tick (overrides METRICS_FILE)
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}
