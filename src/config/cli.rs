use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "trand")]
#[command(about = "Scheduled crypto market reports: OHLCV, indicators, LLM analysis, webhook")]
pub struct CliConfig {
    #[arg(long, help = "Run one report immediately and exit")]
    pub once: bool,

    #[arg(long, help = "TOML config file; environment variables override it")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Fetch data and print the prompt without calling the completion API")]
    pub dry_run: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, help = "Log process CPU and memory around each run")]
    pub monitor: bool,
}
