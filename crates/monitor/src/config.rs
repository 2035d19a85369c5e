//! Process configuration. Everything is supplied once at startup, via flags
//! or environment, and immutable afterwards; missing required values abort
//! before any monitoring begins.

use crate::probe::{
    NodePair,
    NodeRole,
    PairConfigError,
};
use clap::Parser;
use std::{
    path::PathBuf,
    time::Duration,
};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser, Debug, Clone)]
#[command(name = "stakewatch", version, about = "Ethereum validator and node-health monitor", long_about = None)]
pub struct Config {
    /// Telegram bot token used for notifications and commands
    #[arg(long, env = "TELEGRAM_BOT_TOKEN")]
    pub telegram_bot_token: String,
    /// Telegram chat id notifications are delivered to
    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: String,
    /// Primary beacon node REST endpoint
    #[arg(long, env = "PRIMARY_BEACON_NODE_URL")]
    pub primary_beacon_url: Url,
    /// Primary execution node JSON-RPC endpoint
    #[arg(long, env = "PRIMARY_EXECUTION_NODE_URL")]
    pub primary_execution_url: Url,
    /// Fallback beacon node REST endpoint
    #[arg(long, env = "FALLBACK_BEACON_NODE_URL")]
    pub fallback_beacon_url: Option<Url>,
    /// Fallback execution node JSON-RPC endpoint
    #[arg(long, env = "FALLBACK_EXECUTION_NODE_URL")]
    pub fallback_execution_url: Option<Url>,
    /// Comma-separated validator indices to monitor
    #[arg(long, env = "VALIDATOR_INDICES", value_delimiter = ',', required = true)]
    pub validator_indices: Vec<u64>,
    /// Seconds between monitoring ticks
    #[arg(long, env = "CHECK_INTERVAL_SECONDS", default_value = "12")]
    pub check_interval_seconds: u64,
    /// Log file path; also backs the /logs command when set
    #[arg(long, env = "STAKEWATCH_LOG_FILE")]
    pub log_file: Option<PathBuf>,
    /// Log level
    #[arg(long, env = "STAKEWATCH_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

impl Config {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn primary_pair(&self) -> Result<NodePair, PairConfigError> {
        NodePair::new(
            NodeRole::Primary,
            Some(self.primary_beacon_url.clone()),
            Some(self.primary_execution_url.clone()),
        )
    }

    /// The fallback pair may be absent entirely; it then probes as
    /// not-configured rather than failing startup.
    pub fn fallback_pair(&self) -> Result<NodePair, PairConfigError> {
        NodePair::new(
            NodeRole::Fallback,
            self.fallback_beacon_url.clone(),
            self.fallback_execution_url.clone(),
        )
    }
}
