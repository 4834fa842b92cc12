//! Configuration for bridged
//!
//! Every option can be set either as a command-line flag or through its
//! `BRIDGE_*` environment variable; the environment is the usual route in
//! container deployments.

use clap::Parser;
use std::path::PathBuf;

/// bridged - SpoolEase to Spoolman sync daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "bridged")]
#[command(about = "SpoolEase to Spoolman filament inventory sync daemon")]
pub struct Config {
    /// SpoolEase device hostname or IP
    #[arg(long, env = "BRIDGE_SPOOLEASE_HOST")]
    pub spoolease_host: String,

    /// SpoolEase security key the transport encryption key is derived from
    #[arg(long, env = "BRIDGE_SPOOLEASE_SECURITY_KEY")]
    pub spoolease_security_key: String,

    /// SpoolEase HTTP port
    #[arg(long, env = "BRIDGE_SPOOLEASE_PORT", default_value = "80")]
    pub spoolease_port: u16,

    /// Use HTTPS when talking to SpoolEase
    #[arg(long, env = "BRIDGE_SPOOLEASE_USE_HTTPS")]
    pub spoolease_use_https: bool,

    /// PBKDF2 salt; must match the device firmware
    #[arg(long, env = "BRIDGE_SPOOLEASE_SALT", default_value = "example_salt")]
    pub spoolease_salt: String,

    /// PBKDF2 iteration count; must match the device firmware
    #[arg(long, env = "BRIDGE_SPOOLEASE_ITERATIONS", default_value = "10000")]
    pub spoolease_iterations: u32,

    /// Spoolman hostname
    #[arg(long, env = "BRIDGE_SPOOLMAN_HOST", default_value = "spoolman")]
    pub spoolman_host: String,

    /// Spoolman port
    #[arg(long, env = "BRIDGE_SPOOLMAN_PORT", default_value = "8000")]
    pub spoolman_port: u16,

    /// Seconds between inventory polls
    #[arg(long, env = "BRIDGE_POLL_INTERVAL_SECONDS", default_value = "30")]
    pub poll_interval_seconds: u64,

    /// Seconds to wait before the first sync after startup
    #[arg(long, env = "BRIDGE_INITIAL_SYNC_DELAY", default_value = "5")]
    pub initial_sync_delay: u64,

    /// Minimum grams of consumption change before a delta is reported
    #[arg(long, env = "BRIDGE_DELTA_THRESHOLD", default_value = "0.1")]
    pub delta_threshold: f64,

    /// Path of the persistent tag mapping file
    #[arg(long, env = "BRIDGE_MAPPING_FILE_PATH", default_value = "/data/mapping.json")]
    pub mapping_file_path: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BRIDGE_LOG_LEVEL", default_value = "INFO")]
    pub log_level: String,

    /// Spoolman extra-field key holding the NFC tag id
    #[arg(long, env = "BRIDGE_SPOOLMAN_TAG_ID_FIELD", default_value = "spoolease_tag_id")]
    pub spoolman_tag_id_field: String,

    /// Spoolman extra-field key holding the SpoolEase spool id
    #[arg(
        long,
        env = "BRIDGE_SPOOLMAN_SPOOLEASE_ID_FIELD",
        default_value = "spoolease_id"
    )]
    pub spoolman_spoolease_id_field: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.spoolease_security_key.is_empty() {
            anyhow::bail!("SpoolEase security key cannot be empty");
        }
        if self.poll_interval_seconds == 0 {
            anyhow::bail!("Poll interval must be at least 1 second");
        }
        if self.delta_threshold < 0.0 {
            anyhow::bail!("Delta threshold cannot be negative");
        }
        Ok(())
    }

    pub fn spoolease_base_url(&self) -> String {
        let scheme = if self.spoolease_use_https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.spoolease_host, self.spoolease_port)
    }

    pub fn spoolman_base_url(&self) -> String {
        format!("http://{}:{}", self.spoolman_host, self.spoolman_port)
    }

    pub fn spoolman_ws_url(&self) -> String {
        format!("ws://{}:{}", self.spoolman_host, self.spoolman_port)
    }
}
