//! Configuration management for the mock pool
//!
//! The command line is parsed by `clap` into [`Args`], which resolves into a
//! validated [`ServerConfig`]. Timing constants live on the config so tests
//! can shorten them; their defaults are part of the protocol contract.

use crate::error::{Error, Result};
use crate::stratum::state::DEFAULT_START_HEIGHT;
use crate::utils::LogFormat;
use clap::Parser;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Port the pool listens on when none is given
pub const DEFAULT_PORT: u16 = 13333;

/// Seconds without an inbound line before a session is closed
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 120;

/// Milliseconds between an authorize reply and its `mining.notify`
pub const DEFAULT_NOTIFY_DELAY_MS: u64 = 100;

/// Seconds between block height increments
pub const DEFAULT_HEIGHT_INTERVAL_SECS: u64 = 15;

/// Longest inbound line accepted, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(
    name = "mock-stratum-server",
    version,
    about = "Mock mining pool speaking XMRig login and Stratum v1",
    long_about = "Serves deterministic synthetic jobs to miners over XMRig-style JSON-RPC \
                  and Stratum v1 on one TCP port. Every submitted share is accepted."
)]
pub struct Args {
    /// Port to listen on
    #[arg(value_name = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Block height of the first job
    #[arg(long, default_value_t = DEFAULT_START_HEIGHT)]
    pub start_height: u64,

    /// Log filter directive (e.g. `info`, `mock_stratum_server=debug`)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Print the resolved server configuration as YAML and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Resolved server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    /// Address to bind
    pub host: IpAddr,
    /// Port to listen on, 0 for an ephemeral port
    pub port: u16,
    /// Block height of the first job
    pub start_height: u64,
    /// Idle read timeout in seconds
    pub idle_timeout_secs: u64,
    /// Delay before the post-authorize `mining.notify`, in milliseconds
    pub notify_delay_ms: u64,
    /// Height ticker period in seconds
    pub height_interval_secs: u64,
    /// Longest inbound line accepted, in bytes
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            start_height: DEFAULT_START_HEIGHT,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            notify_delay_ms: DEFAULT_NOTIFY_DELAY_MS,
            height_interval_secs: DEFAULT_HEIGHT_INTERVAL_SECS,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ServerConfig {
    /// Build the server configuration from command-line arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Self {
            host: args.host,
            port: args.port,
            start_height: args.start_height,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_secs == 0 {
            return Err(Error::config("idle timeout must be non-zero"));
        }
        if self.height_interval_secs == 0 {
            return Err(Error::config("height interval must be non-zero"));
        }
        if self.max_line_length == 0 {
            return Err(Error::config("max line length must be non-zero"));
        }
        Ok(())
    }

    /// Socket address to bind
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Idle read timeout
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Delay before the post-authorize `mining.notify`
    pub fn notify_delay(&self) -> Duration {
        Duration::from_millis(self.notify_delay_ms)
    }

    /// Height ticker period
    pub fn height_interval(&self) -> Duration {
        Duration::from_secs(self.height_interval_secs)
    }

    /// Render as YAML for `--print-config`
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::config(format!("Failed to render config: {}", e)))
    }
}
