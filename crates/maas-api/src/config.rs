//! Server configuration from flags and environment

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use maas_common::retry::RetryConfig;
use maas_common::telemetry::LogFormat;
use maas_common::{DEFAULT_CONFIGMAP_NAME, DEFAULT_NAMESPACE};

/// MaaS toolbox - manage tier-to-group mappings and LLMInferenceService tiers
#[derive(Parser, Debug, Clone)]
#[command(name = "maas-toolbox", version, about, long_about = None)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Namespace holding the tier registry ConfigMap
    #[arg(long, env = "NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Name of the tier registry ConfigMap
    #[arg(long = "configmap", env = "CONFIGMAP_NAME", default_value = DEFAULT_CONFIGMAP_NAME)]
    pub configmap_name: String,

    /// Per-request deadline in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Attempts for a read-modify-write that keeps losing version races
    #[arg(long, env = "CONFLICT_RETRIES", default_value_t = 5)]
    pub conflict_retries: u32,

    /// Log output format (text or json)
    #[arg(long, env = "MAAS_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

impl Config {
    /// Address to bind
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Per-request deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Conflict retry policy for registry and annotation writes
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::with_max_attempts(self.conflict_retries)
    }
}
