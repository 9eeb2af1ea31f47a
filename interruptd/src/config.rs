//! Configuration module for interruptd
//!
//! Handles loading and validating configuration from YAML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Interruption queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name, used in logs
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// Directory the queue transport delivers message files into
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,

    /// Maximum messages taken per receive
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            spool_dir: default_spool_dir(),
            batch_size: default_batch_size(),
        }
    }
}

/// Metrics export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics are enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Port to expose metrics on
    #[serde(default = "default_metrics_port")]
    pub port: u16,

    /// Path for metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesConfig {
    /// Reporting controller name on published Events
    #[serde(default = "default_reporter")]
    pub reporter: String,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            reporter: default_reporter(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,

    /// Reconciliation interval while the queue is idle
    #[serde(with = "humantime_serde", default = "default_interval")]
    pub interval: Duration,

    /// Messages handled concurrently per reconciliation
    #[serde(default = "default_max_concurrent_messages")]
    pub max_concurrent_messages: usize,

    /// How long a spot-interrupted offering stays unavailable
    #[serde(with = "humantime_serde", default = "default_unavailable_offerings_ttl")]
    pub unavailable_offerings_ttl: Duration,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub kubernetes: KubernetesConfig,

    /// Dry run mode - log remediation but don't mutate the cluster
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            interval: default_interval(),
            max_concurrent_messages: default_max_concurrent_messages(),
            unavailable_offerings_ttl: default_unavailable_offerings_ttl(),
            metrics: MetricsConfig::default(),
            kubernetes: KubernetesConfig::default(),
            dry_run: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.queue.name.is_empty() {
            anyhow::bail!("queue.name must not be empty");
        }
        if self.queue.batch_size == 0 {
            anyhow::bail!("queue.batch_size must be > 0");
        }
        if self.interval.is_zero() {
            anyhow::bail!("interval must be > 0");
        }
        if self.max_concurrent_messages == 0 {
            anyhow::bail!("max_concurrent_messages must be > 0");
        }
        if self.unavailable_offerings_ttl.is_zero() {
            anyhow::bail!("unavailable_offerings_ttl must be > 0");
        }
        if self.metrics.enabled && self.metrics.port == 0 {
            anyhow::bail!("metrics.port must be > 0 when metrics are enabled");
        }
        if self.metrics.enabled && !self.metrics.path.starts_with('/') {
            anyhow::bail!("metrics.path must start with '/'");
        }
        if self.kubernetes.reporter.is_empty() {
            anyhow::bail!("kubernetes.reporter must not be empty");
        }
        Ok(())
    }
}

// Default value functions
fn default_queue_name() -> String {
    "interruptd".to_string()
}

fn default_spool_dir() -> PathBuf {
    PathBuf::from("/var/lib/interruptd/queue")
}

fn default_batch_size() -> usize {
    10
}

fn default_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_max_concurrent_messages() -> usize {
    interruptd_core::controller::DEFAULT_MAX_CONCURRENT_MESSAGES
}

fn default_unavailable_offerings_ttl() -> Duration {
    interruptd_core::cache::DEFAULT_UNAVAILABLE_OFFERINGS_TTL
}

fn default_metrics_port() -> u16 {
    8080
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_reporter() -> String {
    "interruptd".to_string()
}

fn default_true() -> bool {
    true
}
