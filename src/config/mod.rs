//! Configuration module for Multipart Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.
//!
//! # Example
//!
//! ```yaml
//! s3:
//!   region: "${AWS_REGION:-eu-north-1}"
//!   endpoint: "http://localhost:9000"
//!   access_key: "${AWS_ACCESS_KEY_ID}"
//!   secret_key: "${AWS_SECRET_ACCESS_KEY}"
//! upload:
//!   part_size: 67108864
//!   small_tail_threshold: 1048576
//!   max_concurrent_transfers: 48
//! ```

use crate::pool::digest::DEFAULT_POOL_CAPACITY;
use crate::pool::ChecksumAlgorithm;
use crate::split::{PartitionPolicy, SplitError, ONE_M, SIZE_64M};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::{expand_env_vars, ConfigLoader};

/// Longest presigned URL validity accepted by S3 (7 days)
pub const MAX_PRESIGN_VALIDITY_SECS: u64 = 7 * 24 * 3600;

/// Region used when neither the configuration nor `AWS_REGION` names one
pub const FALLBACK_REGION: &str = "eu-north-1";

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<SplitError> for ConfigError {
    fn from(e: SplitError) -> Self {
        ConfigError::ValidationError(e.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3.region.trim().is_empty() {
            return Err(ConfigError::ValidationError("Region cannot be empty".into()));
        }

        if let Some(endpoint) = self.s3.endpoint() {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid S3 endpoint '{}': must start with http:// or https://",
                    endpoint
                )));
            }
        }

        if self.s3.access_key.is_some() != self.s3.secret_key.is_some() {
            return Err(ConfigError::ValidationError(
                "access_key and secret_key must be set together".into(),
            ));
        }

        self.upload.validate()
    }
}

/// S3 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl S3Config {
    /// Custom endpoint, treating an empty value as unset
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().filter(|e| !e.trim().is_empty())
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
        }
    }
}

fn default_region() -> String {
    std::env::var("AWS_REGION").unwrap_or_else(|_| FALLBACK_REGION.to_string())
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Target part size in bytes
    #[serde(default = "default_part_size")]
    pub part_size: u64,
    /// Trailing remainders up to this size are merged into the last part
    #[serde(default = "default_small_tail_threshold")]
    pub small_tail_threshold: u64,
    /// Part callbacks scheduled at once
    #[serde(default = "default_dispatch_concurrency")]
    pub dispatch_concurrency: usize,
    /// Part transfers in flight at once
    #[serde(default = "default_max_concurrent_transfers")]
    pub max_concurrent_transfers: usize,
    /// Idle digest instances retained
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,
    #[serde(default)]
    pub checksum: ChecksumAlgorithm,
    #[serde(default = "default_presign_validity")]
    pub presign_validity_secs: u64,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl UploadConfig {
    /// Partition policy described by this configuration
    pub fn policy(&self) -> Result<PartitionPolicy, SplitError> {
        PartitionPolicy::new(self.part_size, self.small_tail_threshold)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy()?;

        if self.dispatch_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch_concurrency must be greater than zero".into(),
            ));
        }

        if self.max_concurrent_transfers == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_transfers must be greater than zero".into(),
            ));
        }

        if self.pool_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "pool_capacity must be greater than zero".into(),
            ));
        }

        if self.presign_validity_secs == 0
            || self.presign_validity_secs > MAX_PRESIGN_VALIDITY_SECS
        {
            return Err(ConfigError::ValidationError(format!(
                "presign_validity_secs {} must be between 1 and {}",
                self.presign_validity_secs, MAX_PRESIGN_VALIDITY_SECS
            )));
        }

        Ok(())
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            small_tail_threshold: default_small_tail_threshold(),
            dispatch_concurrency: default_dispatch_concurrency(),
            max_concurrent_transfers: default_max_concurrent_transfers(),
            pool_capacity: default_pool_capacity(),
            checksum: ChecksumAlgorithm::default(),
            presign_validity_secs: default_presign_validity(),
            request_timeout_secs: None,
        }
    }
}

fn default_part_size() -> u64 {
    SIZE_64M
}

fn default_small_tail_threshold() -> u64 {
    ONE_M
}

fn default_dispatch_concurrency() -> usize {
    64
}

fn default_max_concurrent_transfers() -> usize {
    48
}

fn default_pool_capacity() -> usize {
    DEFAULT_POOL_CAPACITY
}

fn default_presign_validity() -> u64 {
    600 // 10 minutes
}

/// Metrics configuration
///
/// Metrics are kept in the process-wide Prometheus registry; when a
/// textfile path is set they are written there after each run, in the
/// text exposition format read by node_exporter's textfile collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            textfile: None,
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}
