//! Controller configuration.
//!
//! Defaults match the recognized configuration surface: watch namespace,
//! diagnosis service base URL, log tail line count, confidence threshold,
//! and the dry-run flag, plus the timing knobs of the watch supervisor and
//! the replace fallback. Loadable from a mounted YAML file with every field
//! optional; individual fields can then be overridden from the CLI.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main controller configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediatorConfig {
    /// Namespace whose pods are watched and remediated
    pub namespace: String,

    /// Base URL of the diagnosis service (`POST {analysis_url}/analyze`)
    pub analysis_url: String,

    /// Number of log lines included in a diagnosis request
    pub log_tail_lines: i64,

    /// Minimum confidence score (0-100) required to touch cluster state
    pub confidence_threshold: f64,

    /// When set, the pipeline runs to the decision but only logs the
    /// would-be patch instead of mutating anything
    pub dry_run: bool,

    /// Maximum number of concurrently running remediation tasks
    pub worker_concurrency: usize,

    /// Fixed delay before resubscribing after an abnormal watch closure
    pub reconnect_delay_secs: u64,

    /// Interval between deletion-poll checks in the replace fallback
    pub deletion_poll_interval_secs: u64,

    /// Ceiling on the deletion poll; reaching it aborts the replace
    pub deletion_timeout_secs: u64,

    /// Port for the HTTP health endpoint
    pub health_port: u16,
}

impl Default for RemediatorConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            analysis_url: "http://localhost:8000".to_string(),
            log_tail_lines: 50,
            confidence_threshold: 90.0,
            dry_run: false,
            worker_concurrency: 5,
            reconnect_delay_secs: 5,
            deletion_poll_interval_secs: 1,
            deletion_timeout_secs: 30,
            health_port: 8080,
        }
    }
}

impl RemediatorConfig {
    /// Load configuration from a mounted YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("failed to read config file: {e}")))?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse config file: {e}")))?;
        Ok(config)
    }

    /// Validate configuration values before startup.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::Config("namespace must not be empty".to_string()));
        }
        if !self.analysis_url.starts_with("http://") && !self.analysis_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "analysis_url must be an http(s) URL, got '{}'",
                self.analysis_url
            )));
        }
        if !(0.0..=100.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence_threshold must be within 0-100, got {}",
                self.confidence_threshold
            )));
        }
        if self.log_tail_lines <= 0 {
            return Err(Error::Config("log_tail_lines must be positive".to_string()));
        }
        if self.worker_concurrency == 0 {
            return Err(Error::Config(
                "worker_concurrency must be at least 1".to_string(),
            ));
        }
        if self.deletion_poll_interval_secs == 0
            || self.deletion_poll_interval_secs > self.deletion_timeout_secs
        {
            return Err(Error::Config(
                "deletion_poll_interval_secs must be positive and no larger than deletion_timeout_secs"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
