//! Session configuration with file-based loading.
//!
//! Every field has a default, so an empty JSON object is a valid file:
//!
//! ```json
//! {
//!   "parse_workers": 4,
//!   "large_trace_threshold_bytes": 52428800,
//!   "large_trace_policy": "skip",
//!   "profiling_configurations": [
//!     {"name": "Fast sampling", "mode": "sampled", "sampling_interval_us": 100}
//!   ],
//!   "default_configuration": "Fast sampling"
//! }
//! ```

use std::path::Path;

use cpuscope_common::ProfilingConfiguration;
use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;

const DEFAULT_PARSE_WORKERS: usize = 2;
const DEFAULT_ELAPSED_TICK_MS: u64 = 100;
const DEFAULT_LARGE_TRACE_THRESHOLD_BYTES: usize = 100 * 1024 * 1024;

/// What to do with a trace larger than the configured threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LargeTracePolicy {
    /// Parse anyway
    #[default]
    Parse,
    /// Drop the trace as if the user aborted parsing
    Skip,
}

/// Tunables for a [`CaptureSession`](crate::session::CaptureSession)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Worker threads available for trace parsing and remote calls
    pub parse_workers: usize,
    /// Period of the elapsed-time notification while capturing
    pub elapsed_tick_ms: u64,
    /// Traces above this size are subject to `large_trace_policy`
    pub large_trace_threshold_bytes: usize,
    pub large_trace_policy: LargeTracePolicy,
    /// User-defined configurations, listed before the built-in ones
    pub profiling_configurations: Vec<ProfilingConfiguration>,
    /// Name of the configuration to preselect
    pub default_configuration: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            parse_workers: DEFAULT_PARSE_WORKERS,
            elapsed_tick_ms: DEFAULT_ELAPSED_TICK_MS,
            large_trace_threshold_bytes: DEFAULT_LARGE_TRACE_THRESHOLD_BYTES,
            large_trace_policy: LargeTracePolicy::default(),
            profiling_configurations: Vec::new(),
            default_configuration: None,
        }
    }
}

impl SessionConfig {
    /// Load and validate configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parse_workers == 0 {
            return Err(ConfigError::Invalid("parse_workers must be at least 1".to_string()));
        }
        if self.elapsed_tick_ms == 0 {
            return Err(ConfigError::Invalid("elapsed_tick_ms must be at least 1".to_string()));
        }
        if let Some(config) = self.profiling_configurations.iter().find(|c| c.name.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "profiling configuration with mode {:?} has no name",
                config.mode
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn elapsed_tick(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.elapsed_tick_ms)
    }

    /// Whether a trace of `len` bytes should be dropped instead of parsed
    #[must_use]
    pub fn skips_trace_of(&self, len: usize) -> bool {
        self.large_trace_policy == LargeTracePolicy::Skip && len > self.large_trace_threshold_bytes
    }
}
