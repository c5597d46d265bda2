//! Inbound execution requests and server-side limit clamping.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sandbox::config::SandboxConfig;

/// One request to run a piece of source text.
///
/// Deserializes directly from the JSON body a boundary layer receives.
/// Limits are optional and untrusted; see [`ExecutionRequest::limits`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The program to run.
    pub source_text: String,
    /// Requested wall-clock limit in seconds.
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
    /// Requested memory ceiling in megabytes.
    #[serde(default)]
    pub memory_limit_mb: Option<i64>,
}

impl ExecutionRequest {
    /// A request that uses the configured default limits.
    pub fn new(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            timeout_seconds: None,
            memory_limit_mb: None,
        }
    }

    /// Ask for a specific timeout.
    pub fn with_timeout_seconds(mut self, secs: i64) -> Self {
        self.timeout_seconds = Some(secs);
        self
    }

    /// Ask for a specific memory ceiling.
    pub fn with_memory_limit_mb(mut self, mb: i64) -> Self {
        self.memory_limit_mb = Some(mb);
        self
    }

    /// Resolve the requested limits against `config`.
    ///
    /// Absent values take the configured default; everything is clamped to
    /// the configured `[min, max]` range, so a client can never obtain an
    /// unbounded execution.
    pub fn limits(&self, config: &SandboxConfig) -> ExecutionLimits {
        let timeout_secs = clamp(
            self.timeout_seconds,
            config.default_timeout_secs,
            config.min_timeout_secs,
            config.max_timeout_secs,
        );
        let memory_limit_mb = clamp(
            self.memory_limit_mb,
            config.default_memory_mb,
            config.min_memory_mb,
            config.max_memory_mb,
        );
        ExecutionLimits {
            timeout: Duration::from_secs(timeout_secs),
            memory_limit_mb,
        }
    }
}

fn clamp(requested: Option<i64>, default: u64, min: u64, max: u64) -> u64 {
    let min = min.max(1);
    let max = max.max(min);
    match requested {
        None => default.clamp(min, max),
        Some(value) if value <= 0 => min,
        Some(value) => (value as u64).clamp(min, max),
    }
}

/// The effective limits for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Wall-clock budget.
    pub timeout: Duration,
    /// Resident memory ceiling in megabytes.
    pub memory_limit_mb: u64,
}

impl ExecutionLimits {
    /// The memory ceiling in bytes.
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb.saturating_mul(1024 * 1024)
    }
}
