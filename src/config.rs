//! Runtime-wide defaults, independent of any single workflow run.
//!
//! Mirrors the minimal-struct-with-`Default`-impl shape used elsewhere in
//! this codebase for global configuration: users construct it however they
//! want, no file-format parsing dependency is introduced.
//!
//! # Example
//!
//! ```rust
//! use signalrt::config::RuntimeConfig;
//! use std::time::Duration;
//!
//! let config = RuntimeConfig::default();
//! assert_eq!(config.default_timeout(), None);
//!
//! let config = RuntimeConfig {
//!     default_timeout_ms: Some(30_000),
//!     ..RuntimeConfig::default()
//! };
//! assert_eq!(config.default_timeout(), Some(Duration::from_millis(30_000)));
//! ```

use std::time::Duration;

use crate::telemetry::SamplingConfig;

/// Global defaults for runs that don't override them explicitly.
///
/// This struct is intentionally minimal; per-run options (agents, state,
/// recording mode, an explicit `timeout`) are supplied separately via
/// [`WorkflowConfig`](crate::scheduler::WorkflowConfig), which falls back to
/// [`RuntimeConfig::default_timeout`] when its own `timeout` is unset.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Default telemetry sampling rate, used by [`RuntimeConfig::default_sampling`]
    /// to build a [`SamplingConfig`] for callers that don't supply their own.
    pub default_sample_rate: f64,

    /// Default run-level timeout in milliseconds, applied when a
    /// `WorkflowConfig` doesn't set its own `timeout`. `None` means no
    /// timeout.
    pub default_timeout_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    /// Full sampling, no default timeout.
    fn default() -> Self {
        Self {
            default_sample_rate: 1.0,
            default_timeout_ms: None,
        }
    }
}

impl RuntimeConfig {
    /// `default_timeout_ms` as a [`Duration`], for `WorkflowConfig`'s
    /// timeout fallback.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// A [`SamplingConfig`] seeded with `default_sample_rate`, for callers
    /// that want this runtime's default sampling behavior without
    /// constructing one field-by-field.
    pub fn default_sampling(&self) -> SamplingConfig {
        SamplingConfig {
            rate: self.default_sample_rate,
            ..SamplingConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_timeout() {
        let config = RuntimeConfig::default();
        assert!(config.default_timeout().is_none());
    }

    #[test]
    fn default_sampling_carries_the_configured_rate() {
        let config = RuntimeConfig {
            default_sample_rate: 0.5,
            ..RuntimeConfig::default()
        };
        assert_eq!(config.default_sampling().rate, 0.5);
    }
}
