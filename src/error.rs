//! Error taxonomy for the reactive signal runtime.
//!
//! Every fallible operation in this crate returns [`RuntimeError`]. The
//! variants mirror the error names a caller would see surfaced as
//! `workflow:error` or `agent:failed` payloads, and [`RuntimeError::classify`]
//! groups them into the coarser [`ErrorClass`] used to pick a run's outcome
//! and to decide whether a failure aborts the run or is merely recorded.
//!
//! # Examples
//!
//! ```
//! use signalrt::error::{RuntimeError, ErrorClass};
//!
//! let err = RuntimeError::NoProvider("summarizer".into());
//! assert_eq!(err.to_string(), "no provider resolved for agent: summarizer");
//! assert_eq!(err.classify(), ErrorClass::Fatal);
//! ```

use std::error::Error;
use std::fmt;

/// All errors produced while configuring or driving a workflow run.
///
/// Hand-rolled rather than derived via `thiserror`, matching the rest of
/// this codebase's error enums (e.g. `OrchestrationError`).
#[derive(Debug, Clone)]
pub enum RuntimeError {
    /// Invalid recording options, an unknown agent reference, a malformed
    /// pattern, or an `updates` field not declared in the initial state.
    /// Raised synchronously before any signal is emitted.
    ConfigError(String),

    /// An activation needed a provider (no per-agent override, no default)
    /// and none resolved. Fatal for the run.
    NoProvider(String),

    /// A live provider invocation failed (network, rate limit, malformed
    /// stream). Surfaces as `agent:failed`; terminates the run.
    ProviderError(String),

    /// The run exceeded its configured timeout before reaching quiescence.
    TimeoutError,

    /// Replay scanned to the end of the recording without finding a
    /// terminating `provider:end` signal for the current activation.
    ReplayExhausted,

    /// `replay` mode was requested with a recording id the store does not
    /// know about.
    RecordingNotFound(String),

    /// `append`/`appendBatch`/`checkpoint` was called on a recording that
    /// has already been finalized.
    StoreFinalized(String),

    /// A reducer returned an error while handling a matching signal.
    ReducerError(String),

    /// A bus subscriber (other than a reducer or agent activation) returned
    /// an error while handling a matching signal.
    SubscriberError(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::ConfigError(msg) => write!(f, "invalid workflow configuration: {}", msg),
            RuntimeError::NoProvider(agent) => write!(f, "no provider resolved for agent: {}", agent),
            RuntimeError::ProviderError(msg) => write!(f, "provider error: {}", msg),
            RuntimeError::TimeoutError => write!(f, "workflow run timed out"),
            RuntimeError::ReplayExhausted => write!(f, "replay exhausted before provider:end"),
            RuntimeError::RecordingNotFound(id) => write!(f, "recording not found: {}", id),
            RuntimeError::StoreFinalized(id) => write!(f, "recording already finalized: {}", id),
            RuntimeError::ReducerError(msg) => write!(f, "reducer error: {}", msg),
            RuntimeError::SubscriberError(msg) => write!(f, "subscriber error: {}", msg),
        }
    }
}

impl Error for RuntimeError {}

/// Coarse classification of a [`RuntimeError`], used to pick a run's
/// `outcome` for telemetry and to decide propagation (§7's last paragraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Aborts the run outright: `ConfigError`, `NoProvider`, `ProviderError`,
    /// `TimeoutError`.
    Fatal,
    /// `ReplayExhausted`, `RecordingNotFound`, `StoreFinalized`.
    ReplayError,
    /// A reducer failed; whether this aborts the run depends on whether it
    /// was thrown synchronously (see [`RuntimeError`] docs).
    ReducerError,
    /// A bus subscriber failed; always isolated, never aborts the run.
    SubscriberError,
}

impl RuntimeError {
    /// Group this error into its [`ErrorClass`].
    pub fn classify(&self) -> ErrorClass {
        match self {
            RuntimeError::ConfigError(_)
            | RuntimeError::NoProvider(_)
            | RuntimeError::ProviderError(_)
            | RuntimeError::TimeoutError => ErrorClass::Fatal,
            RuntimeError::ReplayExhausted
            | RuntimeError::RecordingNotFound(_)
            | RuntimeError::StoreFinalized(_) => ErrorClass::ReplayError,
            RuntimeError::ReducerError(_) => ErrorClass::ReducerError,
            RuntimeError::SubscriberError(_) => ErrorClass::SubscriberError,
        }
    }

    /// The error name as it appears in `workflow:error`/`agent:failed`
    /// payloads (e.g. `"TimeoutError"`).
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeError::ConfigError(_) => "ConfigError",
            RuntimeError::NoProvider(_) => "NoProvider",
            RuntimeError::ProviderError(_) => "ProviderError",
            RuntimeError::TimeoutError => "TimeoutError",
            RuntimeError::ReplayExhausted => "ReplayExhausted",
            RuntimeError::RecordingNotFound(_) => "RecordingNotFound",
            RuntimeError::StoreFinalized(_) => "StoreFinalized",
            RuntimeError::ReducerError(_) => "ReducerError",
            RuntimeError::SubscriberError(_) => "SubscriberError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_fatal_errors() {
        assert_eq!(RuntimeError::ConfigError("x".into()).classify(), ErrorClass::Fatal);
        assert_eq!(RuntimeError::NoProvider("x".into()).classify(), ErrorClass::Fatal);
        assert_eq!(RuntimeError::ProviderError("x".into()).classify(), ErrorClass::Fatal);
        assert_eq!(RuntimeError::TimeoutError.classify(), ErrorClass::Fatal);
    }

    #[test]
    fn classifies_replay_errors() {
        assert_eq!(RuntimeError::ReplayExhausted.classify(), ErrorClass::ReplayError);
        assert_eq!(
            RuntimeError::RecordingNotFound("r1".into()).classify(),
            ErrorClass::ReplayError
        );
        assert_eq!(
            RuntimeError::StoreFinalized("r1".into()).classify(),
            ErrorClass::ReplayError
        );
    }

    #[test]
    fn names_match_taxonomy() {
        assert_eq!(RuntimeError::TimeoutError.name(), "TimeoutError");
        assert_eq!(RuntimeError::ReducerError("boom".into()).name(), "ReducerError");
    }
}
