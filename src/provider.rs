//! The `LLMProvider` collaborator contract.
//!
//! The runtime never speaks an LLM wire protocol itself; it drives whatever
//! implements [`LLMProvider`] the same way it would drive a live HTTP
//! client or a recorded fixture. This mirrors the teacher's `ClientWrapper`
//! trait — a thin async boundary the core depends on without knowing which
//! vendor sits behind it.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;
use crate::signal::Signal;

/// One turn of conversation context handed to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: String,
    pub content: String,
}

/// Input assembled from an agent's expanded prompt template and the
/// activation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInput {
    pub system: Option<String>,
    pub messages: Vec<ProviderMessage>,
}

/// Per-activation context handed alongside [`ProviderInput`].
#[derive(Clone)]
pub struct ProviderContext {
    /// Id of the run, stable across every activation within it.
    pub run_id: String,
    /// Cooperative cancellation, fired by the scheduler on timeout or when
    /// an external abort signal is observed.
    pub cancellation: CancellationToken,
}

/// A stream of [`Signal`]s produced while servicing one activation. Must
/// end with a signal named `provider:end` whose payload includes
/// `{output, usage?}`; intermediate signals may be prefixed `text:`,
/// `tool:`, `thinking:`, `provider:`.
pub type ProviderSignalStream<'a> = BoxStream<'a, Signal>;

/// External collaborator that turns an activation into a signal stream.
///
/// Implementations typically wrap a vendor HTTP client. This crate ships no
/// concrete implementation; test doubles (`ScriptedProvider`, `ErrorProvider`)
/// live alongside the integration tests that use them.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Drive one activation to completion, yielding signals as they're
    /// produced. The stream's last item must be `provider:end`.
    async fn run<'a>(&'a self, input: ProviderInput, ctx: ProviderContext) -> Result<ProviderSignalStream<'a>, RuntimeError>;

    /// Human-readable identifier, used in `source.provider` and telemetry.
    fn name(&self) -> &str;
}

/// Extract the `output` field from a `provider:end` signal's payload.
///
/// Returns `None` if `signal` isn't named `provider:end` or its payload
/// doesn't carry an `output` key.
pub fn extract_output(signal: &Signal) -> Option<&serde_json::Value> {
    if signal.name != "provider:end" {
        return None;
    }
    signal.payload.get("output")
}

/// Extract the optional `usage` field from a `provider:end` signal's
/// payload, used by the telemetry aggregator to sum token counts.
pub fn extract_usage(signal: &Signal) -> Option<&serde_json::Value> {
    if signal.name != "provider:end" && signal.name != "harness:end" {
        return None;
    }
    signal.payload.get("usage")
}
