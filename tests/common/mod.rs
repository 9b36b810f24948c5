//! Test doubles for `LLMProvider`, shared across the integration suite.
//!
//! Mirrors the teacher's `MockClient` pattern (see `tests/orchestration_tests.rs`
//! in the example pack this crate was grounded on): a scripted provider that
//! replays a fixed signal sequence ending in `provider:end`, an error
//! provider for failure-path tests, and a provider that never resolves, used
//! by the timeout scenario.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use signalrt::error::RuntimeError;
use signalrt::provider::{LLMProvider, ProviderContext, ProviderInput, ProviderSignalStream};
use signalrt::signal::Signal;

/// Always yields a single `provider:end` carrying `output`.
pub struct ScriptedProvider {
    name: String,
    output: Value,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>, output: Value) -> Self {
        Self { name: name.into(), output }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn run<'a>(&'a self, _input: ProviderInput, _ctx: ProviderContext) -> Result<ProviderSignalStream<'a>, RuntimeError> {
        let end = Signal::new("provider:end", serde_json::json!({"output": self.output}), None);
        let stream: BoxStream<'a, Signal> = stream::iter(vec![end]).boxed();
        Ok(stream)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Yields an intermediate `text:delta` before the terminating `provider:end`,
/// used to exercise the "provider subsequence" replay path with more than
/// one signal between `agent:activated` and the output.
pub struct StreamingProvider {
    name: String,
    delta: String,
    output: Value,
}

impl StreamingProvider {
    pub fn new(name: impl Into<String>, delta: impl Into<String>, output: Value) -> Self {
        Self {
            name: name.into(),
            delta: delta.into(),
            output,
        }
    }
}

#[async_trait]
impl LLMProvider for StreamingProvider {
    async fn run<'a>(&'a self, _input: ProviderInput, _ctx: ProviderContext) -> Result<ProviderSignalStream<'a>, RuntimeError> {
        let delta = Signal::new("text:delta", serde_json::json!({"chunk": self.delta}), None);
        let end = Signal::new("provider:end", serde_json::json!({"output": self.output}), None);
        let stream: BoxStream<'a, Signal> = stream::iter(vec![delta, end]).boxed();
        Ok(stream)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Always fails, used to prove replay never invokes a live provider (S5)
/// and to exercise the `agent:failed` / run-termination path.
pub struct ErrorProvider {
    name: String,
}

impl ErrorProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl LLMProvider for ErrorProvider {
    async fn run<'a>(&'a self, _input: ProviderInput, _ctx: ProviderContext) -> Result<ProviderSignalStream<'a>, RuntimeError> {
        Err(RuntimeError::ProviderError(format!("{}: simulated provider failure", self.name)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Never yields `provider:end` (or anything else) — its stream sleeps
/// forever. Used by the S6 timeout scenario.
pub struct HangingProvider {
    name: String,
}

impl HangingProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl LLMProvider for HangingProvider {
    async fn run<'a>(&'a self, _input: ProviderInput, _ctx: ProviderContext) -> Result<ProviderSignalStream<'a>, RuntimeError> {
        let stream: BoxStream<'a, Signal> = stream::pending::<Signal>().boxed();
        Ok(stream)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
