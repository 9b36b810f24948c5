//! Fluent construction sugar over [`WorkflowConfig`].
//!
//! The canonical, fully specified surface is the struct-literal
//! `WorkflowConfig` itself; `WorkflowBuilder` only accumulates the same
//! fields through a `with_*` chain, in the style of this codebase's
//! `Orchestration`/`Agent` builders, then hands off to
//! [`crate::scheduler::run`]. It introduces no new semantics.
//!
//! # Example
//!
//! ```rust,no_run
//! use signalrt::agent::AgentDefinition;
//! use signalrt::workflow::WorkflowBuilder;
//!
//! # async fn run_it() -> Result<(), Box<dyn std::error::Error>> {
//! let echo = AgentDefinition::new("echo", "{{ input }}")
//!     .with_activate_on(["workflow:start"])
//!     .with_emits(["echo:done"])
//!     .with_updates("reply");
//!
//! let result = WorkflowBuilder::new()
//!     .with_agent(echo)
//!     .with_state(serde_json::json!({"reply": null}))
//!     .run()
//!     .await?;
//!
//! println!("final state: {}", result.state);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::activation::EndWhenFn;
use crate::agent::AgentDefinition;
use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::provider::LLMProvider;
use crate::recording::{RecordingMode, RecordingOptions};
use crate::scheduler::{self, Reducer, RunResult, WorkflowConfig};
use crate::store::SignalStore;

/// Accumulates a [`WorkflowConfig`] through a fluent `with_*` chain.
#[derive(Default)]
pub struct WorkflowBuilder {
    config: WorkflowConfig,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, agent: AgentDefinition) -> Self {
        self.config.agents.insert(agent.name.clone(), agent);
        self
    }

    pub fn with_agents<I: IntoIterator<Item = AgentDefinition>>(mut self, agents: I) -> Self {
        for agent in agents {
            self.config.agents.insert(agent.name.clone(), agent);
        }
        self
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.config.state = state;
        self
    }

    /// The workflow's original external input, resolved by `{{ input }}`
    /// in agent prompts.
    pub fn with_input(mut self, input: Value) -> Self {
        self.config.input = input;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn with_end_when(mut self, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.config.end_when = Some(Arc::new(predicate));
        self
    }

    pub fn with_reducer(mut self, pattern: impl Into<String>, reducer: Reducer) -> Self {
        self.config.reducers.push((pattern.into(), reducer));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.config.cancellation = Some(token);
        self
    }

    /// Runtime-wide defaults (currently: a fallback timeout) this run
    /// honors when the corresponding per-run option above is left unset.
    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.config.runtime = runtime;
        self
    }

    pub fn live(mut self) -> Self {
        self.config.recording.mode = Some(RecordingMode::Live);
        self
    }

    pub fn record(mut self, store: Arc<dyn SignalStore>) -> Self {
        self.config.recording.mode = Some(RecordingMode::Record);
        self.config.recording.store = Some(store);
        self
    }

    pub fn with_recording_name(mut self, name: impl Into<String>) -> Self {
        self.config.recording.name = Some(name.into());
        self
    }

    pub fn with_recording_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.recording.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn replay(mut self, store: Arc<dyn SignalStore>, recording_id: impl Into<String>) -> Self {
        self.config.recording.mode = Some(RecordingMode::Replay);
        self.config.recording.store = Some(store);
        self.config.recording.recording_id = Some(recording_id.into());
        self
    }

    /// Consume the builder into the canonical [`WorkflowConfig`] without
    /// running it.
    pub fn build(self) -> WorkflowConfig {
        self.config
    }

    /// Validate and run this workflow, equivalent to
    /// `scheduler::run(builder.build())`.
    pub async fn run(self) -> Result<RunResult, RuntimeError> {
        scheduler::run(self.config).await
    }
}
