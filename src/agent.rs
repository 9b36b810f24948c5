//! Agent definitions and the registry that wires them onto the bus.
//!
//! An [`AgentDefinition`] is immutable for the duration of a run: prompt
//! template, activation patterns, declared emissions, an optional guard,
//! an optional `updates` target field, and an optional provider override.
//! The per-match activation logic (steps 1-7 of the Activation Engine)
//! lives in [`crate::activation`]; this module owns storage and builder
//! ergonomics, in the style of the teacher's `Agent::new`/`with_*` chain.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::pattern::SignalPattern;
use crate::provider::LLMProvider;
use crate::signal::Signal;

/// Context an agent's guard and prompt template are evaluated against.
///
/// `input` is the workflow's original external input (the value supplied
/// via [`WorkflowConfig::input`](crate::scheduler::WorkflowConfig::input)),
/// unchanged across every activation in the run.
#[derive(Debug, Clone, Serialize)]
pub struct ActivationContext {
    pub signal: Signal,
    /// Read-only snapshot of state at the moment the trigger signal was
    /// dispatched — later mutations are not visible through this context.
    pub state: serde_json::Value,
    pub input: serde_json::Value,
}

/// `(ctx) -> bool`, evaluated before an activation proceeds.
pub type GuardFn = Arc<dyn Fn(&ActivationContext) -> bool + Send + Sync>;

/// The unit the scheduler manages: a named behavior triggered by matching
/// signals.
///
/// Construct via [`AgentDefinition::new`] and the `with_*` builder methods,
/// mirroring the teacher's `Agent` builder.
///
/// # Example
///
/// ```rust
/// use signalrt::agent::AgentDefinition;
///
/// let echo = AgentDefinition::new("echo", "Say hi back: {{ input }}")
///     .with_activate_on(["workflow:start"])
///     .with_emits(["echo:done"])
///     .with_updates("reply");
///
/// assert_eq!(echo.name, "echo");
/// assert_eq!(echo.updates.as_deref(), Some("reply"));
/// ```
#[derive(Clone)]
pub struct AgentDefinition {
    pub name: String,
    pub prompt: String,
    pub activate_on: Vec<SignalPattern>,
    pub emits: Vec<String>,
    pub when: Option<GuardFn>,
    pub updates: Option<String>,
    pub provider: Option<Arc<dyn LLMProvider>>,
}

impl AgentDefinition {
    /// A new agent with no activation patterns yet — at least one must be
    /// added via [`AgentDefinition::with_activate_on`] before registration,
    /// per the non-empty `activateOn` invariant.
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            activate_on: Vec::new(),
            emits: Vec::new(),
            when: None,
            updates: None,
            provider: None,
        }
    }

    pub fn with_activate_on<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.activate_on = patterns.into_iter().map(|p| SignalPattern::new(p.into())).collect();
        self
    }

    pub fn with_emits<I, S>(mut self, emits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.emits = emits.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_when(mut self, guard: impl Fn(&ActivationContext) -> bool + Send + Sync + 'static) -> Self {
        self.when = Some(Arc::new(guard));
        self
    }

    pub fn with_updates(mut self, field: impl Into<String>) -> Self {
        self.updates = Some(field.into());
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }
}

/// Holds every agent registered for a run. Populated by
/// [`WorkflowConfig`](crate::scheduler::WorkflowConfig) and consulted by
/// the scheduler when wiring bus subscriptions.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentDefinition>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, agent: AgentDefinition) {
        self.agents.insert(agent.name.clone(), agent);
    }

    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentDefinition> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
