//! The universal event type routed by the [`Bus`](crate::bus::Bus).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Causality and attribution metadata carried by a [`Signal`].
///
/// `parent` is the only field the core relies on for ordering invariants: it
/// refers to an earlier-emitted signal's [`Signal::id`], never to a signal
/// that hasn't been emitted yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalSource {
    /// Name of the agent that produced this signal, if any.
    pub agent: Option<String>,
    /// Name of the provider that produced this signal, if any.
    pub provider: Option<String>,
    /// Name of the reducer that produced this signal, if any.
    pub reducer: Option<String>,
    /// Id of the signal that caused this one to be emitted.
    pub parent: Option<Uuid>,
}

impl SignalSource {
    /// A source with only `parent` set, the common case for framework
    /// bookkeeping signals (`agent:activated`, `state:*:changed`, declared
    /// `emits`).
    pub fn with_parent(parent: Uuid) -> Self {
        Self {
            parent: Some(parent),
            ..Default::default()
        }
    }

    /// A source attributing the signal to an agent and its triggering signal.
    pub fn agent(agent: impl Into<String>, parent: Uuid) -> Self {
        Self {
            agent: Some(agent.into()),
            parent: Some(parent),
            ..Default::default()
        }
    }
}

/// An immutable, named event flowing through the bus.
///
/// Signals are cheap to clone (payloads are [`serde_json::Value`]) and are
/// never mutated once emitted: the bus's history is the sole owner of the
/// emitted sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Unique per process. Not guaranteed unique across processes/replays.
    pub id: Uuid,
    /// Colon-segmented name, e.g. `agent:activated`, `state:reply:changed`.
    pub name: String,
    /// Arbitrary structured payload.
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub source: Option<SignalSource>,
    /// Monotonic order assigned by the bus at emission time. Internal
    /// bookkeeping only — not part of the public causality contract, but
    /// used by telemetry sampling and store range filters as a total order
    /// cheaper than comparing timestamps.
    pub seq: u64,
}

impl Signal {
    /// Construct a signal with a fresh id and the current timestamp. `seq`
    /// is assigned later by the bus at emission.
    pub fn new(name: impl Into<String>, payload: serde_json::Value, source: Option<SignalSource>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            payload,
            timestamp: Utc::now(),
            source,
            seq: 0,
        }
    }

    /// The id this signal's `source.parent` refers to, if any.
    pub fn parent_id(&self) -> Option<Uuid> {
        self.source.as_ref().and_then(|s| s.parent)
    }

    /// True if `name` starts with `prefix:` or equals `prefix` exactly —
    /// used to recognize the provider-originated signal families
    /// (`provider:`, `text:`, `tool:`, `thinking:`).
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.name == prefix || self.name.starts_with(&format!("{}:", prefix))
    }
}

/// The four signal-name prefixes the framework treats as provider-originated
/// output, used by the recording controller to detect a contiguous "provider
/// subsequence" during replay.
pub const PROVIDER_SUBSEQUENCE_PREFIXES: [&str; 4] = ["provider", "text", "tool", "thinking"];

/// True if `signal` belongs to a provider subsequence.
pub fn is_provider_subsequence(signal: &Signal) -> bool {
    PROVIDER_SUBSEQUENCE_PREFIXES
        .iter()
        .any(|prefix| signal.has_prefix(prefix))
}
