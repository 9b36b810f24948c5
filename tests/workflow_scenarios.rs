//! End-to-end scenarios S1-S6 and the quantified invariants from Testable
//! Properties §8, driven through the public `WorkflowBuilder`/`run` surface.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ErrorProvider, HangingProvider, ScriptedProvider, StreamingProvider};
use serde_json::json;
use signalrt::agent::AgentDefinition;
use signalrt::error::RuntimeError;
use signalrt::recording::RecordingMode;
use signalrt::store::InMemoryStore;
use signalrt::workflow::WorkflowBuilder;

fn find_all<'a>(signals: &'a [signalrt::Signal], name: &str) -> Vec<&'a signalrt::Signal> {
    signals.iter().filter(|s| s.name == name).collect()
}

fn find_one<'a>(signals: &'a [signalrt::Signal], name: &str) -> &'a signalrt::Signal {
    let matches = find_all(signals, name);
    assert_eq!(matches.len(), 1, "expected exactly one {} signal, found {}", name, matches.len());
    matches[0]
}

/// S1 — Single-agent fast path.
#[tokio::test]
async fn s1_single_agent_fast_path() {
    let echo = AgentDefinition::new("echo", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_emits(["echo:done"])
        .with_updates("reply")
        .with_provider(Arc::new(ScriptedProvider::new("scripted", json!("hi"))));

    let result = WorkflowBuilder::new()
        .with_agent(echo)
        .with_state(json!({"reply": null}))
        .run()
        .await
        .unwrap();

    assert_eq!(result.state, json!({"reply": "hi"}));
    assert_eq!(find_all(&result.signals, "agent:activated").len(), 1);
    assert_eq!(find_all(&result.signals, "state:reply:changed").len(), 1);
    assert_eq!(find_all(&result.signals, "echo:done").len(), 1);
    assert!(!result.terminated_early);
}

/// S2 — Two-agent chain; `b`'s trigger is `a`'s declared emission, and its
/// activation's `source.parent` must be that emission's id.
#[tokio::test]
async fn s2_two_agent_chain_preserves_causality() {
    let a = AgentDefinition::new("a", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_emits(["a:done"])
        .with_provider(Arc::new(ScriptedProvider::new("a-provider", json!("a-output"))));
    let b = AgentDefinition::new("b", "{{ input }}")
        .with_activate_on(["a:done"])
        .with_provider(Arc::new(ScriptedProvider::new("b-provider", json!("b-output"))));

    let result = WorkflowBuilder::new().with_agent(a).with_agent(b).run().await.unwrap();

    let activated = find_all(&result.signals, "agent:activated");
    assert_eq!(activated.len(), 2);
    let a_activated = activated.iter().find(|s| s.payload["agent"] == "a").unwrap();
    let b_activated = activated.iter().find(|s| s.payload["agent"] == "b").unwrap();
    assert!(a_activated.seq < b_activated.seq);

    let a_done = find_one(&result.signals, "a:done");
    assert_eq!(b_activated.parent_id(), Some(a_done.id));
}

/// S3 — Guard skip: agent with a `when` guard that returns false never
/// invokes its provider.
#[tokio::test]
async fn s3_guard_skip_never_calls_provider() {
    let gated = AgentDefinition::new("gated", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_when(|ctx| ctx.state.get("ready").and_then(|v| v.as_bool()).unwrap_or(false))
        .with_provider(Arc::new(ErrorProvider::new("would-fail-if-called")));

    let result = WorkflowBuilder::new()
        .with_agent(gated)
        .with_state(json!({"ready": false}))
        .run()
        .await
        .unwrap();

    let skipped = find_one(&result.signals, "agent:skipped");
    assert_eq!(skipped.payload["reason"], "guard returned false");
    assert!(find_all(&result.signals, "agent:activated").is_empty());
}

/// S4 — `endWhen` termination: once agent A's update satisfies `endWhen`,
/// a later activation of B is skipped with "workflow terminated".
#[tokio::test]
async fn s4_end_when_terminates_later_activations() {
    let setter = AgentDefinition::new("setter", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_updates("count")
        .with_provider(Arc::new(ScriptedProvider::new("setter-provider", json!(1))));
    let late = AgentDefinition::new("late", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_provider(Arc::new(ScriptedProvider::new("late-provider", json!("late-output"))));

    let result = WorkflowBuilder::new()
        .with_agent(setter)
        .with_agent(late)
        .with_state(json!({"count": 0}))
        .with_end_when(|state| state.get("count").and_then(|v| v.as_i64()).unwrap_or(0) >= 1)
        .run()
        .await
        .unwrap();

    assert!(result.terminated_early);
    assert_eq!(result.state["count"], 1);
    let terminating = find_all(&result.signals, "workflow:terminating");
    assert_eq!(terminating.len(), 1);
}

/// S5 — Record then replay equivalence: a replay run with providers that
/// always error still completes, reusing the recorded provider output.
#[tokio::test]
async fn s5_record_then_replay_equivalence() {
    let store = Arc::new(InMemoryStore::new());

    let a = AgentDefinition::new("a", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_emits(["a:done"])
        .with_provider(Arc::new(StreamingProvider::new("a-provider", "thinking...", json!("a-output"))));
    let b = AgentDefinition::new("b", "{{ input }}")
        .with_activate_on(["a:done"])
        .with_updates("reply")
        .with_provider(Arc::new(ScriptedProvider::new("b-provider", json!("b-output"))));

    let recorded = WorkflowBuilder::new()
        .with_agent(a)
        .with_agent(b)
        .with_state(json!({"reply": null}))
        .record(Arc::clone(&store))
        .run()
        .await
        .unwrap();

    let recording_id = recorded.recording_id.expect("record mode must yield a recording id");
    assert_eq!(recorded.state, json!({"reply": "b-output"}));

    let a_replay = AgentDefinition::new("a", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_emits(["a:done"])
        .with_provider(Arc::new(ErrorProvider::new("a-would-fail")));
    let b_replay = AgentDefinition::new("b", "{{ input }}")
        .with_activate_on(["a:done"])
        .with_updates("reply")
        .with_provider(Arc::new(ErrorProvider::new("b-would-fail")));

    let replayed = WorkflowBuilder::new()
        .with_agent(a_replay)
        .with_agent(b_replay)
        .with_state(json!({"reply": null}))
        .replay(Arc::clone(&store), recording_id)
        .run()
        .await
        .unwrap();

    assert_eq!(replayed.state, recorded.state);
    assert!(!replayed.terminated_early);

    let recorded_changes: Vec<&serde_json::Value> = recorded
        .signals
        .iter()
        .filter(|s| s.name == "state:reply:changed")
        .map(|s| &s.payload)
        .collect();
    let replayed_changes: Vec<&serde_json::Value> = replayed
        .signals
        .iter()
        .filter(|s| s.name == "state:reply:changed")
        .map(|s| &s.payload)
        .collect();
    assert_eq!(recorded_changes, replayed_changes);
}

/// Record mode must persist the *entire* emitted history, including the
/// terminal `workflow:end` bookend emitted after the quiescence loop has
/// stopped servicing the pending-activation channel.
#[tokio::test]
async fn record_mode_persists_the_terminal_workflow_end_signal() {
    let store = Arc::new(InMemoryStore::new());

    let echo = AgentDefinition::new("echo", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_updates("reply")
        .with_provider(Arc::new(ScriptedProvider::new("p", json!("hi"))));

    let result = WorkflowBuilder::new()
        .with_agent(echo)
        .with_state(json!({"reply": null}))
        .record(Arc::clone(&store))
        .run()
        .await
        .unwrap();

    let recording_id = result.recording_id.expect("record mode must yield a recording id");
    let recording = store.load(&recording_id).await.unwrap().expect("recording must exist");

    assert_eq!(recording.signals.len(), result.signals.len());
    assert_eq!(recording.signals.last().unwrap().name, "workflow:end");
    assert_eq!(recording.signals.first().unwrap().name, "workflow:start");
}

/// `workflow:start`'s payload carries the full agent-name set, per §4.7(6)
/// and §6's `workflow:start {agents, state}`.
#[tokio::test]
async fn workflow_start_payload_carries_agent_names() {
    let a = AgentDefinition::new("a", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_provider(Arc::new(ScriptedProvider::new("p", json!("out"))));

    let result = WorkflowBuilder::new().with_agent(a).run().await.unwrap();

    let started = find_one(&result.signals, "workflow:start");
    let agents = started.payload["agents"].as_array().expect("agents must be an array");
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0], "a");
}

/// S6 — Timeout: a provider that never yields `provider:end` forces the
/// run to end via `TimeoutError`, recorded as `workflow:error`.
#[tokio::test]
async fn s6_timeout_forces_workflow_error() {
    let hangs = AgentDefinition::new("hangs", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_provider(Arc::new(HangingProvider::new("hanging")));

    let result = WorkflowBuilder::new()
        .with_agent(hangs)
        .with_timeout(Duration::from_millis(50))
        .run()
        .await
        .unwrap();

    assert!(result.terminated_early);
    let error_signal = find_one(&result.signals, "workflow:error");
    assert_eq!(error_signal.payload["phase"], "execution");
    assert_eq!(error_signal.payload["error"], RuntimeError::TimeoutError.name());
    assert_eq!(result.signals.last().unwrap().name, "workflow:end");
}

/// Testable Property 1: every run starts and ends with the two bookend
/// signals, in that order, regardless of what else happens.
#[tokio::test]
async fn property_1_bookend_signals() {
    let result = WorkflowBuilder::new().with_state(json!({})).run().await.unwrap();
    assert_eq!(result.signals.first().unwrap().name, "workflow:start");
    assert_eq!(result.signals.last().unwrap().name, "workflow:end");
}

/// Testable Property 2: for an activation with both `updates` and `emits`,
/// the state change precedes the declared emissions, and both carry the
/// activation id as their parent.
#[tokio::test]
async fn property_2_state_change_precedes_declared_emits() {
    let agent = AgentDefinition::new("both", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_updates("reply")
        .with_emits(["both:e1", "both:e2"])
        .with_provider(Arc::new(ScriptedProvider::new("p", json!("out"))));

    let result = WorkflowBuilder::new()
        .with_agent(agent)
        .with_state(json!({"reply": null}))
        .run()
        .await
        .unwrap();

    let activated = find_one(&result.signals, "agent:activated");
    let changed = find_one(&result.signals, "state:reply:changed");
    let e1 = find_one(&result.signals, "both:e1");
    let e2 = find_one(&result.signals, "both:e2");

    assert_eq!(changed.parent_id(), Some(activated.id));
    assert_eq!(e1.parent_id(), Some(activated.id));
    assert_eq!(e2.parent_id(), Some(activated.id));
    assert!(activated.seq < changed.seq);
    assert!(changed.seq < e1.seq);
    assert!(e1.seq < e2.seq);
}

/// Testable Property 3: every subscriber whose pattern matches a signal
/// observes it exactly once.
#[tokio::test]
async fn property_3_every_matching_subscriber_observes_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let agent = AgentDefinition::new("emitter", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_emits(["task:done"])
        .with_provider(Arc::new(ScriptedProvider::new("p", json!("out"))));

    let counter = Arc::new(AtomicUsize::new(0));
    let counter_for_reducer = Arc::clone(&counter);

    let result = WorkflowBuilder::new()
        .with_agent(agent)
        .with_reducer(
            "task:*",
            signalrt::scheduler::Reducer::Sync(Arc::new(move |_state, _signal, _bus| {
                counter_for_reducer.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
        )
        .run()
        .await
        .unwrap();

    assert_eq!(find_all(&result.signals, "task:done").len(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

/// Testable Property 6 (partial, single-activation case): once `endWhen`
/// fires, no further activation starts — subsequent matching triggers are
/// skipped with the "workflow terminated" reason.
#[tokio::test]
async fn property_6_no_activation_starts_after_end_when_fires() {
    let setter = AgentDefinition::new("setter", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_updates("done")
        .with_emits(["setter:done"])
        .with_provider(Arc::new(ScriptedProvider::new("p", json!(true))));
    let follower = AgentDefinition::new("follower", "{{ input }}")
        .with_activate_on(["setter:done"])
        .with_provider(Arc::new(ErrorProvider::new("would-fail-if-called")));

    let result = WorkflowBuilder::new()
        .with_agent(setter)
        .with_agent(follower)
        .with_state(json!({"done": false}))
        .with_end_when(|state| state.get("done").and_then(|v| v.as_bool()).unwrap_or(false))
        .run()
        .await
        .unwrap();

    let skipped = find_all(&result.signals, "agent:skipped");
    assert!(skipped.iter().any(|s| s.payload["reason"] == "workflow terminated"));
    assert!(find_all(&result.signals, "agent:failed").is_empty());
}

/// `WorkflowConfig.timeout` unset falls back to `runtime.default_timeout_ms`
/// when one is configured.
#[tokio::test]
async fn runtime_default_timeout_applies_when_no_explicit_timeout_is_set() {
    let hangs = AgentDefinition::new("hangs", "{{ input }}")
        .with_activate_on(["workflow:start"])
        .with_provider(Arc::new(HangingProvider::new("hanging")));

    let runtime = signalrt::config::RuntimeConfig {
        default_timeout_ms: Some(50),
        ..signalrt::config::RuntimeConfig::default()
    };

    let result = WorkflowBuilder::new()
        .with_agent(hangs)
        .with_runtime(runtime)
        .run()
        .await
        .unwrap();

    assert!(result.terminated_early);
    let error_signal = find_one(&result.signals, "workflow:error");
    assert_eq!(error_signal.payload["error"], RuntimeError::TimeoutError.name());
}

/// Config validation: `record` without a store is a `ConfigError`, raised
/// before any signal is emitted (so `run` itself returns `Err`, not a
/// `RunResult` with a `workflow:error`).
#[tokio::test]
async fn record_mode_without_store_is_a_config_error() {
    let mut config = signalrt::WorkflowConfig::default();
    config.recording.mode = Some(RecordingMode::Record);
    let err = signalrt::scheduler::run(config).await.unwrap_err();
    assert!(matches!(err, RuntimeError::ConfigError(_)));
}

/// A live activation with no resolvable provider fails fatally with
/// `NoProvider`, surfaced through `agent:failed` and `workflow:error`.
#[tokio::test]
async fn missing_provider_surfaces_as_agent_failed() {
    let agent = AgentDefinition::new("needs-provider", "{{ input }}").with_activate_on(["workflow:start"]);

    let result = WorkflowBuilder::new().with_agent(agent).run().await.unwrap();

    let failed = find_one(&result.signals, "agent:failed");
    assert_eq!(failed.payload["agent"], "needs-provider");
    assert!(result.terminated_early);
    assert_eq!(result.signals.last().unwrap().name, "workflow:end");
}
