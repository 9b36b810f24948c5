//! Drives a single workflow run: setup, the quiescence loop, and teardown.
//!
//! [`run`] is the crate's lowest-level entry point — [`WorkflowBuilder`](crate::workflow::WorkflowBuilder)
//! is ergonomic sugar over assembling a [`WorkflowConfig`] and calling this.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::activation::{self, EndWhenFn, SharedRunState};
use crate::agent::AgentDefinition;
use crate::bus::{Bus, Handler};
use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::provider::LLMProvider;
use crate::recording::{RecordingController, RecordingOptions};
use crate::signal::Signal;
use crate::state::StateContainer;

/// `(state, signal, emit) -> Result<(), RuntimeError>`, registered under a
/// single pattern via [`WorkflowConfig::reducers`].
///
/// Both a synchronous and an asynchronous registration path are offered,
/// mirroring the distilled spec's `void | Promise<void>` reducer return:
/// `Sync` reducers get direct, inline access to the state map; `Async`
/// reducers receive the shared state handle and perform their own
/// `with_mut`/`apply_update` calls across await points.
#[derive(Clone)]
pub enum Reducer {
    Sync(Arc<dyn Fn(&StateContainer, &Signal, &Bus) -> Result<(), RuntimeError> + Send + Sync>),
    Async(Arc<dyn Fn(Arc<StateContainer>, Signal, Bus) -> BoxFuture<'static, Result<(), RuntimeError>> + Send + Sync>),
}

fn build_reducer_handler(reducer: Reducer, state: Arc<StateContainer>, bus: Bus) -> Handler {
    Arc::new(move |signal: Signal| {
        let state = Arc::clone(&state);
        let bus = bus.clone();
        let reducer = reducer.clone();
        Box::pin(async move {
            match reducer {
                Reducer::Sync(f) => f(&state, &signal, &bus),
                Reducer::Async(f) => f(state, signal, bus).await,
            }
        })
    })
}

/// The fully assembled configuration for one run — the canonical surface
/// described in §6; [`WorkflowBuilder`](crate::workflow::WorkflowBuilder) is sugar over this struct.
#[derive(Default)]
pub struct WorkflowConfig {
    pub agents: HashMap<String, AgentDefinition>,
    pub state: Value,
    /// The workflow's original external input, resolved by `{{ input }}`
    /// in agent prompts.
    pub input: Value,
    pub provider: Option<Arc<dyn LLMProvider>>,
    /// `None` falls back to `runtime.default_timeout()`; still `None` there
    /// means no timeout at all.
    pub timeout: Option<Duration>,
    pub end_when: Option<EndWhenFn>,
    pub reducers: Vec<(String, Reducer)>,
    pub recording: RecordingOptions,
    pub cancellation: Option<CancellationToken>,
    /// Runtime-wide defaults this run falls back to when left unset above.
    pub runtime: RuntimeConfig,
}

/// `{durationMs, activations}` from §6's run result.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub duration_ms: u64,
    pub activations: usize,
}

/// `{state, signals, metrics, terminatedEarly, recordingId?}` from §6.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub state: Value,
    pub signals: Vec<Signal>,
    pub metrics: RunMetrics,
    pub terminated_early: bool,
    pub recording_id: Option<String>,
}

/// Run a workflow to quiescence (or timeout, or a fatal error) and return
/// its result.
///
/// `ConfigError`s raised while validating `config` (malformed recording
/// options, an agent with no activation patterns, an `updates` target not
/// present in the initial state) are returned as `Err` before any signal is
/// emitted. Every other failure — provider errors, reducer errors, replay
/// exhaustion, timeouts — is captured into `workflow:error` and reflected
/// in the returned `RunResult`'s `terminated_early` flag and signal
/// history; `run` itself still returns `Ok` so callers always see the
/// run's full signal log and final state, matching §7's "the run always
/// emits `workflow:end` before control returns to the caller."
pub async fn run(config: WorkflowConfig) -> Result<RunResult, RuntimeError> {
    config.recording.validate()?;

    for agent in config.agents.values() {
        if agent.activate_on.is_empty() {
            return Err(RuntimeError::ConfigError(format!(
                "agent {} has no activation patterns",
                agent.name
            )));
        }
    }

    let state = StateContainer::new(config.state);
    let declared_fields = state.declared_fields();
    for agent in config.agents.values() {
        if let Some(field) = &agent.updates {
            if !declared_fields.contains(field) {
                return Err(RuntimeError::ConfigError(format!(
                    "agent {} declares updates=\"{}\" which is not a field of the initial state",
                    agent.name, field
                )));
            }
        }
    }

    let timeout = config.timeout.or_else(|| config.runtime.default_timeout());

    let bus = Bus::new();
    let recording = Arc::new(RecordingController::setup(config.recording).await?);
    let cancellation = config.cancellation.unwrap_or_default();

    let shared = Arc::new(SharedRunState {
        bus: bus.clone(),
        state: Arc::new(state),
        recording: Arc::clone(&recording),
        default_provider: config.provider,
        terminated: Arc::new(AtomicBool::new(false)),
        activations: Arc::new(AtomicUsize::new(0)),
        run_id: Uuid::new_v4().to_string(),
        input: config.input,
        cancellation: cancellation.clone(),
        end_when: config.end_when,
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<JoinHandle<Result<(), RuntimeError>>>();
    bus.attach_pending(tx);

    for (pattern, reducer) in config.reducers {
        let handler = build_reducer_handler(reducer, Arc::clone(&shared.state), bus.clone());
        bus.subscribe([pattern], handler);
    }

    let agent_names: Vec<String> = config.agents.keys().cloned().collect();

    for agent in config.agents.into_values() {
        let patterns: Vec<String> = agent.activate_on.iter().map(|p| p.as_str().to_string()).collect();
        let handler = activation::build_subscriber(agent, Arc::clone(&shared));
        bus.subscribe(patterns, handler);
    }

    if recording.is_recording() {
        let recording_for_capture = Arc::clone(&recording);
        bus.subscribe(
            ["**"],
            Arc::new(move |signal: Signal| {
                let recording = Arc::clone(&recording_for_capture);
                Box::pin(async move {
                    recording.record_signal(&signal);
                    Ok(())
                })
            }),
        );
    }

    let started_at = Instant::now();
    bus.emit(
        "workflow:start",
        serde_json::json!({"agents": agent_names, "state": shared.state.get()}),
        None,
    )
    .await;

    let drain = async move {
        let mut pending = FuturesUnordered::new();
        loop {
            while let Ok(handle) = rx.try_recv() {
                pending.push(handle);
            }
            if pending.is_empty() {
                return None;
            }
            match pending.next().await {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(err))) => return Some(err),
                Some(Err(join_err)) => return Some(RuntimeError::SubscriberError(join_err.to_string())),
                None => return None,
            }
        }
    };

    let fatal = match timeout {
        Some(duration) => match tokio::time::timeout(duration, drain).await {
            Ok(fatal) => fatal,
            Err(_) => Some(RuntimeError::TimeoutError),
        },
        None => drain.await,
    };

    if fatal.is_some() {
        cancellation.cancel();
    }

    // The quiescence loop above has stopped servicing `rx`; any handler task
    // spawned via `pending_tx` from this point on (including the `**`
    // recording subscriber for the two terminal signals below) would never
    // be tracked or awaited. Detach so `emit` falls back to awaiting its
    // matching handlers inline, guaranteeing `workflow:error`/`workflow:end`
    // are captured by the recording before `finalize` reads the buffer back.
    bus.detach_pending();

    if let Some(err) = &fatal {
        shared
            .bus
            .emit(
                "workflow:error",
                serde_json::json!({"phase": "execution", "error": err.name(), "message": err.to_string()}),
                None,
            )
            .await;
    }

    let duration_ms = started_at.elapsed().as_millis() as u64;
    let activations = shared.activations.load(Ordering::SeqCst);
    bus.emit(
        "workflow:end",
        serde_json::json!({"durationMs": duration_ms, "activations": activations, "state": shared.state.get()}),
        None,
    )
    .await;

    let recording_id = recording.finalize(duration_ms).await?;

    Ok(RunResult {
        state: shared.state.get(),
        signals: bus.history(),
        metrics: RunMetrics {
            duration_ms,
            activations,
        },
        terminated_early: fatal.is_some() || shared.terminated.load(Ordering::SeqCst),
        recording_id,
    })
}
