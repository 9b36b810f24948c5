//! Per-signal activation handling: steps 1-7 of the Agent Registry &
//! Activation Engine.
//!
//! [`SharedRunState`] bundles everything an activation needs that outlives
//! any single signal match — the bus, state container, recording
//! controller, default provider, and the run's termination flag — so it
//! can be captured by the `'static` bus-subscription closure built in
//! [`build_subscriber`]. The scheduler constructs one `SharedRunState` per
//! run and wires one subscription per agent via this function.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::{ActivationContext, AgentDefinition};
use crate::bus::{Bus, Handler};
use crate::error::RuntimeError;
use crate::provider::{extract_output, LLMProvider, ProviderContext, ProviderInput, ProviderMessage};
use crate::recording::RecordingController;
use crate::signal::{Signal, SignalSource};
use crate::state::StateContainer;
use crate::template;

/// `(state) -> bool`, evaluated after every state update.
pub type EndWhenFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Everything shared across every activation in a single run.
pub struct SharedRunState {
    pub bus: Bus,
    pub state: Arc<StateContainer>,
    pub recording: Arc<RecordingController>,
    pub default_provider: Option<Arc<dyn LLMProvider>>,
    /// Set once `endWhen` first returns true (or on cancellation/timeout);
    /// checked at the top of every activation per step 1.
    pub terminated: Arc<AtomicBool>,
    pub activations: Arc<AtomicUsize>,
    pub run_id: String,
    pub input: Value,
    pub cancellation: CancellationToken,
    pub end_when: Option<EndWhenFn>,
}

/// Build the bus subscription handler for one agent, closing over an
/// `Arc`-cloned [`SharedRunState`] and the agent's own (cloned)
/// definition.
pub fn build_subscriber(agent: AgentDefinition, shared: Arc<SharedRunState>) -> Handler {
    Arc::new(move |trigger: Signal| {
        let agent = agent.clone();
        let shared = Arc::clone(&shared);
        Box::pin(async move { activate(agent, shared, trigger).await })
    })
}

/// Steps 1-7 of the activation engine, run once per matching trigger
/// signal.
async fn activate(agent: AgentDefinition, shared: Arc<SharedRunState>, trigger: Signal) -> Result<(), RuntimeError> {
    // Step 1: short-circuit if the workflow has already terminated.
    if shared.terminated.load(Ordering::SeqCst) {
        emit_skipped(&shared.bus, &agent.name, trigger.id, "workflow terminated").await;
        return Ok(());
    }

    // Step 2: build the activation context.
    let ctx = ActivationContext {
        signal: trigger.clone(),
        state: shared.state.get(),
        input: shared.input.clone(),
    };

    // Step 3: evaluate the guard.
    if let Some(guard) = &agent.when {
        if !guard(&ctx) {
            emit_skipped(&shared.bus, &agent.name, trigger.id, "guard returned false").await;
            return Ok(());
        }
    }

    // Step 4: announce the activation.
    let activated = shared
        .bus
        .emit(
            "agent:activated",
            serde_json::json!({"agent": agent.name, "trigger": trigger.name}),
            Some(SignalSource::agent(agent.name.clone(), trigger.id)),
        )
        .await;
    let activation_id = activated.id;

    // Step 5: resolve the output, live or from replay.
    let output = match resolve_output(&agent, &shared, &ctx, activation_id).await {
        Ok(output) => output,
        Err(err) => {
            shared
                .bus
                .emit(
                    "agent:failed",
                    serde_json::json!({"agent": agent.name, "error": err.to_string()}),
                    Some(SignalSource::agent(agent.name.clone(), activation_id)),
                )
                .await;
            return Err(err);
        }
    };

    // Step 6: apply the declared state update, then evaluate `endWhen`.
    if let Some(field) = &agent.updates {
        shared
            .state
            .apply_update(&shared.bus, field, output.clone(), &agent.name, activation_id)
            .await;

        if let Some(end_when) = &shared.end_when {
            if !shared.terminated.load(Ordering::SeqCst) && end_when(&shared.state.get()) {
                shared.terminated.store(true, Ordering::SeqCst);
                shared.bus.emit("workflow:terminating", serde_json::json!({}), None).await;
            }
        }
    }

    // Step 7: emit declared emissions.
    for emitted_name in &agent.emits {
        shared
            .bus
            .emit(
                emitted_name.clone(),
                serde_json::json!({"agent": agent.name, "output": output}),
                Some(SignalSource::agent(agent.name.clone(), activation_id)),
            )
            .await;
    }

    shared.activations.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

async fn emit_skipped(bus: &Bus, agent_name: &str, trigger_id: Uuid, reason: &str) {
    bus.emit(
        "agent:skipped",
        serde_json::json!({"agent": agent_name, "reason": reason}),
        Some(SignalSource::with_parent(trigger_id)),
    )
    .await;
}

/// Resolve this activation's output, either by driving a live provider
/// stream or by pulling from the replay cursor.
async fn resolve_output(
    agent: &AgentDefinition,
    shared: &Arc<SharedRunState>,
    ctx: &ActivationContext,
    activation_id: Uuid,
) -> Result<Value, RuntimeError> {
    if shared.recording.is_replay() {
        let (output, replayed) = shared.recording.next_provider_output()?;
        for signal in replayed {
            shared
                .bus
                .emit(signal.name, signal.payload, Some(SignalSource::agent(agent.name.clone(), activation_id)))
                .await;
        }
        return Ok(output);
    }

    let provider = agent
        .provider
        .clone()
        .or_else(|| shared.default_provider.clone())
        .ok_or_else(|| RuntimeError::NoProvider(agent.name.clone()))?;

    let prompt = template::expand(&agent.prompt, ctx);
    let prompt_text = match prompt {
        Value::String(s) => s,
        other => other.to_string(),
    };

    let provider_input = ProviderInput {
        system: None,
        messages: vec![ProviderMessage {
            role: "user".to_string(),
            content: prompt_text,
        }],
    };
    let provider_ctx = ProviderContext {
        run_id: shared.run_id.clone(),
        cancellation: shared.cancellation.clone(),
    };

    let mut stream = provider.run(provider_input, provider_ctx).await?;

    let mut output = None;
    while let Some(mut signal) = stream.next().await {
        signal.source = Some(SignalSource::agent(agent.name.clone(), activation_id));
        let emitted = shared.bus.emit(signal.name, signal.payload, signal.source).await;
        if emitted.name == "provider:end" && output.is_none() {
            output = extract_output(&emitted).cloned();
        }
    }

    output.ok_or_else(|| RuntimeError::ProviderError(format!("{}: stream ended without provider:end", agent.name)))
}
