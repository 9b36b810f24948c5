//! The in-process signal broker.
//!
//! `emit` is synchronous dispatch with asynchronous handler bodies: every
//! matching subscriber is invoked, in registration order, but the bus does
//! not block the emitting call on a handler's completion — it spawns each
//! handler and, when a pending set has been attached (by the
//! [`Scheduler`](crate::scheduler)), hands the resulting `JoinHandle` off
//! for the quiescence loop to track. Without an attached pending set (bare
//! `Bus` usage in unit tests), `emit` awaits each handler directly so
//! results are observable without a scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::RuntimeError;
use crate::pattern::SignalPattern;
use crate::signal::{Signal, SignalSource};

/// A handler invoked with every signal matching its subscription's
/// patterns. Errors are logged and isolated — they never propagate back to
/// the emitter, matching §4.2's subscriber-error contract.
pub type Handler = Arc<dyn Fn(Signal) -> BoxFuture<'static, Result<(), RuntimeError>> + Send + Sync>;

struct Subscriber {
    id: Uuid,
    patterns: Vec<SignalPattern>,
    handler: Handler,
}

/// A handle returned by [`Bus::subscribe`]; drop it or call
/// [`Bus::unsubscribe`] with its id to stop receiving signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(pub Uuid);

struct Inner {
    history: RwLock<Vec<Signal>>,
    subscribers: RwLock<Vec<Subscriber>>,
    pattern_cache: RwLock<HashMap<String, SignalPattern>>,
    next_seq: AtomicU64,
    pending_tx: RwLock<Option<UnboundedSender<JoinHandle<Result<(), RuntimeError>>>>>,
}

/// The in-process event bus. Cheap to clone — internally an `Arc`.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Inner>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                history: RwLock::new(Vec::new()),
                subscribers: RwLock::new(Vec::new()),
                pattern_cache: RwLock::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
                pending_tx: RwLock::new(None),
            }),
        }
    }

    /// Attach the scheduler's pending-set channel so spawned handler tasks
    /// are tracked for quiescence instead of being awaited inline. Called
    /// once by [`crate::scheduler::run`] during setup.
    pub fn attach_pending(&self, tx: UnboundedSender<JoinHandle<Result<(), RuntimeError>>>) {
        *self.inner.pending_tx.write().expect("bus lock poisoned") = Some(tx);
    }

    /// Detach the pending-set channel. Every subsequent `emit` falls back to
    /// awaiting its matching handlers inline (the no-scheduler behavior)
    /// instead of handing them to a channel nothing drains anymore. Called
    /// by [`crate::scheduler::run`] once the quiescence loop has stopped
    /// servicing the channel, so the terminal `workflow:error`/`workflow:end`
    /// emits — including their recording-capture subscriber — are fully
    /// settled before the run reads back the bus history.
    pub fn detach_pending(&self) {
        *self.inner.pending_tx.write().expect("bus lock poisoned") = None;
    }

    fn compile_cached(&self, raw: &str) -> SignalPattern {
        if let Some(pattern) = self.inner.pattern_cache.read().expect("bus lock poisoned").get(raw) {
            return pattern.clone();
        }
        let compiled = SignalPattern::new(raw);
        self.inner
            .pattern_cache
            .write()
            .expect("bus lock poisoned")
            .insert(raw.to_string(), compiled.clone());
        compiled
    }

    /// Register `handler` against `patterns`; it will be invoked for every
    /// future `emit` whose signal name matches any of them. Returns an id
    /// usable with [`Bus::unsubscribe`].
    pub fn subscribe<I, S>(&self, patterns: I, handler: Handler) -> SubscriptionId
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let compiled: Vec<SignalPattern> = patterns.into_iter().map(|p| self.compile_cached(p.as_ref())).collect();
        let id = Uuid::new_v4();
        self.inner.subscribers.write().expect("bus lock poisoned").push(Subscriber {
            id,
            patterns: compiled,
            handler,
        });
        SubscriptionId(id)
    }

    /// Idempotent: unsubscribing an id that's already gone (or was never
    /// registered) is a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner
            .subscribers
            .write()
            .expect("bus lock poisoned")
            .retain(|sub| sub.id != id.0);
    }

    /// Append a new signal to history and dispatch it to matching
    /// subscribers, in registration order. Returns the emitted signal
    /// (with its `id`/`seq`/`timestamp` assigned).
    pub async fn emit(&self, name: impl Into<String>, payload: Value, source: Option<SignalSource>) -> Signal {
        let mut signal = Signal::new(name, payload, source);
        signal.seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);

        self.inner.history.write().expect("bus lock poisoned").push(signal.clone());

        let matching: Vec<Handler> = self
            .inner
            .subscribers
            .read()
            .expect("bus lock poisoned")
            .iter()
            .filter(|sub| sub.patterns.iter().any(|p| p.matches(&signal.name)))
            .map(|sub| Arc::clone(&sub.handler))
            .collect();

        let pending_tx = self.inner.pending_tx.read().expect("bus lock poisoned").clone();

        for handler in matching {
            let signal_for_handler = signal.clone();
            let task = tokio::task::spawn(async move { handler(signal_for_handler).await });
            match &pending_tx {
                Some(tx) => {
                    let _ = tx.send(task);
                }
                None => match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => log::warn!("subscriber error handling {}: {}", signal.name, err),
                    Err(join_err) => log::warn!("subscriber task panicked handling {}: {}", signal.name, join_err),
                },
            }
        }

        signal
    }

    /// The full emission-ordered history of signals emitted on this bus so
    /// far.
    pub fn history(&self) -> Vec<Signal> {
        self.inner.history.read().expect("bus lock poisoned").clone()
    }
}
