//! Owns the single mutable state record shared across a run.
//!
//! State is mutated only from within an activation's settlement (via
//! [`StateContainer::apply_update`]) or from inside a reducer, which
//! receives the fields directly and mutates them in place. `apply_update`
//! is the only path that automatically emits a `state:<field>:changed`
//! signal — reducers are expected to emit explicitly through the emitter
//! they're handed when they want to signal downstream.

use std::collections::HashSet;
use std::sync::RwLock;

use serde_json::Value;
use uuid::Uuid;

use crate::bus::Bus;
use crate::signal::{Signal, SignalSource};

/// A run's single shared state record.
///
/// Backed by a [`serde_json::Map`] so agent `updates` and reducers can
/// address fields by name without the caller defining a Rust struct ahead
/// of time; callers who want typed access can `serde_json::from_value` the
/// snapshot returned by [`StateContainer::get`].
pub struct StateContainer {
    fields: RwLock<serde_json::Map<String, Value>>,
}

impl StateContainer {
    /// Seed the container from `initial` (a shallow copy is taken so the
    /// caller's value is never mutated by this run). A non-object
    /// `initial` is wrapped under a synthetic `"value"` field so the
    /// container is still addressable by reducers; `updates`-based writes
    /// expect an object.
    pub fn new(initial: Value) -> Self {
        let fields = match initial {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            fields: RwLock::new(fields),
        }
    }

    /// A read-only snapshot of the current state.
    pub fn get(&self) -> Value {
        Value::Object(self.fields.read().expect("state lock poisoned").clone())
    }

    /// Field names present at construction time — used by the scheduler to
    /// reject an `updates` target that wasn't declared in the initial
    /// state, per the "reject unknown `updates` fields" design note.
    pub fn declared_fields(&self) -> HashSet<String> {
        self.fields.read().expect("state lock poisoned").keys().cloned().collect()
    }

    /// Replace `field` with `new_value` and emit `state:<field>:changed`
    /// through `bus`, carrying `source = {agent, parent: activation_id}`.
    ///
    /// Last-writer-wins: concurrent activations racing on the same field
    /// are not serialized by this container (see the crate's concurrency
    /// model); callers that need ordering enforce it via guards.
    pub async fn apply_update(
        &self,
        bus: &Bus,
        field: &str,
        new_value: Value,
        agent: &str,
        activation_id: Uuid,
    ) -> Signal {
        let old_value = {
            let mut fields = self.fields.write().expect("state lock poisoned");
            let old_value = fields.get(field).cloned().unwrap_or(Value::Null);
            fields.insert(field.to_string(), new_value.clone());
            old_value
        };

        let payload = serde_json::json!({
            "key": field,
            "oldValue": old_value,
            "newValue": new_value,
            "agent": agent,
        });

        bus.emit(
            format!("state:{}:changed", field),
            payload,
            Some(SignalSource::agent(agent, activation_id)),
        )
        .await
    }

    /// Direct mutable access for reducers, which receive the fields
    /// directly rather than going through `apply_update` (reducer
    /// mutations do not auto-emit a `state:*:changed` signal).
    pub fn with_mut<T>(&self, f: impl FnOnce(&mut serde_json::Map<String, Value>) -> T) -> T {
        let mut fields = self.fields.write().expect("state lock poisoned");
        f(&mut fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_fields_reflects_initial_keys() {
        let state = StateContainer::new(serde_json::json!({"reply": null, "count": 0}));
        let declared = state.declared_fields();
        assert!(declared.contains("reply"));
        assert!(declared.contains("count"));
        assert_eq!(declared.len(), 2);
    }

    #[test]
    fn with_mut_allows_reducer_style_mutation() {
        let state = StateContainer::new(serde_json::json!({"count": 0}));
        state.with_mut(|fields| {
            fields.insert("count".to_string(), serde_json::json!(1));
        });
        assert_eq!(state.get(), serde_json::json!({"count": 1}));
    }
}
