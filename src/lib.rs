//! Reactive signal runtime for multi-agent LLM workflows.
//!
//! A pattern-matched in-process event bus drives agent activations, a
//! shared-state reducer pipeline, causality tracking, quiescence-based
//! termination, and a deterministic record/replay layer that substitutes
//! recorded LLM outputs for live provider calls. See `SPEC_FULL.md` in the
//! repository root for the full component breakdown; this crate implements
//! only the runtime — prompt templating beyond `{{ }}` substitution, the
//! LLM wire protocol, CLI tooling, telemetry exporters, and concrete
//! storage backends are external collaborators behind the [`provider`] and
//! [`store`] traits.
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

pub mod activation;
pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod pattern;
pub mod provider;
pub mod recording;
pub mod scheduler;
pub mod signal;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod template;
pub mod workflow;

pub use agent::{ActivationContext, AgentDefinition};
pub use bus::Bus;
pub use error::RuntimeError;
pub use pattern::SignalPattern;
pub use scheduler::{RunMetrics, RunResult, WorkflowConfig};
pub use signal::Signal;
pub use workflow::WorkflowBuilder;
