//! Reduces a finished run's signal log into a single "wide event".
//!
//! Purely derivative: this module reads a signal history and metrics after
//! the fact and produces a summary. It never mutates the run.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::pattern::SignalPattern;
use crate::provider::extract_usage;
use crate::signal::Signal;

/// Coarse classification of how a run finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
    Timeout,
    Terminated,
}

/// Controls which signals are copied into the wide event's `sampled_signals`
/// list, so high-volume runs don't produce unbounded telemetry payloads.
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    /// Every signal matching any of these patterns is always included.
    pub always_include: Vec<SignalPattern>,
    /// Every signal matching any of these patterns is always excluded,
    /// even if it would otherwise be sampled in.
    pub never_include: Vec<SignalPattern>,
    /// Fraction of the remaining signals (after always/never rules) to
    /// keep, applied deterministically via `seq % denominator`.
    pub rate: f64,
    /// Hard cap on the number of sampled signals, applied last.
    pub max_signals: usize,
    /// When the run's outcome is `Error`, include every signal (still
    /// subject to `max_signals`).
    pub always_on_error: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            always_include: Vec::new(),
            never_include: Vec::new(),
            rate: 1.0,
            max_signals: 1_000,
            always_on_error: true,
        }
    }
}

/// The aggregated summary of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WideEvent {
    pub outcome: Outcome,
    /// Distinct agent names observed in `agent:activated` signals.
    pub agents_activated: Vec<String>,
    pub total_signals: usize,
    /// Sum of any numeric `usage.total_tokens`-shaped field found on
    /// `provider:end`/`harness:end` payloads. `0` if none report usage.
    pub total_tokens: u64,
    pub sampled_signals: Vec<Signal>,
}

/// Deterministically decide whether `signal` survives sampling at `rate`,
/// using its bus-assigned `seq` so the same run always samples the same
/// signals.
fn sampled_in(signal: &Signal, rate: f64) -> bool {
    if rate >= 1.0 {
        return true;
    }
    if rate <= 0.0 {
        return false;
    }
    let denominator = (1.0 / rate).round().max(1.0) as u64;
    signal.seq % denominator == 0
}

fn sum_tokens(signal: &Signal) -> u64 {
    extract_usage(signal)
        .and_then(|usage| usage.get("total_tokens").or_else(|| usage.get("totalTokens")))
        .and_then(|value| value.as_u64())
        .unwrap_or(0)
}

/// Reduce `signals` (the full history of a finished run) into a
/// [`WideEvent`] under `sampling`.
pub fn aggregate(signals: &[Signal], outcome: Outcome, sampling: &SamplingConfig) -> WideEvent {
    let mut agents = BTreeSet::new();
    let mut total_tokens = 0u64;

    for signal in signals {
        if signal.name == "agent:activated" {
            if let Some(agent) = signal.payload.get("agent").and_then(|v| v.as_str()) {
                agents.insert(agent.to_string());
            }
        }
        total_tokens += sum_tokens(signal);
    }

    let include_everything = matches!(outcome, Outcome::Error) && sampling.always_on_error;

    let mut sampled: Vec<Signal> = signals
        .iter()
        .filter(|signal| {
            if sampling.never_include.iter().any(|p| p.matches(&signal.name)) {
                return false;
            }
            if include_everything {
                return true;
            }
            if sampling.always_include.iter().any(|p| p.matches(&signal.name)) {
                return true;
            }
            sampled_in(signal, sampling.rate)
        })
        .cloned()
        .collect();

    sampled.truncate(sampling.max_signals);

    WideEvent {
        outcome,
        agents_activated: agents.into_iter().collect(),
        total_signals: signals.len(),
        total_tokens,
        sampled_signals: sampled,
    }
}
