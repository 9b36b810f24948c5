//! Gates a run between live execution, recording, and replay.
//!
//! - **live**: no store interaction at all.
//! - **record**: requires a store; a recording is created upfront, every
//!   emitted signal is buffered locally, and the buffer is flushed with a
//!   single `append_batch` + `finalize` when the run completes (matching
//!   §5's "serialize stores by batching... flushing once on finalize").
//! - **replay**: requires a store and a recording id; the whole recording
//!   is loaded upfront and each activation pulls its output from a
//!   [`ReplayCursor`] instead of invoking a live provider.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::RuntimeError;
use crate::provider::extract_output;
use crate::signal::{is_provider_subsequence, Signal};
use crate::store::{LoadFilter, RecordingMeta, SignalStore};

/// Which of the three modes a run executes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMode {
    Live,
    Record,
    Replay,
}

/// Caller-supplied recording configuration, part of
/// [`WorkflowConfig`](crate::scheduler::WorkflowConfig). Validated by
/// [`RecordingOptions::validate`] before a run starts.
#[derive(Clone, Default)]
pub struct RecordingOptions {
    pub mode: Option<RecordingMode>,
    pub store: Option<Arc<dyn SignalStore>>,
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub recording_id: Option<String>,
}

impl RecordingOptions {
    /// `record` requires a store; `replay` requires a store and a
    /// `recording_id`. Absent `mode` defaults to live, which requires
    /// neither.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        match self.mode.unwrap_or(RecordingMode::Live) {
            RecordingMode::Live => Ok(()),
            RecordingMode::Record => {
                if self.store.is_none() {
                    return Err(RuntimeError::ConfigError("recording.mode=record requires a store".into()));
                }
                Ok(())
            }
            RecordingMode::Replay => {
                if self.store.is_none() {
                    return Err(RuntimeError::ConfigError("recording.mode=replay requires a store".into()));
                }
                if self.recording_id.is_none() {
                    return Err(RuntimeError::ConfigError("recording.mode=replay requires a recordingId".into()));
                }
                Ok(())
            }
        }
    }
}

/// A cursor over a loaded recording's provider-originated signal
/// subsequences, used to feed replayed activations.
pub struct ReplayCursor {
    signals: Vec<Signal>,
    index: Mutex<usize>,
}

impl ReplayCursor {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self {
            signals,
            index: Mutex::new(0),
        }
    }

    /// Scan forward from the cursor for the next contiguous provider
    /// subsequence, returning its extracted `provider:end` output and the
    /// signals to re-emit verbatim. Leading non-provider signals (the
    /// prior run's own framework bookkeeping, which the live path
    /// regenerates) are skipped without being returned.
    ///
    /// Fails with [`RuntimeError::ReplayExhausted`] if the recording ends
    /// (or a non-provider signal interrupts the subsequence) before a
    /// `provider:end` is found.
    pub fn next_provider_output(&self) -> Result<(Value, Vec<Signal>), RuntimeError> {
        let mut index = self.index.lock().expect("replay cursor lock poisoned");
        let mut cursor = *index;

        while cursor < self.signals.len() && !is_provider_subsequence(&self.signals[cursor]) {
            cursor += 1;
        }

        let mut subsequence = Vec::new();
        let mut output = None;
        while cursor < self.signals.len() && is_provider_subsequence(&self.signals[cursor]) {
            let signal = self.signals[cursor].clone();
            cursor += 1;
            let is_end = signal.name == "provider:end";
            if is_end {
                output = extract_output(&signal).cloned();
            }
            subsequence.push(signal);
            if is_end {
                break;
            }
        }

        match output {
            Some(output) => {
                *index = cursor;
                Ok((output, subsequence))
            }
            None => Err(RuntimeError::ReplayExhausted),
        }
    }
}

enum Mode {
    Live,
    Record {
        store: Arc<dyn SignalStore>,
        recording_id: String,
        buffer: Mutex<Vec<Signal>>,
    },
    Replay {
        cursor: ReplayCursor,
    },
}

/// Drives the mode-specific behavior described above. Constructed once per
/// run by the scheduler via [`RecordingController::setup`].
pub struct RecordingController {
    mode: Mode,
}

impl RecordingController {
    /// Validate `options`, then (for `record`) create a fresh recording or
    /// (for `replay`) load the requested one upfront.
    pub async fn setup(options: RecordingOptions) -> Result<Self, RuntimeError> {
        options.validate()?;
        let mode = match options.mode.unwrap_or(RecordingMode::Live) {
            RecordingMode::Live => Mode::Live,
            RecordingMode::Record => {
                let store = options.store.expect("validated above");
                let recording_id = store
                    .create(RecordingMeta {
                        name: options.name,
                        tags: options.tags,
                        provider_type: None,
                    })
                    .await?;
                Mode::Record {
                    store,
                    recording_id,
                    buffer: Mutex::new(Vec::new()),
                }
            }
            RecordingMode::Replay => {
                let store = options.store.expect("validated above");
                let recording_id = options.recording_id.expect("validated above");
                let recording = store
                    .load(&recording_id)
                    .await?
                    .ok_or_else(|| RuntimeError::RecordingNotFound(recording_id.clone()))?;
                Mode::Replay {
                    cursor: ReplayCursor::new(recording.signals),
                }
            }
        };
        Ok(Self { mode })
    }

    pub fn is_replay(&self) -> bool {
        matches!(self.mode, Mode::Replay { .. })
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.mode, Mode::Record { .. })
    }

    /// Buffer `signal` if this controller is recording; a no-op otherwise.
    /// Called by the scheduler's `**` recording subscription for every
    /// signal emitted during the run.
    pub fn record_signal(&self, signal: &Signal) {
        if let Mode::Record { buffer, .. } = &self.mode {
            buffer.lock().expect("recording buffer lock poisoned").push(signal.clone());
        }
    }

    /// Replay-mode only: pull the next activation's output from the
    /// recording. Panics if called in live or record mode — the activation
    /// engine only calls this after checking [`RecordingController::is_replay`].
    pub fn next_provider_output(&self) -> Result<(Value, Vec<Signal>), RuntimeError> {
        match &self.mode {
            Mode::Replay { cursor } => cursor.next_provider_output(),
            _ => panic!("next_provider_output called outside replay mode"),
        }
    }

    /// Flush the buffered signals and finalize the recording, if this
    /// controller is recording. Returns the recording id for the run
    /// result's `recordingId` field.
    pub async fn finalize(&self, duration_ms: u64) -> Result<Option<String>, RuntimeError> {
        match &self.mode {
            Mode::Live | Mode::Replay { .. } => Ok(None),
            Mode::Record {
                store,
                recording_id,
                buffer,
            } => {
                let signals = std::mem::take(&mut *buffer.lock().expect("recording buffer lock poisoned"));
                store.append_batch(recording_id, signals).await?;
                store.finalize(recording_id, duration_ms).await?;
                Ok(Some(recording_id.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    #[test]
    fn validate_requires_store_for_record() {
        let options = RecordingOptions {
            mode: Some(RecordingMode::Record),
            ..RecordingOptions::default()
        };
        assert!(matches!(options.validate(), Err(RuntimeError::ConfigError(_))));
    }

    #[test]
    fn validate_requires_store_and_id_for_replay() {
        let store: Arc<dyn SignalStore> = Arc::new(InMemoryStore::new());
        let options = RecordingOptions {
            mode: Some(RecordingMode::Replay),
            store: Some(store),
            ..RecordingOptions::default()
        };
        assert!(matches!(options.validate(), Err(RuntimeError::ConfigError(_))));
    }

    #[test]
    fn replay_cursor_extracts_output_and_skips_leading_bookkeeping() {
        let signals = vec![
            Signal::new("agent:activated", json!({"agent": "a"}), None),
            Signal::new("provider:start", json!(null), None),
            Signal::new("text:delta", json!({"chunk": "hi"}), None),
            Signal::new("provider:end", json!({"output": "hi"}), None),
            Signal::new("state:reply:changed", json!(null), None),
        ];
        let cursor = ReplayCursor::new(signals);
        let (output, replayed) = cursor.next_provider_output().unwrap();
        assert_eq!(output, json!("hi"));
        assert_eq!(replayed.len(), 3);
        assert_eq!(replayed[0].name, "provider:start");
        assert_eq!(replayed.last().unwrap().name, "provider:end");
    }

    #[test]
    fn replay_cursor_fails_without_provider_end() {
        let signals = vec![Signal::new("provider:start", json!(null), None)];
        let cursor = ReplayCursor::new(signals);
        assert!(matches!(cursor.next_provider_output(), Err(RuntimeError::ReplayExhausted)));
    }

    #[tokio::test]
    async fn record_mode_buffers_and_flushes_on_finalize() {
        let store: Arc<dyn SignalStore> = Arc::new(InMemoryStore::new());
        let controller = RecordingController::setup(RecordingOptions {
            mode: Some(RecordingMode::Record),
            store: Some(Arc::clone(&store)),
            ..RecordingOptions::default()
        })
        .await
        .unwrap();

        controller.record_signal(&Signal::new("workflow:start", json!(null), None));
        let id = controller.finalize(5).await.unwrap().unwrap();

        let recording = store.load(&id).await.unwrap().unwrap();
        assert!(recording.finalized);
        assert_eq!(recording.signals.len(), 1);
    }
}
