//! Append-only persistence abstraction for recordings.
//!
//! The runtime consumes exactly one collaborator interface, [`SignalStore`];
//! filesystem- or database-backed implementations live outside this crate.
//! [`InMemoryStore`] ships here so the record/replay properties in the test
//! suite are exercisable without an external service.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RuntimeError;
use crate::pattern::SignalPattern;
use crate::signal::Signal;

/// Caller-supplied metadata for [`SignalStore::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingMeta {
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub provider_type: Option<String>,
}

/// A finished or in-progress recording: metadata plus the ordered signal
/// log and named checkpoints. Append-only until [`SignalStore::finalize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub provider_type: Option<String>,
    pub signal_count: usize,
    pub duration_ms: Option<u64>,
    pub finalized: bool,
    pub signals: Vec<Signal>,
    pub checkpoints: HashMap<String, usize>,
    pub created_at: DateTime<Utc>,
}

/// Summary returned by [`SignalStore::list`] — the full signal log is
/// omitted so listing many recordings stays cheap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub id: String,
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub signal_count: usize,
    pub finalized: bool,
}

/// Filter applied by [`SignalStore::load_signals`].
#[derive(Debug, Clone, Default)]
pub struct LoadFilter {
    pub from_index: Option<usize>,
    pub to_index: Option<usize>,
    pub patterns: Option<Vec<SignalPattern>>,
}

/// Filter applied by [`SignalStore::list`]. An empty filter matches every
/// recording.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub tag: Option<String>,
    pub finalized_only: bool,
}

/// Append-only persistence for recordings.
///
/// Invariants the core relies on: signals read back in insertion order;
/// `append`/`append_batch`/`checkpoint` after `finalize` fail with
/// [`RuntimeError::StoreFinalized`]; an unknown id returns `None` from
/// `load` but [`RuntimeError::RecordingNotFound`] from every other
/// operation.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn create(&self, meta: RecordingMeta) -> Result<String, RuntimeError>;
    async fn append(&self, id: &str, signal: Signal) -> Result<(), RuntimeError>;
    async fn append_batch(&self, id: &str, signals: Vec<Signal>) -> Result<(), RuntimeError>;
    async fn checkpoint(&self, id: &str, name: &str) -> Result<(), RuntimeError>;
    async fn finalize(&self, id: &str, duration_ms: u64) -> Result<(), RuntimeError>;
    async fn load(&self, id: &str) -> Result<Option<Recording>, RuntimeError>;
    async fn load_signals(&self, id: &str, filter: LoadFilter) -> Result<Vec<Signal>, RuntimeError>;
    async fn list(&self, filter: ListFilter) -> Result<Vec<RecordingSummary>, RuntimeError>;
    async fn exists(&self, id: &str) -> Result<bool, RuntimeError>;
    async fn delete(&self, id: &str) -> Result<(), RuntimeError>;
    async fn clear(&self) -> Result<(), RuntimeError>;
}

/// A [`SignalStore`] backed by an in-process `HashMap`. Recordings do not
/// survive past the process; useful for tests and for `replay` runs within
/// the same process that produced the recording.
#[derive(Default)]
pub struct InMemoryStore {
    recordings: RwLock<HashMap<String, Recording>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_recording<T>(
        &self,
        id: &str,
        f: impl FnOnce(&Recording) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let recordings = self.recordings.read().expect("recordings lock poisoned");
        match recordings.get(id) {
            Some(recording) => f(recording),
            None => Err(RuntimeError::RecordingNotFound(id.to_string())),
        }
    }

    fn with_recording_mut(
        &self,
        id: &str,
        f: impl FnOnce(&mut Recording) -> Result<(), RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let mut recordings = self.recordings.write().expect("recordings lock poisoned");
        match recordings.get_mut(id) {
            Some(recording) => {
                if recording.finalized {
                    return Err(RuntimeError::StoreFinalized(id.to_string()));
                }
                f(recording)
            }
            None => Err(RuntimeError::RecordingNotFound(id.to_string())),
        }
    }
}

#[async_trait]
impl SignalStore for InMemoryStore {
    async fn create(&self, meta: RecordingMeta) -> Result<String, RuntimeError> {
        let id = Uuid::new_v4().to_string();
        let recording = Recording {
            id: id.clone(),
            name: meta.name,
            tags: meta.tags,
            provider_type: meta.provider_type,
            signal_count: 0,
            duration_ms: None,
            finalized: false,
            signals: Vec::new(),
            checkpoints: HashMap::new(),
            created_at: Utc::now(),
        };
        self.recordings
            .write()
            .expect("recordings lock poisoned")
            .insert(id.clone(), recording);
        Ok(id)
    }

    async fn append(&self, id: &str, signal: Signal) -> Result<(), RuntimeError> {
        self.with_recording_mut(id, |recording| {
            recording.signals.push(signal);
            recording.signal_count = recording.signals.len();
            Ok(())
        })
    }

    async fn append_batch(&self, id: &str, signals: Vec<Signal>) -> Result<(), RuntimeError> {
        self.with_recording_mut(id, |recording| {
            recording.signals.extend(signals);
            recording.signal_count = recording.signals.len();
            Ok(())
        })
    }

    async fn checkpoint(&self, id: &str, name: &str) -> Result<(), RuntimeError> {
        self.with_recording_mut(id, |recording| {
            let index = recording.signals.len();
            recording.checkpoints.insert(name.to_string(), index);
            Ok(())
        })
    }

    async fn finalize(&self, id: &str, duration_ms: u64) -> Result<(), RuntimeError> {
        self.with_recording_mut(id, |recording| {
            recording.duration_ms = Some(duration_ms);
            recording.finalized = true;
            Ok(())
        })
    }

    async fn load(&self, id: &str) -> Result<Option<Recording>, RuntimeError> {
        Ok(self
            .recordings
            .read()
            .expect("recordings lock poisoned")
            .get(id)
            .cloned())
    }

    async fn load_signals(&self, id: &str, filter: LoadFilter) -> Result<Vec<Signal>, RuntimeError> {
        self.with_recording(id, |recording| {
            let from = filter.from_index.unwrap_or(0);
            let to = filter.to_index.unwrap_or(recording.signals.len());
            let slice = recording.signals.get(from..to.min(recording.signals.len())).unwrap_or(&[]);
            let signals = match &filter.patterns {
                None => slice.to_vec(),
                Some(patterns) => slice
                    .iter()
                    .filter(|signal| patterns.iter().any(|p| p.matches(&signal.name)))
                    .cloned()
                    .collect(),
            };
            Ok(signals)
        })
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<RecordingSummary>, RuntimeError> {
        let recordings = self.recordings.read().expect("recordings lock poisoned");
        let summaries = recordings
            .values()
            .filter(|recording| !filter.finalized_only || recording.finalized)
            .filter(|recording| match &filter.tag {
                None => true,
                Some(tag) => recording
                    .tags
                    .as_ref()
                    .map(|tags| tags.iter().any(|t| t == tag))
                    .unwrap_or(false),
            })
            .map(|recording| RecordingSummary {
                id: recording.id.clone(),
                name: recording.name.clone(),
                tags: recording.tags.clone(),
                signal_count: recording.signal_count,
                finalized: recording.finalized,
            })
            .collect();
        Ok(summaries)
    }

    async fn exists(&self, id: &str) -> Result<bool, RuntimeError> {
        Ok(self.recordings.read().expect("recordings lock poisoned").contains_key(id))
    }

    async fn delete(&self, id: &str) -> Result<(), RuntimeError> {
        self.recordings.write().expect("recordings lock poisoned").remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), RuntimeError> {
        self.recordings.write().expect("recordings lock poisoned").clear();
        Ok(())
    }
}
