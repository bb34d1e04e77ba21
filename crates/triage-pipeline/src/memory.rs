//! Process-wide aggregate of processed errors.
//!
//! [`SharedMemory`] is constructed once at startup and passed to whoever needs
//! it. Readers get full snapshots; the only writes are the pipeline's commit
//! and an explicit clear, both of which replace the whole state at once so a
//! reader never sees a half-applied update.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use triage_core::config::PipelineConfig;
use triage_core::types::{AnalysisSource, Timestamp, WorkflowRecord};

use crate::error::PipelineError;

/// Occurrence counts per classification label and per severity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub by_type: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
}

/// Snapshot of everything the server remembers. `Default` is the zero state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryState {
    /// Successful submissions since start or last clear.
    pub total_errors: u64,
    /// Truncated text of the most recent submission.
    pub last_processed: Option<String>,
    /// Most recent workflows, newest first, bounded by the window size.
    pub workflows: Vec<WorkflowRecord>,
    pub statistics: Statistics,
    pub last_updated: Option<Timestamp>,
}

/// Figures derived from a [`MemoryState`] for status reporting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStatistics {
    pub total_errors: u64,
    pub unique_types: usize,
    pub most_common_type: Option<String>,
    pub most_common_severity: Option<String>,
    /// Mean confidence over the retained workflows.
    pub average_confidence: Option<f64>,
    /// Retained workflows answered by the language model.
    pub ai_assisted: usize,
    /// Retained workflows where the model failed and rules answered.
    pub fallbacks: usize,
}

/// Highest count wins; ties go to the alphabetically first key.
fn most_common(counts: &BTreeMap<String, u64>) -> Option<String> {
    counts
        .iter()
        .fold(None::<(&String, u64)>, |best, (key, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((key, count)),
        })
        .map(|(key, _)| key.clone())
}

impl MemoryState {
    /// Fold one completed workflow into the state.
    fn apply(&mut self, record: WorkflowRecord, window: usize) {
        self.total_errors += 1;
        self.last_processed = Some(record.error_text.clone());
        *self
            .statistics
            .by_type
            .entry(record.error_type.clone())
            .or_insert(0) += 1;
        *self
            .statistics
            .by_severity
            .entry(record.severity.as_str().to_string())
            .or_insert(0) += 1;
        self.last_updated = Some(record.completed_at);
        self.workflows.insert(0, record);
        self.workflows.truncate(window);
    }

    /// Derive summary figures for the status endpoint.
    pub fn statistics(&self) -> MemoryStatistics {
        let average_confidence = if self.workflows.is_empty() {
            None
        } else {
            let sum: f64 = self.workflows.iter().map(|w| w.confidence).sum();
            Some(sum / self.workflows.len() as f64)
        };

        MemoryStatistics {
            total_errors: self.total_errors,
            unique_types: self.statistics.by_type.len(),
            most_common_type: most_common(&self.statistics.by_type),
            most_common_severity: most_common(&self.statistics.by_severity),
            average_confidence,
            ai_assisted: self
                .workflows
                .iter()
                .filter(|w| w.source == AnalysisSource::Ai)
                .count(),
            fallbacks: self
                .workflows
                .iter()
                .filter(|w| w.source == AnalysisSource::Fallback)
                .count(),
        }
    }
}

/// Shared, lock-protected [`MemoryState`].
pub struct SharedMemory {
    state: RwLock<MemoryState>,
    window: usize,
}

impl SharedMemory {
    /// Create an empty memory retaining at most `window` workflows.
    pub fn new(window: usize) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            window: window.max(1),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.workflow_window)
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Full copy of the current state.
    pub fn snapshot(&self) -> MemoryState {
        // Writers only ever swap in a complete state, so a poisoned lock still
        // guards a consistent value.
        self.state
            .read()
            .map(|state| state.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Reset everything to the zero state. Returns the reset snapshot.
    pub fn clear(&self) -> MemoryState {
        let fresh = MemoryState::default();
        match self.state.write() {
            Ok(mut state) => *state = fresh.clone(),
            Err(e) => *e.into_inner() = fresh.clone(),
        }
        tracing::info!("Memory cleared");
        fresh
    }

    /// Apply `record` atomically.
    ///
    /// The next state is built off to the side and handed to `finish` (which
    /// prepares whatever the caller needs from it, such as event payloads).
    /// The state is swapped in only if `finish` succeeds; on error the old
    /// state stays untouched.
    ///
    /// A poisoned lock fails this commit only; the poison is cleared so the
    /// next commit proceeds.
    pub(crate) fn commit<T, F>(
        &self,
        record: WorkflowRecord,
        finish: F,
    ) -> Result<(MemoryState, T), PipelineError>
    where
        F: FnOnce(&MemoryState) -> Result<T, PipelineError>,
    {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => {
                let message = format!("Memory lock poisoned: {}", poisoned);
                drop(poisoned);
                self.state.clear_poison();
                tracing::warn!("Memory lock was poisoned; failing this commit");
                return Err(PipelineError::Internal(message));
            }
        };

        let mut next = state.clone();
        next.apply(record, self.window);
        let output = finish(&next)?;

        *state = next.clone();
        Ok((next, output))
    }
}

#[cfg(test)]
impl SharedMemory {
    /// Poison the state lock by panicking while holding the write guard.
    pub(crate) fn poison(&self) {
        std::thread::scope(|s| {
            let _ = s
                .spawn(|| {
                    let _guard = self.state.write().unwrap();
                    panic!("poisoning memory lock");
                })
                .join();
        });
    }
}

impl Default for SharedMemory {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Timestamp helper kept next to the state it stamps.
pub(crate) fn now() -> Timestamp {
    Utc::now()
}
