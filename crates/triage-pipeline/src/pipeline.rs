//! The four-stage processing pipeline.
//!
//! ```text
//! validate ──► analyze ──► commit ──► finalize
//!    │            │           │           │
//!    ▼            ▼           ▼           ▼
//! <id>_validation <id>_workflow <id>_memory <id>_completed
//! ```
//!
//! Each stage publishes exactly one event on the bus before the next stage
//! starts, so every subscriber sees a submission's events in stage order.
//! The caller's result is returned directly and never waits on subscribers.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use triage_analysis::AnalysisProvider;
use triage_core::config::PipelineConfig;
use triage_core::types::{truncate_chars, Submission, WorkflowRecord};
use triage_core::{Event, EventBus, EventKind, EventStatus};

use crate::error::PipelineError;
use crate::memory::{now, MemoryState, SharedMemory};

const STAGES: [&str; 4] = ["validate", "analyze", "commit", "finalize"];

/// What a successful run hands back to the submitter.
#[derive(Clone, Debug, Serialize)]
pub struct WorkflowOutcome {
    pub workflow: WorkflowRecord,
    /// Memory as it stood right after this run's commit.
    pub memory: MemoryState,
}

pub struct ProcessingPipeline {
    bus: EventBus,
    memory: Arc<SharedMemory>,
    provider: Arc<dyn AnalysisProvider>,
    stage_delay: Duration,
    text_chars: usize,
}

impl ProcessingPipeline {
    pub fn new(
        bus: EventBus,
        memory: Arc<SharedMemory>,
        provider: Arc<dyn AnalysisProvider>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            bus,
            memory,
            provider,
            stage_delay: Duration::from_millis(config.stage_delay_ms),
            text_chars: config.last_processed_chars,
        }
    }

    pub fn memory(&self) -> &Arc<SharedMemory> {
        &self.memory
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn emit(&self, event: Event) {
        let report = self.bus.publish(&event);
        debug!(
            event_id = %event.id,
            stage = ?event.kind,
            status = ?event.status,
            delivered = report.delivered,
            failed = report.failed,
            "Stage event published"
        );
    }

    async fn pause(&self) {
        if !self.stage_delay.is_zero() {
            tokio::time::sleep(self.stage_delay).await;
        }
    }

    /// Run one submission through every stage.
    ///
    /// Empty or whitespace-only input publishes a single `validation`/`error`
    /// event and returns [`PipelineError::Validation`]. Anything that fails
    /// after validation publishes a single `error` event for the failing
    /// stage and leaves memory untouched.
    pub async fn process(&self, submission: Submission) -> Result<WorkflowOutcome, PipelineError> {
        let submission_id = submission.resolve_id();
        let started_at = now();

        // Validate
        let text = submission.error.trim();
        if text.is_empty() {
            warn!(submission_id = %submission_id, "Rejected empty submission");
            self.emit(Event::stage(
                &submission_id,
                EventKind::Validation,
                EventStatus::Error,
                "Error message is required",
            ));
            return Err(PipelineError::Validation(
                "Error message is required".to_string(),
            ));
        }

        info!(submission_id = %submission_id, text_length = text.len(), "Processing submission");
        self.emit(Event::stage(
            &submission_id,
            EventKind::Validation,
            EventStatus::Processing,
            "Validating error input",
        ));
        self.pause().await;

        // Analyze
        self.emit(Event::stage(
            &submission_id,
            EventKind::Workflow,
            EventStatus::Processing,
            "Analyzing error",
        ));
        let analysis = self.provider.analyze(text).await;
        debug!(
            submission_id = %submission_id,
            error_type = %analysis.error_type,
            severity = %analysis.severity,
            source = ?analysis.source,
            "Analysis finished"
        );
        self.pause().await;

        // Commit
        let record = WorkflowRecord::from_analysis(
            submission_id.clone(),
            truncate_chars(text, self.text_chars),
            analysis,
            started_at,
            now(),
        );
        let provider = self.provider.name().to_string();

        let mut failed_stage = EventKind::MemoryUpdate;
        let committed = self.memory.commit(record, |next| {
            let memory_payload = serde_json::to_value(next)?;
            failed_stage = EventKind::Completed;
            let workflow = next
                .workflows
                .first()
                .ok_or_else(|| PipelineError::Internal("committed workflow missing".to_string()))?;
            let completed_payload = json!({
                "workflow": serde_json::to_value(workflow)?,
                "pipeline": {
                    "stages": STAGES,
                    "provider": provider,
                    "durationMs": workflow.duration_ms,
                },
            });
            Ok((memory_payload, completed_payload))
        });

        let (memory, (memory_payload, completed_payload)) = match committed {
            Ok(done) => done,
            Err(e) => {
                warn!(submission_id = %submission_id, stage = ?failed_stage, error = %e, "Pipeline run failed");
                self.emit(Event::stage(
                    &submission_id,
                    failed_stage,
                    EventStatus::Error,
                    "Processing failed",
                ));
                return Err(e);
            }
        };

        self.emit(
            Event::stage(
                &submission_id,
                EventKind::MemoryUpdate,
                EventStatus::Completed,
                "Memory updated",
            )
            .with_payload(memory_payload),
        );
        self.pause().await;

        // Finalize
        let workflow = memory
            .workflows
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::Internal("committed workflow missing".to_string()))?;
        self.emit(
            Event::stage(
                &submission_id,
                EventKind::Completed,
                EventStatus::Completed,
                "Error processing completed",
            )
            .with_payload(completed_payload),
        );

        info!(
            submission_id = %submission_id,
            error_type = %workflow.error_type,
            severity = %workflow.severity,
            total_errors = memory.total_errors,
            "Submission processed"
        );

        Ok(WorkflowOutcome { workflow, memory })
    }
}
