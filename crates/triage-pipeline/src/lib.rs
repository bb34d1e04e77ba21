//! Error processing pipeline for Triage.
//!
//! Runs each submitted error through validate -> analyze -> commit ->
//! finalize, broadcasting one event per stage on the shared
//! [`triage_core::EventBus`] and folding results into [`SharedMemory`].

pub mod agent;
pub mod error;
pub mod memory;
pub mod pipeline;

pub use agent::{AgentInfo, AgentStatus, Capability, CapabilityTable, TriageAgent};
pub use error::PipelineError;
pub use memory::{MemoryState, MemoryStatistics, SharedMemory, Statistics};
pub use pipeline::{ProcessingPipeline, WorkflowOutcome};
