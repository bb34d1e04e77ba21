//! The triage agent: pipeline, memory and a name-addressable capability table.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use triage_analysis::AnalysisProvider;
use triage_core::config::PipelineConfig;
use triage_core::types::Submission;
use triage_core::EventBus;

use crate::error::PipelineError;
use crate::memory::{MemoryState, MemoryStatistics, SharedMemory};
use crate::pipeline::{ProcessingPipeline, WorkflowOutcome};

pub const AGENT_NAME: &str = "error-triage-agent";

/// Boxed future returned by a capability handler.
pub type CapabilityFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, PipelineError>> + Send + 'a>>;

/// A capability handler: takes the agent and JSON arguments.
pub type CapabilityHandler = for<'a> fn(&'a TriageAgent, Value) -> CapabilityFuture<'a>;

#[derive(Clone, Copy)]
pub struct Capability {
    pub name: &'static str,
    pub description: &'static str,
    pub handler: CapabilityHandler,
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Method name to handler, in name order.
#[derive(Clone, Debug, Default)]
pub struct CapabilityTable {
    entries: BTreeMap<&'static str, Capability>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any previous one with the same name.
    pub fn register(&mut self, capability: Capability) {
        self.entries.insert(capability.name, capability);
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The four built-in methods.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register(Capability {
            name: "processError",
            description: "Run an error message through the processing pipeline",
            handler: process_error,
        });
        table.register(Capability {
            name: "getStatus",
            description: "Agent metadata, memory snapshot and derived statistics",
            handler: get_status,
        });
        table.register(Capability {
            name: "getMemory",
            description: "Current memory snapshot",
            handler: get_memory,
        });
        table.register(Capability {
            name: "clearMemory",
            description: "Reset memory to its initial state",
            handler: clear_memory,
        });
        table
    }
}

fn process_error(agent: &TriageAgent, args: Value) -> CapabilityFuture<'_> {
    Box::pin(async move {
        let submission: Submission = serde_json::from_value(args)
            .map_err(|e| PipelineError::InvalidArguments(e.to_string()))?;
        let outcome = agent.process(submission).await?;
        Ok(serde_json::to_value(outcome)?)
    })
}

fn get_status(agent: &TriageAgent, _args: Value) -> CapabilityFuture<'_> {
    Box::pin(async move { Ok(serde_json::to_value(agent.status())?) })
}

fn get_memory(agent: &TriageAgent, _args: Value) -> CapabilityFuture<'_> {
    Box::pin(async move { Ok(serde_json::to_value(agent.memory_snapshot())?) })
}

fn clear_memory(agent: &TriageAgent, _args: Value) -> CapabilityFuture<'_> {
    Box::pin(async move {
        let memory = agent.clear_memory();
        Ok(json!({ "success": true, "memory": memory }))
    })
}

/// Agent metadata reported by the status endpoints.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub name: String,
    pub version: String,
    pub provider: String,
    pub uptime_secs: u64,
    pub capabilities: Vec<String>,
    /// Live event stream subscribers.
    pub connected_clients: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct AgentStatus {
    pub agent: AgentInfo,
    pub memory: MemoryState,
    pub statistics: MemoryStatistics,
}

pub struct TriageAgent {
    pipeline: ProcessingPipeline,
    capabilities: CapabilityTable,
    started: Instant,
}

impl TriageAgent {
    pub fn new(
        bus: EventBus,
        memory: Arc<SharedMemory>,
        provider: Arc<dyn AnalysisProvider>,
        config: &PipelineConfig,
    ) -> Self {
        Self::with_capabilities(
            ProcessingPipeline::new(bus, memory, provider, config),
            CapabilityTable::standard(),
        )
    }

    pub fn with_capabilities(pipeline: ProcessingPipeline, capabilities: CapabilityTable) -> Self {
        Self {
            pipeline,
            capabilities,
            started: Instant::now(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        self.pipeline.bus()
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            name: AGENT_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            provider: self.pipeline.provider_name().to_string(),
            uptime_secs: self.started.elapsed().as_secs(),
            capabilities: self
                .capabilities
                .names()
                .into_iter()
                .map(String::from)
                .collect(),
            connected_clients: self.pipeline.bus().subscriber_count(),
        }
    }

    /// Metadata plus a memory snapshot. No side effects.
    pub fn status(&self) -> AgentStatus {
        let memory = self.pipeline.memory().snapshot();
        let statistics = memory.statistics();
        AgentStatus {
            agent: self.info(),
            memory,
            statistics,
        }
    }

    pub async fn process(&self, submission: Submission) -> Result<WorkflowOutcome, PipelineError> {
        self.pipeline.process(submission).await
    }

    pub fn memory_snapshot(&self) -> MemoryState {
        self.pipeline.memory().snapshot()
    }

    pub fn clear_memory(&self) -> MemoryState {
        self.pipeline.memory().clear()
    }

    /// Dispatch `method` through the capability table.
    pub async fn call(&self, method: &str, args: Value) -> Result<Value, PipelineError> {
        let capability = self
            .capabilities
            .get(method)
            .ok_or_else(|| PipelineError::UnknownMethod(method.to_string()))?;
        debug!(method = %method, "Dispatching agent call");
        (capability.handler)(self, args).await
    }
}
