//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use triage_analysis::AnalysisProvider;
use triage_core::config::TriageConfig;
use triage_core::EventBus;
use triage_pipeline::{SharedMemory, TriageAgent};

/// Shared application state.
///
/// All fields are cheap to clone; the event bus lives inside the agent.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<TriageConfig>,
    pub agent: Arc<TriageAgent>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: TriageConfig, agent: TriageAgent) -> Self {
        Self {
            config: Arc::new(config),
            agent: Arc::new(agent),
            start_time: Instant::now(),
        }
    }

    /// Wire a fresh bus, memory and agent around `provider`.
    pub fn from_config(config: TriageConfig, provider: Arc<dyn AnalysisProvider>) -> Self {
        let memory = Arc::new(SharedMemory::from_config(&config.pipeline));
        let agent = TriageAgent::new(EventBus::new(), memory, provider, &config.pipeline);
        Self::new(config, agent)
    }

    pub fn bus(&self) -> &EventBus {
        self.agent.bus()
    }
}
