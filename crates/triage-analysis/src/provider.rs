//! The analysis seam used by the processing pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use triage_core::config::{AnalysisConfig, AnalysisMode};
use triage_core::types::{AnalysisSource, ErrorAnalysis};

use crate::llm::LlmAnalyzer;
use crate::rules::RuleBasedAnalyzer;

/// Pluggable error classifier.
///
/// `analyze` is total: implementations absorb their own failures and always
/// return a classification, so the pipeline never has to handle a provider
/// error.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Short name reported in agent metadata.
    fn name(&self) -> &str;

    /// Classify one error message.
    async fn analyze(&self, text: &str) -> ErrorAnalysis;
}

/// Language model classification with a keyword-rule safety net.
///
/// Any model failure (transport, non-2xx status, unparsable output) is logged
/// and answered from the rules, tagged [`AnalysisSource::Fallback`]. There is
/// no retry.
pub struct AiAssistedProvider {
    llm: LlmAnalyzer,
    rules: RuleBasedAnalyzer,
}

impl AiAssistedProvider {
    pub fn new(llm: LlmAnalyzer) -> Self {
        Self {
            llm,
            rules: RuleBasedAnalyzer::new(),
        }
    }
}

#[async_trait]
impl AnalysisProvider for AiAssistedProvider {
    fn name(&self) -> &str {
        "ai"
    }

    async fn analyze(&self, text: &str) -> ErrorAnalysis {
        match self.llm.classify(text).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, model = %self.llm.model(), "AI analysis failed, using keyword rules");
                let mut analysis = self.rules.classify(text);
                analysis.source = AnalysisSource::Fallback;
                analysis
            }
        }
    }
}

/// Build the provider selected by configuration.
///
/// "ai" mode with an unusable endpoint configuration degrades to rules.
pub fn provider_from_config(config: &AnalysisConfig) -> Arc<dyn AnalysisProvider> {
    match config.mode() {
        AnalysisMode::Rules => Arc::new(RuleBasedAnalyzer::new()),
        AnalysisMode::Ai => match LlmAnalyzer::new(config.llm.clone()) {
            Ok(llm) => Arc::new(AiAssistedProvider::new(llm)),
            Err(e) => {
                warn!(error = %e, "AI analysis unavailable, using keyword rules");
                Arc::new(RuleBasedAnalyzer::new())
            }
        },
    }
}
