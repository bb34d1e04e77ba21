//! Error classification for Triage.
//!
//! Provides the [`AnalysisProvider`] seam used by the processing pipeline,
//! a keyword-rule classifier, and an OpenAI-compatible language model
//! classifier that falls back to the rules whenever it cannot answer.

pub mod error;
pub mod llm;
pub mod provider;
pub mod rules;

pub use error::AnalysisError;
pub use llm::LlmAnalyzer;
pub use provider::{provider_from_config, AiAssistedProvider, AnalysisProvider};
pub use rules::RuleBasedAnalyzer;
