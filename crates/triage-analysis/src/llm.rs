//! OpenAI-compatible language model classifier.
//!
//! Sends the error text to `/chat/completions` with a system prompt asking for
//! a fixed JSON object, then parses that object into an [`ErrorAnalysis`].
//! Works against OpenAI, Ollama's compatibility endpoint, vLLM and similar.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use triage_core::config::LlmConfig;
use triage_core::types::{AnalysisSource, ErrorAnalysis, Severity};

use crate::error::AnalysisError;

const SYSTEM_PROMPT: &str = "You are an error triage assistant. Classify the error message \
the user sends. Reply with a single JSON object and nothing else, using exactly these keys: \
\"type\" (short snake_case label such as type_error, network, database), \
\"category\" (runtime, code, infrastructure, data, security, resource or general), \
\"severity\" (low, medium, high or critical), \
\"rootCause\" (one sentence), \
\"suggestions\" (array of short strings), \
\"confidence\" (number between 0 and 1).";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// The JSON object the model is asked to produce.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelVerdict {
    #[serde(rename = "type")]
    error_type: String,
    #[serde(default)]
    category: Option<String>,
    severity: String,
    root_cause: String,
    #[serde(default)]
    suggestions: Vec<String>,
    confidence: f64,
}

// =============================================================================
// Client
// =============================================================================

/// Language model classifier. Fallible; see [`crate::AiAssistedProvider`]
/// for the total wrapper used by the pipeline.
pub struct LlmAnalyzer {
    client: Client,
    config: LlmConfig,
}

impl LlmAnalyzer {
    /// Create a classifier for the given endpoint.
    pub fn new(config: LlmConfig) -> Result<Self, AnalysisError> {
        if config.base_url.trim().is_empty() {
            return Err(AnalysisError::Config("base_url must not be empty".to_string()));
        }
        if config.model.trim().is_empty() {
            return Err(AnalysisError::Config("model must not be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AnalysisError::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(url = %config.base_url, model = %config.model, "LLM analyzer initialized");
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Ask the model to classify `text`.
    pub async fn classify(&self, text: &str) -> Result<ErrorAnalysis, AnalysisError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: self.config.temperature,
            stream: false,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref api_key) = self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        debug!(model = %self.config.model, text_length = text.len(), "Requesting LLM analysis");

        let response = builder
            .send()
            .await
            .map_err(|e| AnalysisError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorResponse>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(format!("Failed to parse response: {}", e)))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AnalysisError::Parse("response has no choices".to_string()))?;

        parse_verdict(&content)
    }
}

/// Pull the first JSON object out of a model reply.
///
/// Models often wrap JSON in markdown fences or add a sentence around it.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Parse a model reply into an analysis. Missing required keys, an unknown
/// severity or a non-finite confidence are all parse errors.
pub(crate) fn parse_verdict(content: &str) -> Result<ErrorAnalysis, AnalysisError> {
    let json = extract_json_object(content)
        .ok_or_else(|| AnalysisError::Parse("no JSON object in reply".to_string()))?;

    let verdict: ModelVerdict =
        serde_json::from_str(json).map_err(|e| AnalysisError::Parse(e.to_string()))?;

    let severity = Severity::parse(&verdict.severity).ok_or_else(|| {
        AnalysisError::Parse(format!("unknown severity \"{}\"", verdict.severity))
    })?;

    if !verdict.confidence.is_finite() {
        return Err(AnalysisError::Parse("confidence is not a number".to_string()));
    }

    let error_type = verdict.error_type.trim().to_string();
    if error_type.is_empty() {
        return Err(AnalysisError::Parse("empty type".to_string()));
    }

    Ok(ErrorAnalysis {
        error_type,
        category: verdict
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "general".to_string()),
        severity,
        root_cause: verdict.root_cause,
        suggestions: verdict.suggestions,
        confidence: verdict.confidence.clamp(0.0, 1.0),
        source: AnalysisSource::Ai,
    })
}
