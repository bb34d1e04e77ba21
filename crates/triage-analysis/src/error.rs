//! Error types for the analysis providers.

/// Why a classifier could not produce an analysis.
///
/// These never reach the pipeline: [`crate::AiAssistedProvider`] absorbs them
/// and answers from the keyword rules instead.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid provider configuration: {0}")]
    Config(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unparsable provider output: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_error_display() {
        let err = AnalysisError::Status {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "provider returned 429: rate limited");

        let err = AnalysisError::Parse("missing field `type`".to_string());
        assert_eq!(err.to_string(), "unparsable provider output: missing field `type`");
    }
}
