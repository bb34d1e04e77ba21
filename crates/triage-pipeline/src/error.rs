//! Error types for the processing pipeline.

/// Errors surfaced by a pipeline run or an agent call.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The submission was rejected before any work was done.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Something unexpected broke after validation; nothing was committed.
    #[error("internal pipeline error: {0}")]
    Internal(String),
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Internal(format!("serialization failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_display() {
        assert_eq!(
            PipelineError::Validation("empty".to_string()).to_string(),
            "validation failed: empty"
        );
        assert_eq!(
            PipelineError::UnknownMethod("launchRockets".to_string()).to_string(),
            "unknown method: launchRockets"
        );
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: PipelineError = json_err.into();
        assert!(matches!(err, PipelineError::Internal(_)));
    }
}
