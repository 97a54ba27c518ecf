//! Error types for the Docent pipeline.
//!
//! The taxonomy mirrors the failure-handling design: classification
//! timeouts are recovered internally, insufficient evidence is a value
//! (not an error), generation failures surface one user-visible message,
//! and cache failures degrade to always-miss. Nothing here is fatal to
//! the process.

use thiserror::Error;

/// Errors that can occur while answering a query.
#[derive(Debug, Error)]
pub enum DocentError {
    /// The classification backend did not answer within its deadline.
    /// Callers recover by falling back to the default classification;
    /// this variant is never surfaced to the user.
    #[error("classification timed out after {timeout_secs}s")]
    ClassificationTimeout {
        /// The deadline that elapsed.
        timeout_secs: u64,
    },

    /// The embedding adapter failed.
    #[error("embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector index adapter failed.
    #[error("vector index error: {0}")]
    Index(String),

    /// The document/metadata store adapter failed.
    #[error("document store error: {0}")]
    Store(String),

    /// The generation backend failed after its single retry.
    /// Surfaced as one user-visible message through whatever channel
    /// (blocking response or stream error event) the request used.
    #[error("generation error ({provider}): {message}")]
    UpstreamGeneration {
        /// The generation backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DocentError {
    /// The single sentence shown to the end user when this error
    /// escapes the pipeline. Internal detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            DocentError::UpstreamGeneration { .. } => {
                "I couldn't generate an answer right now. Please try again in a moment."
                    .to_string()
            }
            DocentError::Embedding { .. } | DocentError::Index(_) => {
                "I couldn't search your documents right now. Please try again in a moment."
                    .to_string()
            }
            DocentError::Store(_) => {
                "I couldn't look that up right now. Please try again in a moment.".to_string()
            }
            DocentError::ClassificationTimeout { .. } | DocentError::Config(_) => {
                "Something went wrong handling your question. Please try again.".to_string()
            }
        }
    }
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, DocentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_detail() {
        let err = DocentError::UpstreamGeneration {
            provider: "openai".to_string(),
            message: "HTTP 500 from upstream".to_string(),
        };
        assert!(!err.user_message().contains("500"));
    }

    #[test]
    fn test_display_includes_provider() {
        let err = DocentError::Embedding {
            provider: "openai".to_string(),
            message: "timeout".to_string(),
        };
        assert!(err.to_string().contains("openai"));
    }
}
