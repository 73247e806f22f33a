//! External intent/strategy classifier
//!
//! The orchestrator and each executor send a system prompt plus the raw user
//! query and expect a single JSON object back. Every failure here is
//! recoverable: callers fall back to deterministic strategies.

mod gemini;
pub mod prompts;

pub use gemini::GeminiClassifier;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("API key not set: environment variable {0} is empty")]
    MissingApiKey(String),

    #[error("Classifier request failed: {0}")]
    Request(String),

    #[error("Classifier returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Classifier returned an empty response")]
    EmptyResponse,

    #[error("Classifier response is not valid JSON: {0}")]
    InvalidJson(String),
}

/// Structured-output service consulted for intents and strategies
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, system_prompt: &str, query: &str) -> Result<Value, ClassifierError>;
}

/// Parse a model reply into JSON, tolerating a surrounding markdown fence
pub fn extract_json(text: &str) -> Result<Value, ClassifierError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ClassifierError::EmptyResponse);
    }

    // ```json\n{...}\n```
    let body = match trimmed.strip_prefix("```") {
        Some(fenced) => fenced
            .split_once('\n')
            .map(|(_, rest)| rest)
            .unwrap_or("")
            .trim_end()
            .trim_end_matches('`')
            .trim(),
        None => trimmed,
    };

    serde_json::from_str(body).map_err(|e| ClassifierError::InvalidJson(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_json() {
        let value = extract_json(r#"{"intent_type": "text"}"#).unwrap();
        assert_eq!(value["intent_type"], "text");
    }

    #[test]
    fn test_extract_fenced_json() {
        let reply = "```json\n{\"temporal_type\": \"TIME_RANGE\"}\n```";
        let value = extract_json(reply).unwrap();
        assert_eq!(value["temporal_type"], "TIME_RANGE");
    }

    #[test]
    fn test_extract_rejects_prose() {
        assert!(matches!(
            extract_json("Sure! Here is the plan."),
            Err(ClassifierError::InvalidJson(_))
        ));
        assert!(matches!(extract_json("   "), Err(ClassifierError::EmptyResponse)));
    }
}
