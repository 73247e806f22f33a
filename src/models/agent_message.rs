//! Outcome envelope of one executor invocation or orchestration run

use crate::models::{AgentKind, SearchResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;

/// Result of one agent run
///
/// Built through [`AgentMessage::success`] or [`AgentMessage::failure`] so a
/// failed message always carries no results and zero confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub query_id: String,
    pub agent_type: AgentKind,
    pub results: Vec<SearchResult>,
    pub confidence: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub success: bool,
    #[serde(default)]
    pub error_message: String,
    /// Wall-clock seconds spent producing this message
    #[serde(default)]
    pub processing_time: f64,
    #[serde(default)]
    pub explanation: String,
}

impl AgentMessage {
    pub fn success(
        query_id: impl Into<String>,
        agent_type: AgentKind,
        results: Vec<SearchResult>,
        confidence: f32,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            query_id: query_id.into(),
            agent_type,
            results,
            confidence: confidence.clamp(0.0, 1.0),
            metadata: Map::new(),
            success: true,
            error_message: String::new(),
            processing_time: 0.0,
            explanation: explanation.into(),
        }
    }

    pub fn failure(query_id: impl Into<String>, agent_type: AgentKind, error: impl Display) -> Self {
        let message = error.to_string();
        Self {
            query_id: query_id.into(),
            agent_type,
            results: Vec::new(),
            confidence: 0.0,
            metadata: Map::new(),
            success: false,
            explanation: format!("Error: {}", message),
            error_message: message,
            processing_time: 0.0,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_processing_time(mut self, seconds: f64) -> Self {
        self.processing_time = seconds;
        self
    }

    /// Structural check applied to every message an executor hands back
    pub fn is_valid(&self) -> bool {
        let confidence_ok = (0.0..=1.0).contains(&self.confidence);
        let failure_ok = self.success || (self.results.is_empty() && self.confidence == 0.0);
        !self.query_id.is_empty() && confidence_ok && failure_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultType;

    #[test]
    fn test_failure_invariant() {
        let msg = AgentMessage::failure("q1", AgentKind::VisualSearch, "embedding failed");
        assert!(!msg.success);
        assert!(msg.results.is_empty());
        assert_eq!(msg.confidence, 0.0);
        assert_eq!(msg.error_message, "embedding failed");
        assert!(msg.is_valid());
    }

    #[test]
    fn test_success_clamps_confidence() {
        let results = vec![SearchResult::new("v", None, 1.0, AgentKind::TextSearch, ResultType::Video)];
        let msg = AgentMessage::success("q1", AgentKind::TextSearch, results, 1.3, "ok");
        assert_eq!(msg.confidence, 1.0);
        assert!(msg.is_valid());
    }

    #[test]
    fn test_invalid_without_query_id() {
        let msg = AgentMessage::success("", AgentKind::TextSearch, vec![], 0.5, "");
        assert!(!msg.is_valid());
    }
}
