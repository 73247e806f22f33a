//! Retrieved items and their deduplication identity

use crate::models::AgentKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Granularity of a retrieved item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Video,
    Keyframe,
    Object,
}

/// Deduplication unit: a video, or one keyframe inside it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub video_id: String,
    pub keyframe_id: Option<String>,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.keyframe_id {
            Some(keyframe_id) => write!(f, "{}#{}", self.video_id, keyframe_id),
            None => write!(f, "{}#video", self.video_id),
        }
    }
}

/// One retrieved item flowing through ranking and fusion
///
/// `score` is only guaranteed to sit in [0, 1] after normalization or fusion
/// capping. `explanation` is append-only: every stage adds to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub video_id: String,
    pub keyframe_id: Option<String>,
    pub score: f32,
    pub source_agent: AgentKind,
    pub result_type: ResultType,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub explanation: String,
}

impl SearchResult {
    pub fn new(
        video_id: impl Into<String>,
        keyframe_id: Option<String>,
        score: f32,
        source_agent: AgentKind,
        result_type: ResultType,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            keyframe_id,
            score,
            source_agent,
            result_type,
            metadata: Map::new(),
            explanation: String::new(),
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            video_id: self.video_id.clone(),
            keyframe_id: self.keyframe_id.clone(),
        }
    }

    /// Append a provenance note, space-separated from what is already there
    pub fn append_explanation(&mut self, note: &str) {
        if !self.explanation.is_empty() {
            self.explanation.push(' ');
        }
        self.explanation.push_str(note);
    }

    /// Mean detector confidence attached by the visual executor, if any
    pub fn object_confidence(&self) -> Option<f32> {
        self.metadata
            .get("object_confidence")
            .and_then(Value::as_f64)
            .map(|v| v as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_sentinel() {
        let video = SearchResult::new("L01_V001", None, 0.5, AgentKind::TextSearch, ResultType::Video);
        let frame = SearchResult::new(
            "L01_V001",
            Some("012".to_string()),
            0.5,
            AgentKind::VisualSearch,
            ResultType::Keyframe,
        );

        assert_eq!(video.identity_key().to_string(), "L01_V001#video");
        assert_eq!(frame.identity_key().to_string(), "L01_V001#012");
        assert_ne!(video.identity_key(), frame.identity_key());
    }

    #[test]
    fn test_append_explanation() {
        let mut result = SearchResult::new("v", None, 0.1, AgentKind::TextSearch, ResultType::Video);
        result.append_explanation("[TextSearchAgent]");
        assert_eq!(result.explanation, "[TextSearchAgent]");

        result.append_explanation("(multi-agent match)");
        assert_eq!(result.explanation, "[TextSearchAgent] (multi-agent match)");
    }

    #[test]
    fn test_object_confidence_from_metadata() {
        let mut metadata = Map::new();
        metadata.insert("object_confidence".to_string(), serde_json::json!(0.75));
        let result = SearchResult::new("v", Some("1".into()), 0.1, AgentKind::VisualSearch, ResultType::Keyframe)
            .with_metadata(metadata);

        assert_eq!(result.object_confidence(), Some(0.75));
    }
}
