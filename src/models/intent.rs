//! Intent-analysis output: which executors run and with what parameters

use crate::models::AgentKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentType {
    Text,
    Visual,
    Hybrid,
    Temporal,
}

/// How multiple executors' result sets are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FusionMode {
    Intersection,
    Union,
    Weighted,
    Ranked,
}

impl FusionMode {
    /// Case-insensitive parse; anything unrecognised merges as a union
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or(FusionMode::Union)
    }
}

impl FromStr for FusionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intersection" => Ok(FusionMode::Intersection),
            "union" => Ok(FusionMode::Union),
            "weighted" => Ok(FusionMode::Weighted),
            "ranked" => Ok(FusionMode::Ranked),
            other => Err(format!("unknown fusion mode: {}", other)),
        }
    }
}

impl fmt::Display for FusionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FusionMode::Intersection => "INTERSECTION",
            FusionMode::Union => "UNION",
            FusionMode::Weighted => "WEIGHTED",
            FusionMode::Ranked => "RANKED",
        };
        f.write_str(name)
    }
}

/// Text executor slice of the intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextParams {
    #[serde(default)]
    pub search_terms: Option<Vec<String>>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub author_filter: Option<String>,
}

/// Visual executor slice of the intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualParams {
    #[serde(default)]
    pub search_description: Option<String>,
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
}

/// Temporal executor slice of the intent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalParams {
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryIntent {
    pub intent_type: IntentType,
    /// Ordered, duplicate-free
    pub agents_needed: Vec<AgentKind>,
    pub text_params: Option<TextParams>,
    pub visual_params: Option<VisualParams>,
    pub temporal_params: Option<TemporalParams>,
    pub fusion_strategy: FusionMode,
    pub reasoning: String,
}

/// Wire shape returned by the classifier
#[derive(Debug, Deserialize)]
struct RawIntent {
    #[serde(default)]
    intent_type: Option<IntentType>,
    #[serde(default)]
    agents_needed: Option<Vec<String>>,
    #[serde(default)]
    text_params: Option<TextParams>,
    #[serde(default)]
    visual_params: Option<VisualParams>,
    #[serde(default)]
    temporal_params: Option<TemporalParams>,
    #[serde(default)]
    fusion_strategy: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

impl QueryIntent {
    /// Build an intent from the classifier's JSON object
    pub fn from_classifier(value: Value) -> Result<Self, serde_json::Error> {
        let raw: RawIntent = serde_json::from_value(value)?;

        let names = raw
            .agents_needed
            .unwrap_or_else(|| vec![AgentKind::TextSearch.name().to_string()]);
        let mut agents_needed = Vec::with_capacity(names.len());
        for name in &names {
            match AgentKind::from_name(name) {
                Some(kind) if !agents_needed.contains(&kind) => agents_needed.push(kind),
                Some(_) => {}
                None => tracing::warn!("Ignoring unknown agent in intent: {}", name),
            }
        }

        Ok(Self {
            intent_type: raw.intent_type.unwrap_or(IntentType::Text),
            agents_needed,
            text_params: raw.text_params,
            visual_params: raw.visual_params,
            temporal_params: raw.temporal_params,
            fusion_strategy: raw
                .fusion_strategy
                .as_deref()
                .map(FusionMode::parse_lossy)
                .unwrap_or(FusionMode::Weighted),
            reasoning: raw.reasoning.unwrap_or_default(),
        })
    }

    /// Text-only intent used when the classifier cannot be reached or parsed
    pub fn fallback(query: &str) -> Self {
        Self {
            intent_type: IntentType::Text,
            agents_needed: vec![AgentKind::TextSearch],
            text_params: Some(TextParams {
                search_terms: Some(vec![query.to_string()]),
                fields: Some(vec!["title".to_string(), "description".to_string()]),
                author_filter: None,
            }),
            visual_params: None,
            temporal_params: None,
            fusion_strategy: FusionMode::Weighted,
            reasoning: "fallback".to_string(),
        }
    }

    /// Agents to dispatch, excluding fusion and orchestration
    pub fn retrieval_agents(&self) -> impl Iterator<Item = AgentKind> + '_ {
        self.agents_needed
            .iter()
            .copied()
            .filter(|kind| kind.is_retrieval())
    }
}
