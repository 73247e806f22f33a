//! Fusion of several executors' result sets into one ranked list
//!
//! The mode is chosen from the inputs themselves; the mode requested by the
//! intent is advisory and only recorded in the output metadata.

use crate::models::{AgentKind, AgentMessage, FusionMode, SearchResult};
use crate::retrieval::deduplication::deduplicate_results;
use crate::retrieval::ranker::sort_by_score;
use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Non-finite score {score} from {agent} for {key}")]
    NonFiniteScore {
        agent: AgentKind,
        key: String,
        score: f32,
    },

    #[error("Non-finite confidence from {0}")]
    NonFiniteConfidence(AgentKind),
}

/// Confidence above which the weighted mode is chosen
pub const WEIGHTED_CONFIDENCE_THRESHOLD: f32 = 0.8;

/// Score boost for results found by several agents
const INTERSECTION_BOOST: f32 = 1.2;

/// Per-criterion weights for the ranked mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingCriteria {
    pub visual_similarity: f32,
    pub text_relevance: f32,
    pub temporal_accuracy: f32,
    pub object_confidence: f32,
}

impl Default for RankingCriteria {
    fn default() -> Self {
        Self {
            visual_similarity: 0.4,
            text_relevance: 0.3,
            temporal_accuracy: 0.2,
            object_confidence: 0.1,
        }
    }
}

/// Deduplication settings
///
/// `similarity_threshold` is reserved; only exact identity keys are merged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeduplicationConfig {
    pub enabled: bool,
    pub similarity_threshold: f32,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.9,
        }
    }
}

/// Fusion decision for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionPlan {
    pub mode: FusionMode,
    #[serde(default)]
    pub ranking_criteria: RankingCriteria,
    #[serde(default)]
    pub deduplication: DeduplicationConfig,
    #[serde(default)]
    pub explanation: String,
}

impl FusionPlan {
    pub fn new(mode: FusionMode) -> Self {
        Self {
            mode,
            ranking_criteria: RankingCriteria::default(),
            deduplication: DeduplicationConfig::default(),
            explanation: String::new(),
        }
    }

    /// One input forces union, high average confidence selects weighted,
    /// anything else is ranked
    pub fn select(inputs: &[AgentMessage]) -> Self {
        let mode = if inputs.len() == 1 {
            FusionMode::Union
        } else if average_confidence(inputs) > WEIGHTED_CONFIDENCE_THRESHOLD {
            FusionMode::Weighted
        } else {
            FusionMode::Ranked
        };

        let mut plan = Self::new(mode);
        plan.explanation = format!("Selected {} for {} agents", mode, inputs.len());
        plan
    }
}

/// Merges executor outputs
#[derive(Debug, Clone)]
pub struct FusionEngine {
    max_results: usize,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(50)
    }
}

impl FusionEngine {
    pub fn new(max_results: usize) -> Self {
        Self { max_results }
    }

    /// Fuse executor messages into one `ResultFusionAgent` message
    ///
    /// Never fails: any internal error degrades to plain concatenation.
    pub fn fuse(&self, inputs: &[AgentMessage], requested: FusionMode) -> AgentMessage {
        let query_id = inputs
            .first()
            .map(|m| m.query_id.clone())
            .unwrap_or_default();

        if inputs.is_empty() {
            return AgentMessage::success(
                query_id,
                AgentKind::ResultFusion,
                Vec::new(),
                0.0,
                "No agent results to fuse",
            );
        }

        let plan = FusionPlan::select(inputs);
        debug!(
            "Fusing {} agent results with {} (requested {})",
            inputs.len(),
            plan.mode,
            requested
        );

        match fuse_untruncated(inputs, &plan) {
            Ok(mut results) => {
                let confidence = fusion_confidence(inputs, &results);
                let total_input: usize = inputs.iter().map(|m| m.results.len()).sum();
                let agents: Vec<&str> = inputs.iter().map(|m| m.agent_type.name()).collect();
                let fused_count = results.len();
                results.truncate(self.max_results);
                let returned = results.len();

                AgentMessage::success(
                    query_id,
                    AgentKind::ResultFusion,
                    results,
                    confidence,
                    format!(
                        "Fused {} results from {} agents using {}",
                        fused_count,
                        inputs.len(),
                        plan.mode
                    ),
                )
                .with_metadata("fusion_strategy", json!(plan.mode))
                .with_metadata("requested_strategy", json!(requested))
                .with_metadata("input_agents", json!(agents))
                .with_metadata("total_input_results", json!(total_input))
                .with_metadata("fused_count", json!(fused_count))
                .with_metadata("returned", json!(returned))
            }
            Err(e) => {
                warn!("Fusion failed, concatenating results: {}", e);
                self.concatenate(query_id, inputs, &e)
            }
        }
    }

    /// Run the mode, dedup and final sort of a fixed plan
    pub fn fuse_with_plan(
        &self,
        inputs: &[AgentMessage],
        plan: &FusionPlan,
    ) -> Result<Vec<SearchResult>, FusionError> {
        let mut results = fuse_untruncated(inputs, plan)?;
        results.truncate(self.max_results);
        Ok(results)
    }

    fn concatenate(&self, query_id: String, inputs: &[AgentMessage], error: &FusionError) -> AgentMessage {
        let results: Vec<SearchResult> = inputs
            .iter()
            .flat_map(|m| m.results.iter().cloned())
            .take(self.max_results)
            .collect();

        AgentMessage::success(
            query_id,
            AgentKind::ResultFusion,
            results,
            0.5,
            "Fallback fusion: concatenated agent results",
        )
        .with_metadata("fusion_strategy", json!("FALLBACK"))
        .with_metadata("fusion_error", json!(error.to_string()))
    }
}

/// Mode, dedup and final sort, before the top-K cut
fn fuse_untruncated(inputs: &[AgentMessage], plan: &FusionPlan) -> Result<Vec<SearchResult>, FusionError> {
    validate(inputs)?;

    let merged = match plan.mode {
        FusionMode::Intersection => intersection(inputs),
        FusionMode::Union => union(inputs),
        FusionMode::Weighted => weighted(inputs),
        FusionMode::Ranked => ranked(inputs, &plan.ranking_criteria),
    };

    let mut results = if plan.deduplication.enabled {
        deduplicate_results(merged)
    } else {
        merged
    };

    sort_by_score(&mut results);
    Ok(results)
}

fn validate(inputs: &[AgentMessage]) -> Result<(), FusionError> {
    for message in inputs {
        if !message.confidence.is_finite() {
            return Err(FusionError::NonFiniteConfidence(message.agent_type));
        }
        if let Some(bad) = message.results.iter().find(|r| !r.score.is_finite()) {
            return Err(FusionError::NonFiniteScore {
                agent: message.agent_type,
                key: bad.identity_key().to_string(),
                score: bad.score,
            });
        }
    }
    Ok(())
}

fn average_confidence(inputs: &[AgentMessage]) -> f32 {
    if inputs.is_empty() {
        return 0.0;
    }
    inputs.iter().map(|m| m.confidence).sum::<f32>() / inputs.len() as f32
}

fn intersection(inputs: &[AgentMessage]) -> Vec<SearchResult> {
    if inputs.len() < 2 {
        return union(inputs);
    }

    let mut order = Vec::new();
    let mut groups: HashMap<_, Vec<(&SearchResult, f32)>> = HashMap::new();
    for message in inputs {
        for result in &message.results {
            let key = result.identity_key();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push((result, message.confidence));
        }
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .filter(|group| group.len() >= 2)
        .filter_map(|group| {
            group
                .into_iter()
                .reduce(|best, candidate| {
                    if candidate.0.score * candidate.1 > best.0.score * best.1 {
                        candidate
                    } else {
                        best
                    }
                })
                .map(|(result, _)| {
                    let mut result = result.clone();
                    result.score = (result.score * INTERSECTION_BOOST).min(1.0);
                    result.append_explanation("(multi-agent match)");
                    result
                })
        })
        .collect()
}

fn union(inputs: &[AgentMessage]) -> Vec<SearchResult> {
    inputs
        .iter()
        .flat_map(|message| {
            message.results.iter().map(move |result| {
                let mut result = result.clone();
                result.append_explanation(&format!("[{}]", message.agent_type));
                result
            })
        })
        .collect()
}

fn agent_weight(kind: AgentKind) -> f32 {
    match kind {
        AgentKind::TextSearch => 0.8,
        AgentKind::VisualSearch => 0.9,
        AgentKind::Temporal => 0.95,
        _ => 0.7,
    }
}

fn weighted(inputs: &[AgentMessage]) -> Vec<SearchResult> {
    inputs
        .iter()
        .flat_map(|message| {
            let factor = agent_weight(message.agent_type) * message.confidence;
            message.results.iter().map(move |result| {
                let mut result = result.clone();
                result.score = (result.score * factor).min(1.0);
                result.append_explanation(&format!("[weighted by {}]", message.agent_type));
                result
            })
        })
        .collect()
}

/// Union, then rescore from criterion weights gated on each result's source
fn ranked(inputs: &[AgentMessage], criteria: &RankingCriteria) -> Vec<SearchResult> {
    let mut results = union(inputs);

    for result in &mut results {
        let source_weight = match result.source_agent {
            AgentKind::VisualSearch => criteria.visual_similarity,
            AgentKind::TextSearch => criteria.text_relevance,
            AgentKind::Temporal => criteria.temporal_accuracy,
            _ => 0.0,
        };

        let mut score = result.score * source_weight;
        if let Some(object_confidence) = result.object_confidence().filter(|c| *c != 0.0) {
            score += object_confidence * criteria.object_confidence;
        }
        result.score = score.min(1.0);
    }

    results
}

fn fusion_confidence(inputs: &[AgentMessage], results: &[SearchResult]) -> f32 {
    if results.is_empty() {
        return 0.0;
    }

    let successful: Vec<f32> = inputs.iter().filter(|m| m.success).map(|m| m.confidence).collect();
    if successful.is_empty() {
        return 0.0;
    }

    let mut confidence = successful.iter().sum::<f32>() / successful.len() as f32;
    if inputs.len() > 1 {
        confidence += 0.1;
    }

    let avg_score = results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32;
    confidence += avg_score.min(0.2);

    confidence.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultType;

    fn frame(video: &str, frame: &str, score: f32, agent: AgentKind) -> SearchResult {
        SearchResult::new(video, Some(frame.to_string()), score, agent, ResultType::Keyframe)
    }

    fn message(agent: AgentKind, confidence: f32, results: Vec<SearchResult>) -> AgentMessage {
        AgentMessage::success("q1", agent, results, confidence, "")
    }

    #[test]
    fn test_plan_selection() {
        let one = [message(AgentKind::TextSearch, 0.99, vec![])];
        assert_eq!(FusionPlan::select(&one).mode, FusionMode::Union);

        let high = [
            message(AgentKind::TextSearch, 0.9, vec![]),
            message(AgentKind::VisualSearch, 0.85, vec![]),
        ];
        assert_eq!(FusionPlan::select(&high).mode, FusionMode::Weighted);

        let boundary = [
            message(AgentKind::TextSearch, 0.8, vec![]),
            message(AgentKind::VisualSearch, 0.8, vec![]),
        ];
        assert_eq!(FusionPlan::select(&boundary).mode, FusionMode::Ranked);
    }

    #[test]
    fn test_empty_input() {
        let fused = FusionEngine::default().fuse(&[], FusionMode::Union);
        assert!(fused.success);
        assert!(fused.results.is_empty());
        assert_eq!(fused.agent_type, AgentKind::ResultFusion);
    }

    #[test]
    fn test_intersection_keeps_shared_results() {
        let inputs = [
            message(
                AgentKind::TextSearch,
                0.5,
                vec![frame("v1", "1", 0.9, AgentKind::TextSearch), frame("v2", "1", 0.9, AgentKind::TextSearch)],
            ),
            message(AgentKind::VisualSearch, 0.9, vec![frame("v1", "1", 0.6, AgentKind::VisualSearch)]),
            message(AgentKind::Temporal, 0.9, vec![frame("v3", "1", 1.0, AgentKind::Temporal)]),
        ];

        let results = FusionEngine::default()
            .fuse_with_plan(&inputs, &FusionPlan::new(FusionMode::Intersection))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].video_id, "v1");
        // 0.6 * 0.9 beats 0.9 * 0.5
        assert_eq!(results[0].source_agent, AgentKind::VisualSearch);
        assert!((results[0].score - 0.72).abs() < 1e-6);
        assert!(results[0].explanation.ends_with("(multi-agent match)"));
    }

    #[test]
    fn test_intersection_boost_is_capped() {
        let inputs = [
            message(AgentKind::TextSearch, 1.0, vec![frame("v1", "1", 0.95, AgentKind::TextSearch)]),
            message(AgentKind::VisualSearch, 0.5, vec![frame("v1", "1", 0.95, AgentKind::VisualSearch)]),
        ];
        let results = FusionEngine::default()
            .fuse_with_plan(&inputs, &FusionPlan::new(FusionMode::Intersection))
            .unwrap();
        assert_eq!(results[0].score, 1.0);
    }

    #[test]
    fn test_weighted_scores_capped() {
        let inputs = [
            message(AgentKind::Temporal, 1.0, vec![frame("v1", "1", 5.0, AgentKind::Temporal)]),
            message(AgentKind::TextSearch, 0.9, vec![frame("v2", "1", 0.5, AgentKind::TextSearch)]),
        ];

        let results = FusionEngine::default()
            .fuse_with_plan(&inputs, &FusionPlan::new(FusionMode::Weighted))
            .unwrap();

        assert!(results.iter().all(|r| r.score <= 1.0));
        assert_eq!(results[0].score, 1.0);
        assert!((results[1].score - 0.36).abs() < 1e-6);
        assert!(results[1].explanation.contains("[weighted by TextSearchAgent]"));
    }

    #[test]
    fn test_ranked_uses_source_and_object_confidence() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("object_confidence".into(), json!(0.5));
        let visual = frame("v1", "1", 0.5, AgentKind::VisualSearch).with_metadata(metadata);

        let inputs = [
            message(AgentKind::VisualSearch, 0.6, vec![visual]),
            message(AgentKind::TextSearch, 0.6, vec![frame("v2", "1", 1.0, AgentKind::TextSearch)]),
        ];

        let results = FusionEngine::default()
            .fuse_with_plan(&inputs, &FusionPlan::new(FusionMode::Ranked))
            .unwrap();

        assert_eq!(results[0].video_id, "v2");
        assert!((results[0].score - 0.3).abs() < 1e-6);
        assert!((results[1].score - 0.25).abs() < 1e-6);
        assert!(results[1].explanation.contains("[VisualSearchAgent]"));
    }

    #[test]
    fn test_fuse_dedups_and_reports_metadata() {
        let inputs = [
            message(
                AgentKind::TextSearch,
                0.7,
                vec![frame("v1", "1", 0.4, AgentKind::TextSearch), frame("v2", "1", 0.9, AgentKind::TextSearch)],
            ),
            message(AgentKind::VisualSearch, 0.7, vec![frame("v1", "1", 0.8, AgentKind::VisualSearch)]),
        ];

        let fused = FusionEngine::default().fuse(&inputs, FusionMode::Intersection);

        assert!(fused.success);
        assert_eq!(fused.metadata["fusion_strategy"], json!("RANKED"));
        assert_eq!(fused.metadata["requested_strategy"], json!("INTERSECTION"));
        assert_eq!(fused.metadata["total_input_results"], json!(3));
        assert_eq!(fused.results.len(), 2);

        let v1: Vec<_> = fused.results.iter().filter(|r| r.video_id == "v1").collect();
        assert_eq!(v1.len(), 1);
        assert_eq!(v1[0].source_agent, AgentKind::VisualSearch);

        // 0.7 + 0.1 + min(avg score, 0.2)
        assert!((fused.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fuse_truncates() {
        let many: Vec<SearchResult> = (0..80)
            .map(|i| frame("v1", &i.to_string(), 0.5, AgentKind::TextSearch))
            .collect();
        let fused = FusionEngine::default().fuse(&[message(AgentKind::TextSearch, 0.5, many)], FusionMode::Union);
        assert_eq!(fused.results.len(), 50);
        assert_eq!(fused.metadata["fused_count"], json!(80));
        assert_eq!(fused.metadata["returned"], json!(50));
        assert!(fused.explanation.starts_with("Fused 80 results"));
    }

    #[test]
    fn test_non_finite_score_falls_back() {
        let inputs = [
            message(AgentKind::TextSearch, 0.5, vec![frame("v1", "1", f32::NAN, AgentKind::TextSearch)]),
            message(AgentKind::VisualSearch, 0.5, vec![frame("v2", "1", 0.3, AgentKind::VisualSearch)]),
        ];

        let fused = FusionEngine::default().fuse(&inputs, FusionMode::Ranked);

        assert!(fused.success);
        assert_eq!(fused.confidence, 0.5);
        assert_eq!(fused.results.len(), 2);
        assert_eq!(fused.metadata["fusion_strategy"], json!("FALLBACK"));
    }
}
