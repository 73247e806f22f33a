//! Visual-similarity executor over the keyframe embedding collection

use super::{blocking, count_adjusted, nullable, AgentContext, RetrievalExecutor};
use crate::agents::text::video_metadata;
use crate::config::{Config, VisualSearchConfig};
use crate::embedding::{EmbeddingProvider, KeyframePayload, VectorCollection};
use crate::error::{Result, VidSearchError};
use crate::llm::{prompts, Classifier};
use crate::models::{AgentKind, ResultType, SearchResult, VisualParams};
use crate::patterns::QueryParser;
use crate::retrieval::{sort_by_score, ResultRanker, DEFAULT_DIVERSITY_WEIGHT};
use crate::storage::{Database, ObjectRecord, VideoRecord};
use ahash::{HashMap, HashMapExt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

const VISUAL_WEIGHT: f32 = 0.7;
const OBJECT_WEIGHT: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisualMode {
    #[default]
    TextToVisual,
    SimilaritySearch,
    FilteredVisual,
    ObjectGuided,
}

impl VisualMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualMode::TextToVisual => "TEXT_TO_VISUAL",
            VisualMode::SimilaritySearch => "SIMILARITY_SEARCH",
            VisualMode::FilteredVisual => "FILTERED_VISUAL",
            VisualMode::ObjectGuided => "OBJECT_GUIDED",
        }
    }

    fn base_confidence(&self) -> f32 {
        match self {
            VisualMode::TextToVisual => 0.7,
            VisualMode::SimilaritySearch => 0.8,
            VisualMode::FilteredVisual => 0.85,
            VisualMode::ObjectGuided => 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualQuery {
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    #[serde(deserialize_with = "nullable")]
    pub keywords: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub scene_type: String,
    #[serde(deserialize_with = "nullable")]
    pub dominant_colors: Vec<String>,
}

impl Default for VisualQuery {
    fn default() -> Self {
        Self {
            description: String::new(),
            keywords: Vec::new(),
            scene_type: "mixed".to_string(),
            dominant_colors: Vec::new(),
        }
    }
}

impl VisualQuery {
    /// Description followed by the keywords, space-separated
    pub fn embedding_text(&self) -> String {
        let mut text = self.description.trim().to_string();
        for keyword in &self.keywords {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(keyword);
        }
        text
    }
}

/// `similarity_threshold` is recorded but the search floor comes from
/// `visual.similarity_floor`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualSearchParams {
    pub similarity_threshold: f32,
    pub max_results: usize,
    pub diversity_filter: bool,
}

impl Default for VisualSearchParams {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            max_results: 100,
            diversity_filter: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataFilters {
    pub video_ids: Option<Vec<String>>,
    #[serde(deserialize_with = "nullable")]
    pub exclude_videos: Vec<String>,
    /// Reserved
    pub time_range: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualStrategy {
    pub search_strategy: VisualMode,
    pub visual_query: VisualQuery,
    pub search_params: VisualSearchParams,
    pub metadata_filters: MetadataFilters,
    pub explanation: String,
}

/// Keyframe hit enriched from the structured store
#[derive(Debug, Clone)]
pub struct VisualHit {
    pub video_id: String,
    pub keyframe_id: String,
    pub similarity: f32,
    pub video: Option<VideoRecord>,
    pub objects: Vec<ObjectRecord>,
    /// Mean detector confidence, 0 without detections
    pub object_confidence: f32,
}

impl VisualHit {
    pub fn combined_score(&self) -> f32 {
        VISUAL_WEIGHT * self.similarity + OBJECT_WEIGHT * self.object_confidence
    }
}

#[derive(Clone)]
pub struct VisualSearchExecutor {
    db: Arc<Database>,
    classifier: Arc<dyn Classifier>,
    embedder: Arc<dyn EmbeddingProvider>,
    keyframes: Arc<VectorCollection<KeyframePayload>>,
    parser: QueryParser,
    settings: VisualSearchConfig,
    max_results: usize,
}

impl VisualSearchExecutor {
    pub fn new(
        db: Arc<Database>,
        classifier: Arc<dyn Classifier>,
        embedder: Arc<dyn EmbeddingProvider>,
        keyframes: Arc<VectorCollection<KeyframePayload>>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            db,
            classifier,
            embedder,
            keyframes,
            parser: QueryParser::new()?,
            settings: config.visual.clone(),
            max_results: config.agents.max_results,
        })
    }

    fn enrich(&self, video_id: String, keyframe_id: String, similarity: f32) -> VisualHit {
        let video = self.db.get_video_metadata(&video_id).unwrap_or_else(|e| {
            warn!("Failed to load metadata for {}: {}", video_id, e);
            None
        });
        let objects = self
            .db
            .get_keyframe_objects(&video_id, &keyframe_id)
            .unwrap_or_else(|e| {
                warn!("Failed to load objects for {}/{}: {}", video_id, keyframe_id, e);
                Vec::new()
            });

        let object_confidence = if objects.is_empty() {
            0.0
        } else {
            (objects.iter().map(|o| o.confidence).sum::<f64>() / objects.len() as f64) as f32
        };

        VisualHit {
            video_id,
            keyframe_id,
            similarity,
            video,
            objects,
            object_confidence,
        }
    }

    /// Keep at most `max_per_video` hits per video, in input order
    fn diversity_cap(&self, hits: Vec<VisualHit>) -> Vec<VisualHit> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        hits.into_iter()
            .filter(|hit| {
                let count = counts.entry(hit.video_id.clone()).or_insert(0);
                *count += 1;
                *count <= self.settings.max_per_video
            })
            .collect()
    }

    /// Embed, search the keyframe collection, then filter and enrich
    fn search(&self, strategy: &VisualStrategy) -> Result<Vec<VisualHit>> {
        let text = strategy.visual_query.embedding_text();
        let vector = self.embedder.embed(&text)?;
        if vector.is_empty() {
            return Err(VidSearchError::executor(
                AgentKind::VisualSearch.name(),
                "Failed to generate visual embedding",
            ));
        }

        let filters = &strategy.metadata_filters;
        let allow: Option<HashSet<&str>> = filters
            .video_ids
            .as_ref()
            .filter(|ids| !ids.is_empty())
            .map(|ids| ids.iter().map(String::as_str).collect());
        let allow_filter = allow
            .as_ref()
            .map(|allow| move |payload: &KeyframePayload| allow.contains(payload.video_id.as_str()));

        let neighbours = match self.keyframes.search(
            &vector,
            strategy.search_params.max_results,
            self.settings.similarity_floor,
            allow_filter.as_ref().map(|f| f as &(dyn Fn(&KeyframePayload) -> bool + Sync)),
        ) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Keyframe search failed: {}", e);
                Vec::new()
            }
        };

        let mut hits: Vec<VisualHit> = neighbours
            .into_iter()
            .filter(|n| !filters.exclude_videos.contains(&n.payload.video_id))
            .map(|n| self.enrich(n.payload.video_id, n.payload.keyframe_id, n.score))
            .collect();

        if strategy.search_params.diversity_filter {
            hits = self.diversity_cap(hits);
        }

        Ok(hits)
    }
}

#[async_trait]
impl RetrievalExecutor for VisualSearchExecutor {
    type Params = VisualParams;
    type Strategy = VisualStrategy;
    type Hit = VisualHit;

    fn kind(&self) -> AgentKind {
        AgentKind::VisualSearch
    }

    fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    fn system_prompt(&self) -> &'static str {
        prompts::VISUAL_SEARCH
    }

    fn has_context_params(&self, ctx: &AgentContext<VisualParams>) -> bool {
        ctx.params
            .as_ref()
            .and_then(|p| p.search_description.as_deref())
            .is_some_and(|d| !d.trim().is_empty())
    }

    fn fallback_strategy(&self, ctx: &AgentContext<VisualParams>) -> VisualStrategy {
        let description = ctx
            .params
            .as_ref()
            .and_then(|p| p.search_description.clone())
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| ctx.original_query.clone());

        VisualStrategy {
            search_strategy: VisualMode::TextToVisual,
            visual_query: VisualQuery {
                description,
                keywords: self.parser.extract_colors(&ctx.original_query),
                ..VisualQuery::default()
            },
            search_params: VisualSearchParams {
                similarity_threshold: 0.6,
                max_results: 100,
                diversity_filter: true,
            },
            metadata_filters: MetadataFilters::default(),
            explanation: "Fallback to simple text-to-visual search".to_string(),
        }
    }

    fn mode_label(&self, strategy: &VisualStrategy) -> &'static str {
        strategy.search_strategy.as_str()
    }

    async fn execute(&self, _ctx: &AgentContext<VisualParams>, strategy: &VisualStrategy) -> Result<Vec<VisualHit>> {
        let this = self.clone();
        let strategy = strategy.clone();
        blocking(AgentKind::VisualSearch, move || this.search(&strategy)).await
    }

    fn rank(&self, _strategy: &VisualStrategy, hits: Vec<VisualHit>) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = hits.into_iter().map(to_result).collect();

        sort_by_score(&mut results);
        results.truncate(self.max_results);

        ResultRanker::diversity_rank(results, DEFAULT_DIVERSITY_WEIGHT)
    }

    fn confidence(&self, strategy: &VisualStrategy, results: &[SearchResult]) -> f32 {
        if results.is_empty() {
            return 0.0;
        }

        let avg = results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32;
        let mut confidence = strategy.search_strategy.base_confidence();
        if avg > 0.8 {
            confidence += 0.15;
        } else if avg > 0.6 {
            confidence += 0.05;
        } else {
            confidence -= 0.1;
        }

        count_adjusted(confidence, results.len(), (20, 0.1), (5, 0.15)).clamp(0.0, 1.0)
    }
}

fn to_result(hit: VisualHit) -> SearchResult {
    let score = hit.combined_score();

    let mut metadata: Map<String, Value> = hit.video.as_ref().map(video_metadata).unwrap_or_default();
    metadata.insert("similarity_score".to_string(), json!(hit.similarity));
    metadata.insert("object_confidence".to_string(), json!(hit.object_confidence));
    metadata.insert("combined_score".to_string(), json!(score));
    metadata.insert("object_count".to_string(), json!(hit.objects.len()));
    metadata.insert(
        "detected_objects".to_string(),
        json!(hit.objects.iter().map(|o| o.object_name.as_str()).collect::<Vec<_>>()),
    );

    SearchResult::new(
        hit.video_id,
        Some(hit.keyframe_id),
        score,
        AgentKind::VisualSearch,
        ResultType::Keyframe,
    )
    .with_metadata(metadata)
    .with_explanation(format!("Visual similarity {:.2}", hit.similarity))
}
