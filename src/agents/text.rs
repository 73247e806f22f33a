//! Text-metadata executor: substring search over video metadata and
//! detected-object lookup

use super::{blocking, count_adjusted, nullable, AgentContext, RetrievalExecutor};
use crate::config::{Config, TextSearchConfig};
use crate::embedding::{EmbeddingProvider, KeywordPayload, VectorCollection};
use crate::error::Result;
use crate::llm::{prompts, Classifier};
use crate::models::{AgentKind, ResultType, SearchResult, TextParams};
use crate::retrieval::{deduplicate_results, sort_by_score, ResultRanker, DEFAULT_DIVERSITY_WEIGHT};
use crate::storage::{Database, ObjectHit, TextField, VideoRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TextMode {
    #[default]
    MetadataSearch,
    ObjectSearch,
    CombinedSearch,
    AuthorSearch,
}

impl TextMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextMode::MetadataSearch => "METADATA_SEARCH",
            TextMode::ObjectSearch => "OBJECT_SEARCH",
            TextMode::CombinedSearch => "COMBINED_SEARCH",
            TextMode::AuthorSearch => "AUTHOR_SEARCH",
        }
    }

    fn base_confidence(&self) -> f32 {
        match self {
            TextMode::MetadataSearch => 0.8,
            TextMode::ObjectSearch => 0.7,
            TextMode::CombinedSearch => 0.9,
            TextMode::AuthorSearch => 0.95,
        }
    }
}

fn default_fields() -> Vec<String> {
    vec!["title".to_string(), "description".to_string(), "keywords".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSearch {
    #[serde(deserialize_with = "nullable")]
    pub terms: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub fields: Vec<String>,
    pub exact_match: bool,
}

impl Default for MetadataSearch {
    fn default() -> Self {
        Self {
            terms: Vec::new(),
            fields: default_fields(),
            exact_match: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectSearch {
    #[serde(deserialize_with = "nullable")]
    pub object_names: Vec<String>,
    pub confidence_threshold: f64,
    #[serde(deserialize_with = "nullable")]
    pub required_objects: Vec<String>,
}

impl Default for ObjectSearch {
    fn default() -> Self {
        Self {
            object_names: Vec::new(),
            confidence_threshold: 0.5,
            required_objects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextFilters {
    pub author: Option<String>,
    pub min_length: Option<i64>,
    pub max_length: Option<i64>,
}

/// Per-signal score contributions
///
/// `description_match` is accepted but does not contribute yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub title_match: f32,
    pub keyword_match: f32,
    pub description_match: f32,
    pub object_confidence: f32,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            title_match: 1.0,
            keyword_match: 0.8,
            description_match: 0.6,
            object_confidence: 0.9,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStrategy {
    pub search_strategy: TextMode,
    pub metadata_search: MetadataSearch,
    pub object_search: ObjectSearch,
    pub filters: TextFilters,
    pub ranking_weights: RankingWeights,
    pub explanation: String,
}

/// Raw record found by one of the text routines
#[derive(Debug, Clone)]
pub enum TextHit {
    Video {
        record: VideoRecord,
        term: Option<String>,
        note: String,
    },
    Object(ObjectHit),
}

/// Vocabulary used to widen caller-supplied search terms
#[derive(Clone)]
pub struct KeywordExpansion {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub collection: Arc<VectorCollection<KeywordPayload>>,
}

#[derive(Clone)]
pub struct TextSearchExecutor {
    db: Arc<Database>,
    classifier: Arc<dyn Classifier>,
    expansion: Option<KeywordExpansion>,
    settings: TextSearchConfig,
    max_results: usize,
}

impl TextSearchExecutor {
    pub fn new(db: Arc<Database>, classifier: Arc<dyn Classifier>, config: &Config) -> Self {
        Self {
            db,
            classifier,
            expansion: None,
            settings: config.text.clone(),
            max_results: config.agents.max_results,
        }
    }

    pub fn with_keyword_expansion(mut self, expansion: KeywordExpansion) -> Self {
        self.expansion = Some(expansion);
        self
    }

    /// Union `terms` with their nearest keywords from the keyword collection
    ///
    /// Any failure leaves the terms untouched.
    fn expand_terms(&self, terms: &[String]) -> Vec<String> {
        let Some(expansion) = &self.expansion else {
            return terms.to_vec();
        };
        if !self.settings.keyword_expansion {
            return terms.to_vec();
        }

        let mut expanded = terms.to_vec();
        for term in terms {
            let vector = match expansion.embedder.embed(term) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Keyword expansion skipped for '{}': {}", term, e);
                    return terms.to_vec();
                }
            };
            let hits = match expansion.collection.search(
                &vector,
                self.settings.expansion_limit,
                self.settings.expansion_threshold,
                None,
            ) {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("Keyword expansion skipped for '{}': {}", term, e);
                    return terms.to_vec();
                }
            };

            for hit in hits {
                if !expanded.contains(&hit.payload.keyword) {
                    expanded.push(hit.payload.keyword);
                }
            }
        }

        debug!("Expanded {} terms to {}", terms.len(), expanded.len());
        expanded
    }

    fn search_metadata(&self, config: &MetadataSearch) -> Vec<TextHit> {
        let fields = if config.fields.is_empty() {
            parse_fields(&default_fields())
        } else {
            parse_fields(&config.fields)
        };
        let field_names = fields.iter().map(|f| f.column()).collect::<Vec<_>>().join(", ");

        let mut hits = Vec::new();
        for term in &config.terms {
            match self.db.search_videos_by_text(term, &fields) {
                Ok(records) => hits.extend(records.into_iter().map(|record| TextHit::Video {
                    record,
                    term: Some(term.clone()),
                    note: format!("Found '{}' in {}", term, field_names),
                })),
                Err(e) => warn!("Metadata search failed for '{}': {}", term, e),
            }
        }
        hits
    }

    fn search_objects(&self, config: &ObjectSearch) -> Vec<TextHit> {
        if config.object_names.is_empty() {
            return Vec::new();
        }

        match self.db.search_objects(&config.object_names, config.confidence_threshold) {
            Ok(rows) => rows.into_iter().map(TextHit::Object).collect(),
            Err(e) => {
                warn!("Object search failed: {}", e);
                Vec::new()
            }
        }
    }

    fn search_by_author(&self, filters: &TextFilters) -> Vec<TextHit> {
        let Some(author) = filters.author.as_deref().filter(|a| !a.trim().is_empty()) else {
            return Vec::new();
        };

        match self.db.search_videos_by_text(author, &[TextField::Author]) {
            Ok(records) => records
                .into_iter()
                .map(|record| {
                    let note = format!("Video by {}", record.author.as_deref().unwrap_or(author));
                    TextHit::Video {
                        record,
                        term: None,
                        note,
                    }
                })
                .collect(),
            Err(e) => {
                warn!("Author search failed for '{}': {}", author, e);
                Vec::new()
            }
        }
    }

    fn search(&self, strategy: &TextStrategy) -> Vec<TextHit> {
        let mut hits = Vec::new();

        match strategy.search_strategy {
            TextMode::MetadataSearch => hits.extend(self.search_metadata(&strategy.metadata_search)),
            TextMode::ObjectSearch => hits.extend(self.search_objects(&strategy.object_search)),
            TextMode::CombinedSearch => {
                hits.extend(self.search_metadata(&strategy.metadata_search));
                hits.extend(self.search_objects(&strategy.object_search));
            }
            TextMode::AuthorSearch => hits.extend(self.search_by_author(&strategy.filters)),
        }

        hits
    }
}

#[async_trait]
impl RetrievalExecutor for TextSearchExecutor {
    type Params = TextParams;
    type Strategy = TextStrategy;
    type Hit = TextHit;

    fn kind(&self) -> AgentKind {
        AgentKind::TextSearch
    }

    fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    fn system_prompt(&self) -> &'static str {
        prompts::TEXT_SEARCH
    }

    fn has_context_params(&self, ctx: &AgentContext<TextParams>) -> bool {
        ctx.params
            .as_ref()
            .and_then(|p| p.search_terms.as_ref())
            .is_some_and(|terms| !terms.is_empty())
    }

    fn fallback_strategy(&self, ctx: &AgentContext<TextParams>) -> TextStrategy {
        let params = ctx.params.as_ref();

        let terms = params
            .and_then(|p| p.search_terms.clone())
            .filter(|terms| !terms.is_empty())
            .unwrap_or_else(|| vec![ctx.original_query.clone()])
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect();

        let fields = params
            .and_then(|p| p.fields.clone())
            .filter(|fields| !fields.is_empty())
            .unwrap_or_else(default_fields);

        TextStrategy {
            search_strategy: TextMode::MetadataSearch,
            metadata_search: MetadataSearch {
                terms,
                fields,
                exact_match: false,
            },
            filters: TextFilters {
                author: params.and_then(|p| p.author_filter.clone()),
                ..TextFilters::default()
            },
            explanation: "Fallback to simple metadata search".to_string(),
            ..TextStrategy::default()
        }
    }

    fn mode_label(&self, strategy: &TextStrategy) -> &'static str {
        strategy.search_strategy.as_str()
    }

    async fn prepare_context(&self, ctx: &mut AgentContext<TextParams>) {
        let Some(params) = ctx.params.as_mut() else { return };
        let Some(terms) = params.search_terms.clone().filter(|t| !t.is_empty()) else { return };
        if self.expansion.is_none() || !self.settings.keyword_expansion {
            return;
        }

        let this = self.clone();
        match blocking(AgentKind::TextSearch, move || Ok(this.expand_terms(&terms))).await {
            Ok(expanded) => params.search_terms = Some(expanded),
            Err(e) => warn!("Keyword expansion skipped: {}", e),
        }
    }

    async fn execute(&self, _ctx: &AgentContext<TextParams>, strategy: &TextStrategy) -> Result<Vec<TextHit>> {
        let this = self.clone();
        let strategy = strategy.clone();
        blocking(AgentKind::TextSearch, move || Ok(this.search(&strategy))).await
    }

    fn rank(&self, strategy: &TextStrategy, hits: Vec<TextHit>) -> Vec<SearchResult> {
        let weights = &strategy.ranking_weights;

        let scored: Vec<SearchResult> = hits.into_iter().map(|hit| to_result(hit, weights)).collect();

        let mut results = deduplicate_results(scored);
        sort_by_score(&mut results);
        results.truncate(self.max_results);

        ResultRanker::diversity_rank(results, DEFAULT_DIVERSITY_WEIGHT)
    }

    fn confidence(&self, strategy: &TextStrategy, results: &[SearchResult]) -> f32 {
        if results.is_empty() {
            return 0.0;
        }

        let base = count_adjusted(
            strategy.search_strategy.base_confidence(),
            results.len(),
            (10, 0.1),
            (3, 0.2),
        );
        let avg_score = results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32;

        (base + (avg_score / 2.0).min(0.2)).min(1.0)
    }
}

fn parse_fields(names: &[String]) -> Vec<TextField> {
    let mut fields = Vec::new();
    for name in names {
        match TextField::parse(name) {
            Some(field) if !fields.contains(&field) => fields.push(field),
            Some(_) => {}
            None => warn!("Ignoring unsearchable field '{}'", name),
        }
    }
    fields
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

fn to_result(hit: TextHit, weights: &RankingWeights) -> SearchResult {
    match hit {
        TextHit::Video { record, term, note } => {
            let mut score = 0.0;
            if let Some(term) = term.as_deref() {
                if contains_ci(record.title.as_deref(), term) {
                    score += weights.title_match;
                }
                if contains_ci(record.keywords.as_deref(), term) {
                    score += weights.keyword_match;
                }
            }

            let mut metadata = video_metadata(&record);
            if let Some(term) = term {
                metadata.insert("search_term".to_string(), json!(term));
            }

            SearchResult::new(record.video_id, None, score, AgentKind::TextSearch, ResultType::Video)
                .with_metadata(metadata)
                .with_explanation(note)
        }
        TextHit::Object(hit) => {
            let score = hit.avg_confidence as f32 * weights.object_confidence;
            let explanation = format!(
                "Contains {} (confidence: {:.2})",
                hit.object_names.join(", "),
                hit.avg_confidence
            );

            let mut metadata = Map::new();
            metadata.insert("object_names".to_string(), json!(hit.object_names));
            metadata.insert("avg_confidence".to_string(), json!(hit.avg_confidence));
            metadata.insert("object_count".to_string(), json!(hit.object_count));
            metadata.insert("pts_time".to_string(), json!(hit.pts_time));
            metadata.insert("frame_idx".to_string(), json!(hit.frame_idx));

            SearchResult::new(
                hit.video_id,
                Some(hit.keyframe_id),
                score,
                AgentKind::TextSearch,
                ResultType::Keyframe,
            )
            .with_metadata(metadata)
            .with_explanation(explanation)
        }
    }
}

/// Video record as result metadata, null fields dropped
pub(crate) fn video_metadata(record: &VideoRecord) -> Map<String, Value> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        _ => Map::new(),
    }
}
