//! Temporal executor: keyframes inside a time window, videos by duration

use super::{blocking, nullable, AgentContext, RetrievalExecutor};
use crate::agents::text::video_metadata;
use crate::config::Config;
use crate::error::Result;
use crate::llm::{prompts, Classifier};
use crate::models::{AgentKind, ResultType, SearchResult, TemporalParams};
use crate::patterns::QueryParser;
use crate::storage::{Database, KeyframeHit, VideoRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Open-ended window bounds for time-range search, in seconds
const DEFAULT_START: f64 = 0.0;
const DEFAULT_END: f64 = 999_999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemporalMode {
    TimeRange,
    Sequence,
    #[default]
    Duration,
    PublishDate,
}

impl TemporalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalMode::TimeRange => "TIME_RANGE",
            TemporalMode::Sequence => "SEQUENCE",
            TemporalMode::Duration => "DURATION",
            TemporalMode::PublishDate => "PUBLISH_DATE",
        }
    }

    fn confidence(&self) -> f32 {
        match self {
            TemporalMode::TimeRange => 0.95,
            TemporalMode::Sequence => 0.8,
            TemporalMode::Duration => 0.7,
            TemporalMode::PublishDate => 0.75,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeParams {
    pub video_id: Option<String>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub reference_time: Option<f64>,
}

/// Reserved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceParams {
    pub reference_keyframe: Option<String>,
    pub direction: Option<String>,
    pub window_size: Option<f64>,
}

/// Length bounds in seconds; zero counts as unset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationFilter {
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub sort_by_duration: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalStrategy {
    pub temporal_type: TemporalMode,
    pub time_params: TimeParams,
    pub sequence_params: SequenceParams,
    pub duration_filter: DurationFilter,
    /// Reserved
    pub date_filter: Option<Value>,
    pub explanation: String,
}

#[derive(Debug, Clone)]
pub enum TemporalHit {
    Keyframe(KeyframeHit),
    Video(VideoRecord),
}

#[derive(Clone)]
pub struct TemporalExecutor {
    db: Arc<Database>,
    classifier: Arc<dyn Classifier>,
    parser: QueryParser,
    max_results: usize,
}

impl TemporalExecutor {
    pub fn new(db: Arc<Database>, classifier: Arc<dyn Classifier>, config: &Config) -> Result<Self> {
        Ok(Self {
            db,
            classifier,
            parser: QueryParser::new()?,
            max_results: config.temporal.max_results,
        })
    }

    fn search_time_range(&self, params: &TimeParams) -> Vec<TemporalHit> {
        let Some(video_id) = params.video_id.as_deref().filter(|id| !id.trim().is_empty()) else {
            return Vec::new();
        };
        let start = params.start_time.unwrap_or(DEFAULT_START);
        let end = params.end_time.unwrap_or(DEFAULT_END);

        match self.db.keyframes_in_time_range(video_id, start, end) {
            Ok(rows) => rows.into_iter().map(TemporalHit::Keyframe).collect(),
            Err(e) => {
                warn!("Time range search failed for {}: {}", video_id, e);
                Vec::new()
            }
        }
    }

    fn search_by_duration(&self, filter: &DurationFilter) -> Vec<TemporalHit> {
        let bound = |value: Option<f64>| value.filter(|v| *v != 0.0).map(|v| v.round() as i64);

        match self.db.videos_by_duration(
            bound(filter.min_duration),
            bound(filter.max_duration),
            filter.sort_by_duration,
            self.max_results,
        ) {
            Ok(rows) => rows.into_iter().map(TemporalHit::Video).collect(),
            Err(e) => {
                warn!("Duration search failed: {}", e);
                Vec::new()
            }
        }
    }

    fn search(&self, strategy: &TemporalStrategy) -> Vec<TemporalHit> {
        match strategy.temporal_type {
            TemporalMode::TimeRange => self.search_time_range(&strategy.time_params),
            TemporalMode::Duration => self.search_by_duration(&strategy.duration_filter),
            TemporalMode::Sequence | TemporalMode::PublishDate => {
                debug!("{} search is not available", strategy.temporal_type.as_str());
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl RetrievalExecutor for TemporalExecutor {
    type Params = TemporalParams;
    type Strategy = TemporalStrategy;
    type Hit = TemporalHit;

    fn kind(&self) -> AgentKind {
        AgentKind::Temporal
    }

    fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    fn system_prompt(&self) -> &'static str {
        prompts::TEMPORAL
    }

    fn has_context_params(&self, ctx: &AgentContext<TemporalParams>) -> bool {
        ctx.params
            .as_ref()
            .and_then(|p| p.video_id.as_deref())
            .is_some_and(|id| !id.trim().is_empty())
    }

    /// Time range when a video id is known (from the context or the query
    /// text), duration listing otherwise
    fn fallback_strategy(&self, ctx: &AgentContext<TemporalParams>) -> TemporalStrategy {
        let params = ctx.params.as_ref();
        let video_id = params
            .and_then(|p| p.video_id.clone())
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.parser.extract_video_ids(&ctx.original_query).into_iter().next());

        let Some(video_id) = video_id else {
            return TemporalStrategy {
                temporal_type: TemporalMode::Duration,
                explanation: "Fallback temporal strategy".to_string(),
                ..TemporalStrategy::default()
            };
        };

        let window = self.parser.time_window(&ctx.original_query);
        TemporalStrategy {
            temporal_type: TemporalMode::TimeRange,
            time_params: TimeParams {
                video_id: Some(video_id),
                start_time: params.and_then(|p| p.start_time).or(window.start),
                end_time: params.and_then(|p| p.end_time).or(window.end),
                reference_time: None,
            },
            explanation: "Fallback time range from query".to_string(),
            ..TemporalStrategy::default()
        }
    }

    fn mode_label(&self, strategy: &TemporalStrategy) -> &'static str {
        strategy.temporal_type.as_str()
    }

    async fn execute(
        &self,
        _ctx: &AgentContext<TemporalParams>,
        strategy: &TemporalStrategy,
    ) -> Result<Vec<TemporalHit>> {
        let this = self.clone();
        let strategy = strategy.clone();
        blocking(AgentKind::Temporal, move || Ok(this.search(&strategy))).await
    }

    fn rank(&self, _strategy: &TemporalStrategy, hits: Vec<TemporalHit>) -> Vec<SearchResult> {
        hits.into_iter().take(self.max_results).map(to_result).collect()
    }

    fn confidence(&self, strategy: &TemporalStrategy, results: &[SearchResult]) -> f32 {
        if results.is_empty() {
            return 0.0;
        }
        strategy.temporal_type.confidence()
    }
}

fn to_result(hit: TemporalHit) -> SearchResult {
    match hit {
        TemporalHit::Keyframe(hit) => {
            let mut metadata = Map::new();
            metadata.insert("pts_time".to_string(), json!(hit.keyframe.pts_time));
            metadata.insert("frame_idx".to_string(), json!(hit.keyframe.frame_idx));
            if let Some(title) = &hit.title {
                metadata.insert("title".to_string(), json!(title));
            }
            if let Some(author) = &hit.author {
                metadata.insert("author".to_string(), json!(author));
            }

            let explanation = format!("Keyframe at {:.1}s", hit.keyframe.pts_time);
            SearchResult::new(
                hit.keyframe.video_id,
                Some(hit.keyframe.keyframe_id),
                1.0,
                AgentKind::Temporal,
                ResultType::Keyframe,
            )
            .with_metadata(metadata)
            .with_explanation(explanation)
        }
        TemporalHit::Video(record) => {
            let explanation = match record.length {
                Some(length) => format!("Video length {}s", length),
                None => "Video length unknown".to_string(),
            };
            let metadata = video_metadata(&record);
            SearchResult::new(record.video_id, None, 1.0, AgentKind::Temporal, ResultType::Video)
                .with_metadata(metadata)
                .with_explanation(explanation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedClassifier;
    use crate::agents::{run_executor, AgentCache};
    use crate::models::QueryIntent;
    use crate::storage::KeyframeRecord;
    use tempfile::TempDir;

    fn seed(dir: &TempDir) -> Arc<Database> {
        let db = Database::new(&dir.path().join("temporal.db")).unwrap();
        for (id, length) in [("L01_V001", 600), ("L01_V002", 120), ("L01_V003", 1800)] {
            db.insert_video(&VideoRecord {
                video_id: id.to_string(),
                title: Some(format!("Video {}", id)),
                length: Some(length),
                ..VideoRecord::default()
            })
            .unwrap();
        }
        for (frame, pts) in [("001", 10.0), ("002", 95.0), ("003", 160.0), ("004", 400.0)] {
            db.insert_keyframe(&KeyframeRecord {
                video_id: "L01_V001".to_string(),
                keyframe_id: frame.to_string(),
                pts_time: pts,
                frame_idx: (pts * 25.0) as i64,
            })
            .unwrap();
        }
        Arc::new(db)
    }

    fn executor(db: Arc<Database>, classifier: Arc<dyn Classifier>) -> TemporalExecutor {
        TemporalExecutor::new(db, classifier, &Config::default()).unwrap()
    }

    fn context(query: &str, params: Option<TemporalParams>) -> AgentContext<TemporalParams> {
        AgentContext {
            query_id: "q1".to_string(),
            intent: Arc::new(QueryIntent::fallback(query)),
            original_query: query.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn test_time_range_from_context() {
        let dir = TempDir::new().unwrap();
        let classifier = Arc::new(ScriptedClassifier::failing());
        let exec = executor(seed(&dir), classifier.clone());

        let ctx = context(
            "scenes of L01_V001 between 1:30 and 3:00",
            Some(TemporalParams {
                video_id: Some("L01_V001".to_string()),
                start_time: None,
                end_time: None,
            }),
        );
        let msg = run_executor(&exec, &AgentCache::disabled(), ctx).await;

        assert!(msg.success);
        assert_eq!(classifier.call_count(), 0);
        let frames: Vec<_> = msg.results.iter().filter_map(|r| r.keyframe_id.as_deref()).collect();
        assert_eq!(frames, vec!["002", "003"]);
        assert!(msg.results.iter().all(|r| r.score == 1.0));
        assert_eq!(msg.results[0].explanation, "Keyframe at 95.0s");
        assert_eq!(msg.confidence, 0.95);
    }

    #[tokio::test]
    async fn test_fallback_reads_video_id_from_query() {
        let dir = TempDir::new().unwrap();
        let exec = executor(seed(&dir), Arc::new(ScriptedClassifier::failing()));

        let msg = run_executor(&exec, &AgentCache::disabled(), context("l01_v001 từ 0 đến 100", None)).await;

        let frames: Vec<_> = msg.results.iter().filter_map(|r| r.keyframe_id.as_deref()).collect();
        assert_eq!(frames, vec!["001", "002"]);
    }

    #[tokio::test]
    async fn test_duration_search() {
        let dir = TempDir::new().unwrap();
        let classifier = Arc::new(ScriptedClassifier::replying(json!({
            "temporal_type": "DURATION",
            "duration_filter": {"min_duration": 300, "max_duration": 0, "sort_by_duration": true}
        })));
        let exec = executor(seed(&dir), classifier);

        let msg = run_executor(&exec, &AgentCache::disabled(), context("long videos", None)).await;

        let ids: Vec<_> = msg.results.iter().map(|r| r.video_id.as_str()).collect();
        assert_eq!(ids, vec!["L01_V003", "L01_V001"]);
        assert_eq!(msg.results[0].explanation, "Video length 1800s");
        assert_eq!(msg.results[0].result_type, ResultType::Video);
        assert_eq!(msg.confidence, 0.7);
    }

    #[tokio::test]
    async fn test_reserved_modes_return_empty() {
        for mode in ["SEQUENCE", "PUBLISH_DATE"] {
            let dir = TempDir::new().unwrap();
            let classifier = Arc::new(ScriptedClassifier::replying(json!({ "temporal_type": mode })));
            let exec = executor(seed(&dir), classifier);

            let msg = run_executor(&exec, &AgentCache::disabled(), context("the next scene", None)).await;

            assert!(msg.success, "{} should not fail", mode);
            assert!(msg.results.is_empty());
            assert_eq!(msg.confidence, 0.0);
        }
    }

    #[tokio::test]
    async fn test_malformed_strategy_falls_back_to_duration() {
        let dir = TempDir::new().unwrap();
        let classifier = Arc::new(ScriptedClassifier::replying(json!({"temporal_type": "YESTERDAY"})));
        let exec = executor(seed(&dir), classifier);

        let msg = run_executor(&exec, &AgentCache::disabled(), context("some time", None)).await;

        assert!(msg.success);
        assert_eq!(msg.results.len(), 3);
        assert_eq!(msg.metadata["strategy"]["temporal_type"], json!("DURATION"));
    }
}
