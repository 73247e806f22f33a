//! Retrieval executors and the orchestrator that fans out to them
//!
//! Each executor follows the same pipeline: analyze a strategy (classifier
//! call or deterministic fallback), execute it against the stores, rank the
//! hits, and wrap them in an [`AgentMessage`]. [`run_executor`] drives that
//! pipeline and converts every error into a failed message.

mod cache;
mod orchestrator;
mod temporal;
mod text;
mod visual;

pub use cache::AgentCache;
pub use orchestrator::Orchestrator;
pub use temporal::{TemporalExecutor, TemporalMode, TemporalStrategy};
pub use text::{KeywordExpansion, TextMode, TextSearchExecutor, TextStrategy};
pub use visual::{VisualMode, VisualSearchExecutor, VisualStrategy};

use crate::error::{Result, VidSearchError};
use crate::llm::Classifier;
use crate::models::{AgentKind, AgentMessage, QueryIntent, SearchResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Per-executor view of one query
#[derive(Debug, Clone)]
pub struct AgentContext<P> {
    pub query_id: String,
    pub intent: Arc<QueryIntent>,
    pub original_query: String,
    /// This executor's slice of the intent's parameters
    pub params: Option<P>,
}

/// Capability shared by the text, visual and temporal executors
#[async_trait]
pub trait RetrievalExecutor: Send + Sync {
    type Params: Send + Sync;
    type Strategy: Serialize + DeserializeOwned + Send + Sync;
    type Hit: Send;

    fn kind(&self) -> AgentKind;

    fn classifier(&self) -> &dyn Classifier;

    fn system_prompt(&self) -> &'static str;

    /// Whether the context already carries this executor's parameters
    fn has_context_params(&self, ctx: &AgentContext<Self::Params>) -> bool;

    /// Deterministic strategy built from the context and the raw query
    fn fallback_strategy(&self, ctx: &AgentContext<Self::Params>) -> Self::Strategy;

    /// Sub-mode label recorded in metadata and explanations
    fn mode_label(&self, strategy: &Self::Strategy) -> &'static str;

    /// Adjust the context before strategy analysis
    async fn prepare_context(&self, _ctx: &mut AgentContext<Self::Params>) {}

    async fn analyze_strategy(&self, ctx: &AgentContext<Self::Params>) -> Self::Strategy {
        if self.has_context_params(ctx) {
            debug!("{}: using context parameters", self.kind());
            return self.fallback_strategy(ctx);
        }

        match self
            .classifier()
            .classify(self.system_prompt(), &ctx.original_query)
            .await
        {
            Ok(value) => match serde_json::from_value(value) {
                Ok(strategy) => strategy,
                Err(e) => {
                    warn!("{}: malformed strategy, using fallback: {}", self.kind(), e);
                    self.fallback_strategy(ctx)
                }
            },
            Err(e) => {
                warn!("{}: strategy analysis failed, using fallback: {}", self.kind(), e);
                self.fallback_strategy(ctx)
            }
        }
    }

    async fn execute(
        &self,
        ctx: &AgentContext<Self::Params>,
        strategy: &Self::Strategy,
    ) -> Result<Vec<Self::Hit>>;

    /// Score, sort and cap raw hits
    fn rank(&self, strategy: &Self::Strategy, hits: Vec<Self::Hit>) -> Vec<SearchResult>;

    fn confidence(&self, strategy: &Self::Strategy, results: &[SearchResult]) -> f32;
}

/// Run one executor end to end, consulting the cache first
///
/// Only successful messages are cached.
pub async fn run_executor<E: RetrievalExecutor>(
    executor: &E,
    cache: &AgentCache,
    ctx: AgentContext<E::Params>,
) -> AgentMessage {
    let kind = executor.kind();

    if let Some(cached) = cache.get(kind, &ctx.original_query).await {
        debug!("{}: cache hit", kind);
        return cached;
    }

    let started = Instant::now();
    let mut ctx = ctx;
    executor.prepare_context(&mut ctx).await;
    let strategy = executor.analyze_strategy(&ctx).await;
    let mode = executor.mode_label(&strategy);
    debug!("{}: strategy {}", kind, mode);

    let message = match executor.execute(&ctx, &strategy).await {
        Ok(hits) => {
            let total_found = hits.len();
            let results = executor.rank(&strategy, hits);
            let confidence = executor.confidence(&strategy, &results);
            let returned = results.len();

            AgentMessage::success(
                ctx.query_id.clone(),
                kind,
                results,
                confidence,
                format!("Found {} results using {}", returned, mode),
            )
            .with_metadata(
                "strategy",
                serde_json::to_value(&strategy).unwrap_or(serde_json::Value::Null),
            )
            .with_metadata("total_found", json!(total_found))
            .with_metadata("returned", json!(returned))
        }
        Err(e) => {
            warn!("{} failed: {}", kind, e);
            AgentMessage::failure(ctx.query_id.clone(), kind, e)
        }
    }
    .with_processing_time(started.elapsed().as_secs_f64());

    cache.insert(kind, &ctx.original_query, &message).await;
    message
}

/// The closed set of retrieval executors
#[derive(Clone)]
pub enum Executor {
    Text(Arc<TextSearchExecutor>),
    Visual(Arc<VisualSearchExecutor>),
    Temporal(Arc<TemporalExecutor>),
}

impl Executor {
    pub fn kind(&self) -> AgentKind {
        match self {
            Executor::Text(_) => AgentKind::TextSearch,
            Executor::Visual(_) => AgentKind::VisualSearch,
            Executor::Temporal(_) => AgentKind::Temporal,
        }
    }

    /// Build this executor's context from the intent and run it
    pub async fn process(
        &self,
        cache: &AgentCache,
        query_id: &str,
        intent: Arc<QueryIntent>,
        query: &str,
    ) -> AgentMessage {
        match self {
            Executor::Text(executor) => {
                let ctx = context(query_id, &intent, query, intent.text_params.clone());
                run_executor(executor.as_ref(), cache, ctx).await
            }
            Executor::Visual(executor) => {
                let ctx = context(query_id, &intent, query, intent.visual_params.clone());
                run_executor(executor.as_ref(), cache, ctx).await
            }
            Executor::Temporal(executor) => {
                let ctx = context(query_id, &intent, query, intent.temporal_params.clone());
                run_executor(executor.as_ref(), cache, ctx).await
            }
        }
    }
}

fn context<P>(query_id: &str, intent: &Arc<QueryIntent>, query: &str, params: Option<P>) -> AgentContext<P> {
    AgentContext {
        query_id: query_id.to_string(),
        intent: Arc::clone(intent),
        original_query: query.to_string(),
        params,
    }
}

/// Run synchronous store, embedding or index work on the blocking pool
pub(crate) async fn blocking<T, F>(agent: AgentKind, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| VidSearchError::executor(agent.name(), format!("Blocking task failed: {}", e)))?
}

/// Treat an explicit JSON `null` like a missing field
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Confidence lookup shared by the executors: base, then result-count
/// adjustments
pub(crate) fn count_adjusted(base: f32, count: usize, many: (usize, f32), few: (usize, f32)) -> f32 {
    if count > many.0 {
        base + many.1
    } else if count < few.0 {
        base - few.1
    } else {
        base
    }
}
