//! Top-level controller: intent analysis, concurrent dispatch, fusion

use super::{AgentCache, Executor};
use crate::config::Config;
use crate::error::{Result, VidSearchError};
use crate::llm::{prompts, Classifier};
use crate::models::{AgentKind, AgentMessage, QueryIntent};
use crate::retrieval::FusionEngine;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

const NO_RESULTS: &str = "No matching results found";

pub struct Orchestrator {
    classifier: Arc<dyn Classifier>,
    executors: Vec<Executor>,
    fusion: FusionEngine,
    cache: AgentCache,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(classifier: Arc<dyn Classifier>, fusion: FusionEngine, cache: AgentCache, timeout: Duration) -> Self {
        Self {
            classifier,
            executors: Vec::new(),
            fusion,
            cache,
            timeout,
        }
    }

    /// Fusion width, cache and per-executor deadline taken from `config`
    pub fn from_config(classifier: Arc<dyn Classifier>, config: &Config) -> Self {
        Self::new(
            classifier,
            FusionEngine::new(config.agents.max_results),
            AgentCache::new(&config.cache),
            Duration::from_secs(config.agents.timeout_secs),
        )
    }

    /// Register an executor; a later one of the same kind replaces it
    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executors.retain(|e| e.kind() != executor.kind());
        self.executors.push(executor);
        self
    }

    pub fn registered_agents(&self) -> Vec<AgentKind> {
        self.executors.iter().map(Executor::kind).collect()
    }

    /// Answer one query
    ///
    /// Never fails: an error outside every recovery point yields a failed
    /// message with zero confidence.
    pub async fn process(&self, query: &str) -> AgentMessage {
        let query_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        info!("Processing query {}: {}", query_id, query);

        let message = match self.run(&query_id, query).await {
            Ok(message) => message,
            Err(e) => {
                warn!("Query {} failed: {}", query_id, e);
                AgentMessage::failure(query_id.as_str(), AgentKind::Orchestrator, e)
            }
        };

        message.with_processing_time(started.elapsed().as_secs_f64())
    }

    async fn run(&self, query_id: &str, query: &str) -> Result<AgentMessage> {
        let intent = Arc::new(self.analyze_intent(query).await);
        debug!(
            "Intent {:?}, agents {:?}",
            intent.intent_type,
            intent.agents_needed.iter().map(AgentKind::name).collect::<Vec<_>>()
        );

        let outcomes = self.dispatch(query_id, Arc::clone(&intent), query).await;

        let (successful, failed): (Vec<AgentMessage>, Vec<AgentMessage>) =
            outcomes.into_iter().partition(|m| m.success);

        for message in &failed {
            warn!("{} failed: {}", message.agent_type, message.error_message);
        }

        let (results, explanation, fusion_strategy) = match successful.len() {
            0 => (Vec::new(), NO_RESULTS.to_string(), None),
            1 => (successful[0].results.clone(), successful[0].explanation.clone(), None),
            _ => {
                let fused = self.fusion.fuse(&successful, intent.fusion_strategy);
                let strategy = fused.metadata.get("fusion_strategy").cloned();
                (fused.results, fused.explanation, strategy)
            }
        };

        let intent_value = serde_json::to_value(intent.as_ref()).map_err(|e| VidSearchError::Json {
            source: e,
            context: "Failed to serialize query intent".to_string(),
        })?;
        let agents_used: Vec<&str> = successful.iter().map(|m| m.agent_type.name()).collect();
        let failed_agents: Vec<_> = failed
            .iter()
            .map(|m| json!({"agent": m.agent_type.name(), "error": m.error_message}))
            .collect();
        let total_results = results.len();

        info!(
            "Query {} finished: {} results from {} agents",
            query_id,
            total_results,
            successful.len()
        );

        let mut message = AgentMessage::success(
            query_id,
            AgentKind::Orchestrator,
            results,
            overall_confidence(&successful),
            explanation,
        )
        .with_metadata("intent", intent_value)
        .with_metadata("agents_used", json!(agents_used))
        .with_metadata("failed_agents", json!(failed_agents))
        .with_metadata("total_results", json!(total_results));

        if let Some(strategy) = fusion_strategy {
            message = message.with_metadata("fusion_strategy", strategy);
        }

        Ok(message)
    }

    async fn analyze_intent(&self, query: &str) -> QueryIntent {
        match self.classifier.classify(prompts::ORCHESTRATOR, query).await {
            Ok(value) => match QueryIntent::from_classifier(value) {
                Ok(intent) => intent,
                Err(e) => {
                    warn!("Malformed intent, falling back to text search: {}", e);
                    QueryIntent::fallback(query)
                }
            },
            Err(e) => {
                warn!("Intent analysis failed, falling back to text search: {}", e);
                QueryIntent::fallback(query)
            }
        }
    }

    /// Run every needed executor in its own task under the deadline
    async fn dispatch(&self, query_id: &str, intent: Arc<QueryIntent>, query: &str) -> Vec<AgentMessage> {
        let mut kinds = Vec::new();
        let mut tasks = Vec::new();
        let mut outcomes = Vec::new();

        for kind in intent.retrieval_agents() {
            let Some(executor) = self.executors.iter().find(|e| e.kind() == kind).cloned() else {
                outcomes.push(AgentMessage::failure(
                    query_id,
                    kind,
                    format!("No executor registered for {}", kind),
                ));
                continue;
            };

            let cache = self.cache.clone();
            let query_id = query_id.to_string();
            let query = query.to_string();
            let intent = Arc::clone(&intent);
            let deadline = self.timeout;

            kinds.push(kind);
            tasks.push(tokio::spawn(async move {
                tokio::time::timeout(deadline, executor.process(&cache, &query_id, intent, &query)).await
            }));
        }

        let joined = join_all(tasks).await;

        for (kind, outcome) in kinds.into_iter().zip(joined) {
            let message = match outcome {
                Ok(Ok(message)) if message.is_valid() && message.agent_type == kind => message,
                Ok(Ok(_)) => AgentMessage::failure(query_id, kind, "Executor returned a malformed message"),
                Ok(Err(_)) => AgentMessage::failure(
                    query_id,
                    kind,
                    format!("Timed out after {}s", self.timeout.as_secs_f64()),
                ),
                Err(e) => AgentMessage::failure(query_id, kind, format!("Executor task failed: {}", e)),
            };
            outcomes.push(message);
        }

        outcomes
    }
}

/// Mean of successful confidences weighted by result count + 1
fn overall_confidence(successful: &[AgentMessage]) -> f32 {
    let (weighted, weights) = successful.iter().fold((0.0f32, 0.0f32), |(sum, total), m| {
        let weight = m.results.len() as f32 + 1.0;
        (sum + m.confidence * weight, total + weight)
    });

    if weights == 0.0 {
        0.0
    } else {
        weighted / weights
    }
}
