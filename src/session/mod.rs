//! Search session
//!
//! Top-level query interface: wraps each orchestration run in a
//! [`SearchResponse`] envelope and keeps a bounded history for statistics.
use crate::agents::Orchestrator;
use crate::error::{Result, VidSearchError};
use crate::models::SearchResult;
use ahash::{HashMap, HashMapExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Pause between queries in a batch
pub const BATCH_PAUSE: Duration = Duration::from_millis(100);

/// Response envelope for one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub success: bool,
    pub confidence: f32,
    /// Wall-clock seconds, including intent analysis and fusion
    pub processing_time: f64,
    pub explanation: String,
    pub results: Vec<SearchResult>,
    pub metadata: Map<String, Value>,
    pub agents_used: Vec<String>,
    pub total_results: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregates over the session history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_searches: usize,
    pub success_rate: f64,
    pub average_confidence: f64,
    pub average_processing_time: f64,
    pub agent_usage: std::collections::BTreeMap<String, usize>,
}

pub struct SearchSession {
    orchestrator: Orchestrator,
    history: VecDeque<SearchResponse>,
    max_history: usize,
}

impl SearchSession {
    pub fn new(orchestrator: Orchestrator, max_history: usize) -> Self {
        Self {
            orchestrator,
            history: VecDeque::new(),
            max_history,
        }
    }

    /// Run one query and record it in the history
    pub async fn search(&mut self, query: &str) -> SearchResponse {
        let started = Instant::now();
        let message = self.orchestrator.process(query).await;
        let processing_time = started.elapsed().as_secs_f64();

        let agents_used = message
            .metadata
            .get("agents_used")
            .and_then(Value::as_array)
            .map(|agents| {
                agents
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let response = if message.success {
            SearchResponse {
                query: query.to_string(),
                success: true,
                confidence: message.confidence,
                processing_time,
                explanation: message.explanation,
                total_results: message.results.len(),
                results: message.results,
                metadata: message.metadata,
                agents_used,
                error: None,
                timestamp: Utc::now(),
            }
        } else {
            warn!("Search failed: {}", message.error_message);
            SearchResponse {
                query: query.to_string(),
                success: false,
                confidence: 0.0,
                processing_time,
                explanation: format!("Search failed: {}", message.error_message),
                results: Vec::new(),
                metadata: Map::new(),
                agents_used,
                total_results: 0,
                error: Some(message.error_message),
                timestamp: Utc::now(),
            }
        };

        info!(
            "'{}': {} results, confidence {:.2}, {:.2}s",
            query, response.total_results, response.confidence, response.processing_time
        );

        self.record(response.clone());
        response
    }

    /// Run queries one after another with a short pause between them
    pub async fn batch_search(&mut self, queries: &[String]) -> Vec<SearchResponse> {
        let mut responses = Vec::with_capacity(queries.len());

        for (i, query) in queries.iter().enumerate() {
            info!("Batch query {}/{}", i + 1, queries.len());
            responses.push(self.search(query).await);
            tokio::time::sleep(BATCH_PAUSE).await;
        }

        responses
    }

    pub fn history(&self) -> impl Iterator<Item = &SearchResponse> {
        self.history.iter()
    }

    pub fn stats(&self) -> SessionStats {
        let total = self.history.len();
        if total == 0 {
            return SessionStats::default();
        }

        let successful = self.history.iter().filter(|r| r.success).count();
        let confidence: f64 = self.history.iter().map(|r| r.confidence as f64).sum();
        let time: f64 = self.history.iter().map(|r| r.processing_time).sum();

        let mut usage: HashMap<&str, usize> = HashMap::new();
        for response in &self.history {
            for agent in &response.agents_used {
                *usage.entry(agent.as_str()).or_insert(0) += 1;
            }
        }

        SessionStats {
            total_searches: total,
            success_rate: successful as f64 / total as f64,
            average_confidence: confidence / total as f64,
            average_processing_time: time / total as f64,
            agent_usage: usage.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    /// Write the history as pretty JSON
    pub fn export_history(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.history).map_err(|e| VidSearchError::Json {
            source: e,
            context: "Failed to serialize search history".to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| VidSearchError::Io {
            source: e,
            context: format!("Failed to write search history: {}", path.display()),
        })?;
        Ok(())
    }

    fn record(&mut self, response: SearchResponse) {
        if self.max_history == 0 {
            return;
        }
        while self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedClassifier;
    use crate::agents::AgentCache;
    use crate::retrieval::FusionEngine;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn session(max_history: usize) -> SearchSession {
        let orchestrator = Orchestrator::new(
            Arc::new(ScriptedClassifier::failing()),
            FusionEngine::default(),
            AgentCache::disabled(),
            Duration::from_secs(5),
        );
        SearchSession::new(orchestrator, max_history)
    }

    #[tokio::test]
    async fn test_search_without_executors_is_empty_success() {
        let mut session = session(10);
        let response = session.search("cooking show").await;

        assert!(response.success);
        assert!(response.results.is_empty());
        assert_eq!(response.total_results, 0);
        assert_eq!(response.confidence, 0.0);
        assert!(response.agents_used.is_empty());
        assert!(response.error.is_none());
        assert_eq!(response.metadata["failed_agents"][0]["agent"], "TextSearchAgent");
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let mut session = session(2);
        for query in ["a", "b", "c"] {
            session.search(query).await;
        }

        let queries: Vec<_> = session.history().map(|r| r.query.as_str()).collect();
        assert_eq!(queries, vec!["b", "c"]);
        assert_eq!(session.stats().total_searches, 2);
    }

    #[tokio::test]
    async fn test_batch_and_stats() {
        let mut session = session(10);
        let queries = vec!["first".to_string(), "second".to_string()];
        let responses = session.batch_search(&queries).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1].query, "second");

        let stats = session.stats();
        assert_eq!(stats.total_searches, 2);
        assert_eq!(stats.success_rate, 1.0);
        assert_eq!(stats.average_confidence, 0.0);
        assert!(stats.agent_usage.is_empty());
    }

    #[test]
    fn test_stats_empty() {
        assert_eq!(session(10).stats(), SessionStats::default());
    }

    #[tokio::test]
    async fn test_export_history() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let mut session = session(10);
        session.search("news").await;
        session.export_history(&path).unwrap();

        let saved: Vec<SearchResponse> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].query, "news");
    }
}
