//! Per-agent message cache
//!
//! Keyed by agent and a blake3 hash of the raw query, bounded by entry
//! count and TTL via [`moka`]. Concurrent identical queries may both miss
//! and recompute; nothing locks around population.

use crate::config::CacheConfig;
use crate::models::{AgentKind, AgentMessage};
use moka::future::Cache;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    agent: AgentKind,
    query_hash: [u8; 32],
}

impl CacheKey {
    pub fn new(agent: AgentKind, query: &str) -> Self {
        Self {
            agent,
            query_hash: *blake3::hash(query.as_bytes()).as_bytes(),
        }
    }
}

/// Shared handle; clones see the same entries
#[derive(Clone)]
pub struct AgentCache {
    inner: Option<Cache<CacheKey, AgentMessage>>,
}

impl AgentCache {
    pub fn new(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();

        Self { inner: Some(cache) }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub async fn get(&self, agent: AgentKind, query: &str) -> Option<AgentMessage> {
        let cache = self.inner.as_ref()?;
        cache.get(&CacheKey::new(agent, query)).await
    }

    /// Store a message; failed messages are ignored
    pub async fn insert(&self, agent: AgentKind, query: &str, message: &AgentMessage) {
        let Some(cache) = &self.inner else { return };
        if !message.success {
            return;
        }
        cache.insert(CacheKey::new(agent, query), message.clone()).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.as_ref().map(|c| c.entry_count()).unwrap_or(0)
    }
}
