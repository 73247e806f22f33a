/// Embedding generation and vector collections
///
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local embedding (CLIP text tower, multilingual MiniLM)
/// - VectorCollection: HNSW graph plus payloads, persisted as zstd snapshots
mod provider;
mod vector_index;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{
    HnswParams, KeyframePayload, KeywordPayload, ScoredPoint, VectorCollection, VectorIndexError,
};

use crate::config::IndexingConfig;

impl From<&IndexingConfig> for HnswParams {
    fn from(config: &IndexingConfig) -> Self {
        Self {
            m: config.hnsw_m,
            ef_construction: config.hnsw_ef_construction,
            ef_search: config.hnsw_ef_search,
            ..Self::default()
        }
    }
}
