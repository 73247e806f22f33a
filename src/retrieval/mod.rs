//! Post-retrieval processing
//!
//! Score normalization and diversity re-ranking, identity-key deduplication
//! and the fusion engine that merges several executors' outputs.

mod deduplication;
mod fusion;
mod ranker;

pub use deduplication::deduplicate_results;
pub use fusion::{
    DeduplicationConfig, FusionEngine, FusionError, FusionPlan, RankingCriteria,
    WEIGHTED_CONFIDENCE_THRESHOLD,
};
pub use ranker::{sort_by_score, ResultRanker, DEFAULT_DIVERSITY_WEIGHT};
