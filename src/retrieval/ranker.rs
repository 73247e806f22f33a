//! Stateless score utilities shared by executors and fusion

use crate::models::SearchResult;
use ahash::{HashMap, HashMapExt};
use std::cmp::Ordering;

/// Default per-rank discount applied inside one video
pub const DEFAULT_DIVERSITY_WEIGHT: f32 = 0.2;

pub struct ResultRanker;

impl ResultRanker {
    /// Rescale scores linearly into [0, 1] using the observed min and max
    ///
    /// Left untouched when every score is equal.
    pub fn normalize(mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        let Some(min) = results.iter().map(|r| r.score).reduce(f32::min) else {
            return results;
        };
        let max = results.iter().map(|r| r.score).fold(min, f32::max);

        if max == min {
            return results;
        }

        let span = max - min;
        for result in &mut results {
            result.score = (result.score - min) / span;
        }
        results
    }

    /// Discount repeated hits from one video by `(1 - weight)^rank`
    ///
    /// Rank is the position inside the video's own group after sorting by
    /// score, so each video's best hit keeps its score. The full list is
    /// re-sorted afterwards.
    pub fn diversity_rank(results: Vec<SearchResult>, weight: f32) -> Vec<SearchResult> {
        if results.len() <= 1 {
            return results;
        }

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<SearchResult>> = HashMap::new();
        for result in results {
            if !groups.contains_key(&result.video_id) {
                order.push(result.video_id.clone());
            }
            groups.entry(result.video_id.clone()).or_default().push(result);
        }

        let mut diverse = Vec::new();
        for video_id in order {
            let Some(mut group) = groups.remove(&video_id) else { continue };
            sort_by_score(&mut group);
            for (rank, mut result) in group.into_iter().enumerate() {
                result.score *= (1.0 - weight).powi(rank as i32);
                diverse.push(result);
            }
        }

        sort_by_score(&mut diverse);
        diverse
    }

    /// Grouping of temporally adjacent keyframes
    ///
    /// Reserved: results pass through unchanged.
    pub fn temporal_clustering(results: Vec<SearchResult>, _window_secs: f64) -> Vec<SearchResult> {
        results
    }
}

/// Stable sort, highest score first
pub fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}
