//! Result deduplication by identity key

use crate::models::{IdentityKey, SearchResult};
use crate::retrieval::ranker::sort_by_score;
use std::collections::HashSet;

/// Sort by score, then keep the first result seen per identity key
///
/// The survivor of each duplicate group is therefore its highest-scored
/// member; ties keep the earlier input.
pub fn deduplicate_results(mut results: Vec<SearchResult>) -> Vec<SearchResult> {
    sort_by_score(&mut results);

    let mut seen: HashSet<IdentityKey> = HashSet::new();

    results
        .into_iter()
        .filter(|result| seen.insert(result.identity_key()))
        .collect()
}
