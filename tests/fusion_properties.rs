//! Fusion and ranking properties over generated result sets

use std::collections::HashSet;
use vidsearch::models::{AgentKind, AgentMessage, FusionMode, ResultType, SearchResult};
use vidsearch::retrieval::{deduplicate_results, FusionEngine, FusionPlan, ResultRanker};

fn frame(video: &str, frame: u32, score: f32, agent: AgentKind) -> SearchResult {
    SearchResult::new(video, Some(format!("{:03}", frame)), score, agent, ResultType::Keyframe)
}

fn message(agent: AgentKind, confidence: f32, results: Vec<SearchResult>) -> AgentMessage {
    AgentMessage::success("q", agent, results, confidence, "")
}

/// Deterministic pseudo-random scores in [0, 1]
fn scores(seed: u32, n: usize) -> Vec<f32> {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 1000) as f32 / 999.0
        })
        .collect()
}

#[test]
fn test_dedup_keeps_highest_of_each_identity() {
    let results = vec![
        frame("v1", 1, 0.4, AgentKind::TextSearch),
        frame("v1", 1, 0.9, AgentKind::VisualSearch),
        frame("v2", 1, 0.5, AgentKind::TextSearch),
        frame("v1", 1, 0.7, AgentKind::Temporal),
        SearchResult::new("v1", None, 0.3, AgentKind::TextSearch, ResultType::Video),
    ];

    let deduped = deduplicate_results(results);

    assert_eq!(deduped.len(), 3);
    let v1 = deduped
        .iter()
        .find(|r| r.video_id == "v1" && r.keyframe_id.is_some())
        .unwrap();
    assert_eq!(v1.score, 0.9);
    assert_eq!(v1.source_agent, AgentKind::VisualSearch);
}

#[test]
fn test_diversity_rank_is_geometric_within_one_video() {
    let weight = 0.2;
    let input: Vec<SearchResult> = [0.9, 0.8, 0.7, 0.6]
        .iter()
        .enumerate()
        .map(|(i, s)| frame("v1", i as u32, *s, AgentKind::VisualSearch))
        .collect();

    let ranked = ResultRanker::diversity_rank(input.clone(), weight);

    for (rank, (before, after)) in input.iter().zip(&ranked).enumerate() {
        assert_eq!(before.keyframe_id, after.keyframe_id);
        let expected = before.score * (1.0 - weight).powi(rank as i32);
        assert!((after.score - expected).abs() < 1e-6);
    }
    for pair in ranked.windows(2) {
        assert!(pair[0].score > pair[1].score);
    }
}

#[test]
fn test_weighted_scores_never_exceed_one() {
    let engine = FusionEngine::default();
    let plan = FusionPlan::new(FusionMode::Weighted);

    for seed in 1..40 {
        let raw = scores(seed, 12);
        let inputs = [
            message(
                AgentKind::TextSearch,
                1.0,
                raw[..4].iter().enumerate().map(|(i, s)| frame("t", i as u32, s * 2.5, AgentKind::TextSearch)).collect(),
            ),
            message(
                AgentKind::VisualSearch,
                0.95,
                raw[4..8].iter().enumerate().map(|(i, s)| frame("v", i as u32, *s, AgentKind::VisualSearch)).collect(),
            ),
            message(
                AgentKind::Temporal,
                0.9,
                raw[8..].iter().enumerate().map(|(i, s)| frame("m", i as u32, *s, AgentKind::Temporal)).collect(),
            ),
        ];

        let fused = engine.fuse_with_plan(&inputs, &plan).unwrap();
        assert!(fused.iter().all(|r| r.score <= 1.0), "seed {}", seed);
    }
}

#[test]
fn test_intersection_membership() {
    let engine = FusionEngine::default();
    let plan = FusionPlan::new(FusionMode::Intersection);

    for seed in 1..20 {
        let raw = scores(seed, 6);
        let inputs = [
            message(
                AgentKind::TextSearch,
                0.9,
                vec![
                    frame("shared", 1, raw[0], AgentKind::TextSearch),
                    frame("text_only", 1, raw[1], AgentKind::TextSearch),
                ],
            ),
            message(
                AgentKind::VisualSearch,
                0.8,
                vec![
                    frame("shared", 1, raw[2], AgentKind::VisualSearch),
                    frame("visual_only", 1, raw[3], AgentKind::VisualSearch),
                ],
            ),
            message(AgentKind::Temporal, 0.7, vec![frame("temporal_only", 1, raw[4], AgentKind::Temporal)]),
        ];

        let fused = engine.fuse_with_plan(&inputs, &plan).unwrap();

        assert_eq!(fused.len(), 1, "seed {}", seed);
        assert_eq!(fused[0].video_id, "shared");
        let best_original = raw[0].max(raw[2]);
        assert!(fused[0].score <= (best_original * 1.2).min(1.0) + 1e-6);
    }
}

#[test]
fn test_mixed_confidence_resolves_to_ranked() {
    let text = message(
        AgentKind::TextSearch,
        0.9,
        (0..3).map(|i| frame("v1", i, 0.8, AgentKind::TextSearch)).collect(),
    );
    let visual = message(AgentKind::VisualSearch, 0.5, vec![frame("v2", 0, 0.6, AgentKind::VisualSearch)]);

    let fused = FusionEngine::default().fuse(&[text, visual], FusionMode::Weighted);

    assert!(fused.success);
    assert_eq!(fused.agent_type, AgentKind::ResultFusion);
    assert_eq!(fused.metadata["fusion_strategy"], "RANKED");
    assert_eq!(fused.metadata["requested_strategy"], "WEIGHTED");
    assert_eq!(fused.results.len(), 4);
}

#[test]
fn test_threshold_is_exclusive() {
    let at = [
        message(AgentKind::TextSearch, 0.8, vec![]),
        message(AgentKind::Temporal, 0.8, vec![]),
    ];
    assert_eq!(FusionPlan::select(&at).mode, FusionMode::Ranked);

    let above = [
        message(AgentKind::TextSearch, 0.81, vec![]),
        message(AgentKind::Temporal, 0.8, vec![]),
    ];
    assert_eq!(FusionPlan::select(&above).mode, FusionMode::Weighted);
}

#[test]
fn test_non_finite_score_falls_back_to_concatenation() {
    let inputs = [
        message(AgentKind::TextSearch, 0.9, vec![frame("v1", 1, f32::NAN, AgentKind::TextSearch)]),
        message(AgentKind::VisualSearch, 0.9, vec![frame("v2", 1, 0.5, AgentKind::VisualSearch)]),
    ];

    let fused = FusionEngine::default().fuse(&inputs, FusionMode::Union);

    assert!(fused.success);
    assert_eq!(fused.confidence, 0.5);
    assert_eq!(fused.metadata["fusion_strategy"], "FALLBACK");
    assert_eq!(fused.results.len(), 2);
}

#[test]
fn test_fused_output_has_unique_identities() {
    let engine = FusionEngine::default();

    for mode in [FusionMode::Union, FusionMode::Weighted, FusionMode::Ranked] {
        let inputs = [
            message(
                AgentKind::TextSearch,
                0.9,
                vec![frame("v1", 1, 0.9, AgentKind::TextSearch), frame("v2", 1, 0.4, AgentKind::TextSearch)],
            ),
            message(
                AgentKind::VisualSearch,
                0.9,
                vec![frame("v1", 1, 0.6, AgentKind::VisualSearch), frame("v3", 1, 0.5, AgentKind::VisualSearch)],
            ),
        ];

        let fused = engine.fuse_with_plan(&inputs, &FusionPlan::new(mode)).unwrap();
        let keys: HashSet<_> = fused.iter().map(|r| r.identity_key()).collect();
        assert_eq!(keys.len(), fused.len(), "{}", mode);
        assert_eq!(fused.len(), 3, "{}", mode);
    }
}
