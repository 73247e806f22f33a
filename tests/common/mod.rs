//! Shared fixtures: a prompt-routing classifier, a deterministic embedder
//! and a seeded SQLite corpus

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vidsearch::embedding::{EmbeddingError, EmbeddingProvider, HnswParams, KeyframePayload, VectorCollection};
use vidsearch::llm::{prompts, Classifier, ClassifierError};
use vidsearch::storage::{Database, KeyframeRecord, ObjectRecord, VideoRecord};

/// Which system prompt a classifier call was made with
pub fn prompt_label(system_prompt: &str) -> &'static str {
    if system_prompt == prompts::ORCHESTRATOR {
        "orchestrator"
    } else if system_prompt == prompts::TEXT_SEARCH {
        "text"
    } else if system_prompt == prompts::VISUAL_SEARCH {
        "visual"
    } else if system_prompt == prompts::TEMPORAL {
        "temporal"
    } else {
        "unknown"
    }
}

/// Replies per system prompt; prompts without a reply fail like an
/// unreachable service
#[derive(Default)]
pub struct RoutingClassifier {
    replies: HashMap<&'static str, Value>,
    delays: HashMap<&'static str, Duration>,
    calls: Mutex<Vec<&'static str>>,
}

impl RoutingClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, label: &'static str, value: Value) -> Self {
        self.replies.insert(label, value);
        self
    }

    pub fn delay(mut self, label: &'static str, delay: Duration) -> Self {
        self.delays.insert(label, delay);
        self
    }

    pub fn calls(&self, label: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|l| **l == label).count()
    }
}

#[async_trait]
impl Classifier for RoutingClassifier {
    async fn classify(&self, system_prompt: &str, _query: &str) -> Result<Value, ClassifierError> {
        let label = prompt_label(system_prompt);
        self.calls.lock().unwrap().push(label);

        if let Some(delay) = self.delays.get(label) {
            tokio::time::sleep(*delay).await;
        }

        self.replies
            .get(label)
            .cloned()
            .ok_or_else(|| ClassifierError::Request(format!("no reply scripted for {}", label)))
    }
}

/// One axis per known word, everything else on the last axis
pub struct WordEmbedder {
    pub words: Vec<&'static str>,
}

impl EmbeddingProvider for WordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }

        let lowered = text.to_lowercase();
        let mut vector = vec![0.0; self.words.len() + 1];
        for (axis, word) in self.words.iter().enumerate() {
            if lowered.contains(word) {
                vector[axis] = 1.0;
            }
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[self.words.len()] = 1.0;
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.words.len() + 1
    }

    fn model_name(&self) -> &str {
        "word-axes"
    }
}

pub fn video(id: &str, title: &str, keywords: &str, author: &str, length: i64) -> VideoRecord {
    VideoRecord {
        video_id: id.to_string(),
        title: Some(title.to_string()),
        keywords: Some(keywords.to_string()),
        author: Some(author.to_string()),
        description: Some(format!("{} - {}", title, author)),
        length: Some(length),
        ..VideoRecord::default()
    }
}

/// Three videos, four keyframes each (every 30s), a few detections
pub fn seeded_database(path: &Path) -> Arc<Database> {
    let db = Database::new(path).unwrap();

    db.insert_video(&video("L01_V001", "Nấu ăn ngon mỗi ngày", "nấu ăn, ẩm thực", "Chef Lan", 620))
        .unwrap();
    db.insert_video(&video("L01_V002", "Tin tức buổi sáng", "tin tức, thời sự", "VTV", 1800))
        .unwrap();
    db.insert_video(&video("L02_V001", "Đua xe đạp địa hình", "xe đạp, thể thao", "Sport TV", 300))
        .unwrap();

    for video_id in ["L01_V001", "L01_V002", "L02_V001"] {
        for i in 0..4 {
            db.insert_keyframe(&KeyframeRecord {
                video_id: video_id.to_string(),
                keyframe_id: format!("{:03}", i + 1),
                pts_time: i as f64 * 30.0,
                frame_idx: i * 750,
            })
            .unwrap();
        }
    }

    db.insert_object(&ObjectRecord {
        video_id: "L02_V001".to_string(),
        keyframe_id: "002".to_string(),
        object_name: "Bicycle".to_string(),
        confidence: 0.9,
        ..ObjectRecord::default()
    })
    .unwrap();

    Arc::new(db)
}

/// Keyframe collection matching [`seeded_database`]: the cycling video's
/// frames sit on the "bicycle" axis, the cooking video's on "knife"
pub fn keyframe_collection(embedder: &WordEmbedder) -> Arc<VectorCollection<KeyframePayload>> {
    let collection = VectorCollection::new("keyframes", embedder.dimension(), HnswParams::default());
    let frames = [
        ("L02_V001", "001", "bicycle race"),
        ("L02_V001", "002", "bicycle race"),
        ("L01_V001", "001", "knife"),
        ("L01_V002", "001", "studio"),
    ];
    for (video_id, keyframe_id, caption) in frames {
        collection
            .insert(
                KeyframePayload {
                    video_id: video_id.to_string(),
                    keyframe_id: keyframe_id.to_string(),
                },
                embedder.embed(caption).unwrap(),
            )
            .unwrap();
    }
    Arc::new(collection)
}
