//! Storage layer for vidsearch
//!
//! Structured records (videos, keyframes, detected objects) live in SQLite;
//! embeddings live in the vector collections under `storage.vector_dir`.

pub mod database;

pub use database::{Database, DbPool, DbStats, TextField};

use serde::{Deserialize, Serialize};

/// One row of the `videos` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: String,
    pub author: Option<String>,
    pub channel_id: Option<String>,
    pub channel_url: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    /// Seconds
    pub length: Option<i64>,
    pub publish_date: Option<String>,
    pub thumbnail_url: Option<String>,
    pub title: Option<String>,
    pub watch_url: Option<String>,
}

/// One row of the `keyframes` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyframeRecord {
    pub video_id: String,
    pub keyframe_id: String,
    /// Presentation timestamp in seconds
    pub pts_time: f64,
    pub frame_idx: i64,
}

/// One detection from the `objects` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub video_id: String,
    pub keyframe_id: String,
    pub object_name: String,
    pub confidence: f64,
    pub ymin: Option<f64>,
    pub xmin: Option<f64>,
    pub ymax: Option<f64>,
    pub xmax: Option<f64>,
}

/// A keyframe aggregated over its matching detections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectHit {
    pub video_id: String,
    pub keyframe_id: String,
    pub object_names: Vec<String>,
    pub avg_confidence: f64,
    pub object_count: i64,
    pub pts_time: f64,
    pub frame_idx: i64,
}

/// A keyframe inside a time window, with its video's title and author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeHit {
    #[serde(flatten)]
    pub keyframe: KeyframeRecord,
    pub title: Option<String>,
    pub author: Option<String>,
}
