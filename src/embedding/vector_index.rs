/// HNSW-backed vector collections with payloads and zstd snapshots
use hnsw_rs::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Collection lock poisoned")]
    LockPoisoned,
}

/// HNSW construction and query parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// Connections per layer (M)
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Expected number of points, used to size the graph
    pub capacity: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            capacity: 100_000,
        }
    }
}

/// Payload of a keyframe image embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyframePayload {
    pub video_id: String,
    pub keyframe_id: String,
}

/// Payload of a keyword embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordPayload {
    pub keyword: String,
    #[serde(default)]
    pub source_file: Option<String>,
}

/// Nearest-neighbour hit with cosine similarity
#[derive(Debug, Clone)]
pub struct ScoredPoint<P> {
    pub payload: P,
    /// Cosine similarity, higher is more similar
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint<P> {
    payload: P,
    vector: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot<P> {
    name: String,
    dimension: usize,
    points: Vec<StoredPoint<P>>,
}

struct Inner<P> {
    hnsw: Hnsw<'static, f32, DistCosine>,
    points: Vec<StoredPoint<P>>,
}

/// A named collection of payload-carrying vectors
///
/// Unfiltered queries go through the HNSW graph. Filtered queries score the
/// matching points exactly, so a selective filter cannot starve the result.
pub struct VectorCollection<P> {
    name: String,
    dimension: usize,
    params: HnswParams,
    inner: RwLock<Inner<P>>,
}

impl<P> VectorCollection<P>
where
    P: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(name: impl Into<String>, dimension: usize, params: HnswParams) -> Self {
        Self {
            name: name.into(),
            dimension,
            params,
            inner: RwLock::new(Inner {
                hnsw: new_graph(&params),
                points: Vec::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.points.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a vector with its payload
    pub fn insert(&self, payload: P, vector: Vec<f32>) -> Result<(), VectorIndexError> {
        self.check_dimension(&vector)?;

        let mut inner = self.inner.write().map_err(|_| VectorIndexError::LockPoisoned)?;
        let id = inner.points.len();
        inner.hnsw.insert((vector.as_slice(), id));
        inner.points.push(StoredPoint { payload, vector });

        Ok(())
    }

    /// Nearest neighbours of `query` scoring at least `score_floor`
    ///
    /// Results are sorted by similarity, highest first.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        score_floor: f32,
        filter: Option<&(dyn Fn(&P) -> bool + Sync)>,
    ) -> Result<Vec<ScoredPoint<P>>, VectorIndexError> {
        self.check_dimension(query)?;

        let inner = self.inner.read().map_err(|_| VectorIndexError::LockPoisoned)?;
        if inner.points.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<ScoredPoint<P>> = match filter {
            Some(filter) => inner
                .points
                .iter()
                .filter(|point| filter(&point.payload))
                .map(|point| ScoredPoint {
                    payload: point.payload.clone(),
                    score: cosine_similarity(query, &point.vector),
                })
                .collect(),
            None => {
                let ef = self.params.ef_search.max(limit);
                inner
                    .hnsw
                    .search(query, limit, ef)
                    .into_iter()
                    .filter_map(|neighbour| {
                        inner.points.get(neighbour.d_id).map(|point| ScoredPoint {
                            payload: point.payload.clone(),
                            score: 1.0 - neighbour.distance,
                        })
                    })
                    .collect()
            }
        };

        hits.retain(|hit| hit.score >= score_floor);
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(limit);

        Ok(hits)
    }

    /// Payloads matching `filter`, in insertion order
    pub fn scroll(
        &self,
        filter: &(dyn Fn(&P) -> bool + Sync),
        limit: usize,
    ) -> Result<Vec<P>, VectorIndexError> {
        let inner = self.inner.read().map_err(|_| VectorIndexError::LockPoisoned)?;
        Ok(inner
            .points
            .iter()
            .filter(|point| filter(&point.payload))
            .take(limit)
            .map(|point| point.payload.clone())
            .collect())
    }

    /// Write a zstd-compressed JSON snapshot, atomically via a temp file
    pub fn save(&self, path: &Path) -> Result<(), VectorIndexError> {
        let inner = self.inner.read().map_err(|_| VectorIndexError::LockPoisoned)?;
        let snapshot = Snapshot {
            name: self.name.clone(),
            dimension: self.dimension,
            points: inner.points.clone(),
        };

        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?;
        let compressed = zstd::encode_all(json.as_slice(), 3)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, compressed)?;
        fs::rename(&temp_path, path)?;

        tracing::debug!("Saved {} points of '{}' to {}", snapshot.points.len(), self.name, path.display());
        Ok(())
    }

    /// Rebuild a collection from a snapshot written by [`VectorCollection::save`]
    pub fn load(path: &Path, params: HnswParams) -> Result<Self, VectorIndexError> {
        if !path.exists() {
            return Err(VectorIndexError::SnapshotNotFound(path.display().to_string()));
        }

        let compressed = fs::read(path)?;
        let json = zstd::decode_all(compressed.as_slice())?;
        let snapshot: Snapshot<P> = serde_json::from_slice(&json)
            .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?;

        let params = HnswParams {
            capacity: params.capacity.max(snapshot.points.len()),
            ..params
        };
        let collection = Self::new(snapshot.name, snapshot.dimension, params);
        for point in snapshot.points {
            collection.insert(point.payload, point.vector)?;
        }

        tracing::info!(
            "Loaded vector collection '{}' ({} points, {}D)",
            collection.name,
            collection.len(),
            collection.dimension
        );
        Ok(collection)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn new_graph(params: &HnswParams) -> Hnsw<'static, f32, DistCosine> {
    Hnsw::<f32, DistCosine>::new(
        params.m,
        params.capacity.max(1),
        16,
        params.ef_construction,
        DistCosine,
    )
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    fn keyframes() -> VectorCollection<KeyframePayload> {
        let collection = VectorCollection::new("keyframes", 8, HnswParams::default());
        let frames = [("L01_V001", "001", 0), ("L01_V001", "002", 1), ("L02_V003", "010", 2)];
        for (video, frame, axis) in frames {
            collection
                .insert(
                    KeyframePayload {
                        video_id: video.to_string(),
                        keyframe_id: frame.to_string(),
                    },
                    unit(8, axis),
                )
                .unwrap();
        }
        collection
    }

    #[test]
    fn test_insert_and_search() {
        let collection = keyframes();
        assert_eq!(collection.len(), 3);

        let mut query = unit(8, 0);
        query[1] = 0.2;
        let hits = collection.search(&query, 2, 0.05, None).unwrap();

        assert!(!hits.is_empty());
        assert_eq!(hits[0].payload.keyframe_id, "001");
        assert!(hits[0].score > 0.9);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_score_floor() {
        let collection = keyframes();
        let hits = collection.search(&unit(8, 2), 10, 0.5, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.video_id, "L02_V003");
    }

    #[test]
    fn test_filtered_search_is_exact() {
        let collection = keyframes();
        let only_v001 = |p: &KeyframePayload| p.video_id == "L01_V001";
        let hits = collection
            .search(&unit(8, 2), 10, -1.0, Some(&only_v001))
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.payload.video_id == "L01_V001"));
    }

    #[test]
    fn test_scroll() {
        let collection = keyframes();
        let all = |_: &KeyframePayload| true;
        assert_eq!(collection.scroll(&all, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_dimension_validation() {
        let collection = keyframes();
        let result = collection.insert(
            KeyframePayload {
                video_id: "v".into(),
                keyframe_id: "k".into(),
            },
            vec![1.0; 4],
        );
        assert!(matches!(result, Err(VectorIndexError::InvalidDimension { .. })));
        assert!(collection.search(&[1.0; 3], 1, 0.0, None).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vectors").join("keywords.vec.zst");

        let collection = VectorCollection::new("keywords", 4, HnswParams::default());
        collection
            .insert(
                KeywordPayload {
                    keyword: "nấu ăn".to_string(),
                    source_file: Some("keywords.txt".to_string()),
                },
                unit(4, 3),
            )
            .unwrap();
        collection.save(&path).unwrap();

        let loaded: VectorCollection<KeywordPayload> =
            VectorCollection::load(&path, HnswParams::default()).unwrap();
        assert_eq!(loaded.name(), "keywords");
        assert_eq!(loaded.len(), 1);

        let hits = loaded.search(&unit(4, 3), 1, 0.7, None).unwrap();
        assert_eq!(hits[0].payload.keyword, "nấu ăn");
    }

    #[test]
    fn test_load_missing_snapshot() {
        let temp = TempDir::new().unwrap();
        let result: Result<VectorCollection<KeywordPayload>, _> =
            VectorCollection::load(&temp.path().join("missing.vec.zst"), HnswParams::default());
        assert!(matches!(result, Err(VectorIndexError::SnapshotNotFound(_))));
    }
}
