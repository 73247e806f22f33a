/// Embedding provider trait and FastEmbed implementation
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding providers
///
/// The visual executor holds one for the CLIP text tower and the text
/// executor one for keyword expansion. Tests substitute deterministic fakes.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// FastEmbed provider for local embedding generation
///
/// Models are downloaded on first use into the fastembed cache directory.
/// - clip-vit-b-32: CLIP ViT-B/32 text tower (512 dims), shares the space of
///   the keyframe image embeddings
/// - paraphrase-multilingual-minilm-l12-v2: multilingual sentence model
///   (384 dims), used for the keyword collection
/// - all-MiniLM-L6-v2: small English model (384 dims)
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension) = match model_name {
            "clip-vit-b-32" | "clip-ViT-B-32" => (EmbeddingModel::ClipVitB32, 512),
            "paraphrase-multilingual-minilm-l12-v2" | "paraphrase-multilingual-MiniLM-L12-v2" => {
                (EmbeddingModel::ParaphraseMLMiniLML12V2, 384)
            }
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: clip-vit-b-32, paraphrase-multilingual-minilm-l12-v2, all-MiniLM-L6-v2",
                    model_name
                )));
            }
        };

        tracing::info!("Initializing embedding model: {} ({}D)", model_name, dimension);

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let embedding = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))?;

        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let valid_texts: Vec<String> = texts.iter().filter(|t| !t.trim().is_empty()).cloned().collect();

        if valid_texts.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "All texts are empty".to_string(),
            ));
        }

        let embeddings = self
            .model
            .embed(valid_texts, None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_model() {
        let result = FastEmbedProvider::new("word2vec");
        assert!(matches!(result, Err(EmbeddingError::InitializationError(_))));
    }

    #[test]
    #[ignore] // Requires model download - run with: cargo test -- --ignored
    fn test_clip_text_embedding() {
        let provider = FastEmbedProvider::new("clip-vit-b-32").unwrap();
        assert_eq!(provider.dimension(), 512);

        let embedding = provider.embed("a red car on a street").unwrap();
        assert_eq!(embedding.len(), 512);
    }

    #[test]
    #[ignore] // Requires model download - run with: cargo test -- --ignored
    fn test_multilingual_similarity() {
        let provider = FastEmbedProvider::new("paraphrase-multilingual-minilm-l12-v2").unwrap();

        let emb1 = provider.embed("nấu ăn").unwrap();
        let emb2 = provider.embed("cooking").unwrap();
        let emb3 = provider.embed("bóng đá").unwrap();

        assert!(cosine_similarity(&emb1, &emb2) > cosine_similarity(&emb1, &emb3));
    }

    #[test]
    #[ignore] // Requires model download - run with: cargo test -- --ignored
    fn test_empty_text() {
        let provider = FastEmbedProvider::new("all-MiniLM-L6-v2").unwrap();
        assert!(provider.embed("   ").is_err());
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (mag_a * mag_b)
    }
}
