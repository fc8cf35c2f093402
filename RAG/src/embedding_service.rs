use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{RagError, Result};
use crate::gemini_service::GeminiService;
use crate::models::*;

/// Gemini accepts at most this many texts per `batchEmbedContents` call.
const GEMINI_BATCH_LIMIT: usize = 100;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Deterministic bag-of-words embedder using feature hashing. Needs no model
/// download or network access; identical texts always map to identical vectors.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];
        let words = tokenize(text);
        if words.is_empty() {
            return embedding;
        }

        let total_words = words.len() as f32;
        for (word, count) in count_words(&words) {
            let bucket = (fnv1a(word.as_bytes()) % self.dimensions as u64) as usize;
            embedding[bucket] += count as f32 / total_words;
        }

        // Normalize the embedding
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in embedding.iter_mut() {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}

#[async_trait]
impl Embedder for GeminiService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedContentRequest {
            model: format!("models/{}", self.embedding_model),
            content: GeminiContent::from_text(embeddable(text)),
        };
        let response: EmbedContentResponse = self
            .post_json(&self.embedding_url("embedContent"), &request, RagError::Embedding)
            .await?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        let url = self.embedding_url("batchEmbedContents");

        for batch in texts.chunks(GEMINI_BATCH_LIMIT) {
            let request = BatchEmbedContentsRequest {
                requests: batch
                    .iter()
                    .map(|text| EmbedContentRequest {
                        model: format!("models/{}", self.embedding_model),
                        content: GeminiContent::from_text(embeddable(text)),
                    })
                    .collect(),
            };
            let response: BatchEmbedContentsResponse =
                self.post_json(&url, &request, RagError::Embedding).await?;

            if response.embeddings.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            vectors.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        Ok(vectors)
    }
}

// Gemini rejects empty parts; blank pages still need a vector.
fn embeddable(text: &str) -> &str {
    if text.trim().is_empty() {
        " "
    } else {
        text
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|word| word.chars().count() > 2)
        .collect()
}

fn count_words(words: &[String]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for word in words {
        *counts.entry(word.as_str()).or_insert(0) += 1;
    }
    counts
}

// Stable across builds, unlike std's RandomState, so stored vectors stay valid.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Cosine similarity; 0.0 for empty, zero-norm or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot_product / denom
    }
}
