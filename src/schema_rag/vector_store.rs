//! Vector Store Abstraction
//!
//! In-memory cosine-similarity index over previously seen SQL queries.

use crate::error::{QueryGptError, Result};
use async_trait::async_trait;
use tracing::warn;

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

/// Stored text with its similarity to the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredText {
    pub text: String,
    pub score: f32,
}

/// Similarity-search capability.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<ScoredText>>;
}

#[derive(Debug, Clone)]
struct Document {
    text: String,
    embedding: Embedding,
}

/// Linear-scan store. Example sets are small, so no ANN index is needed.
#[derive(Debug, Clone)]
pub struct InMemoryVectorStore {
    documents: Vec<Document>,
    dimension: usize,
}

impl InMemoryVectorStore {
    /// Create a new vector store with specified embedding dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            documents: Vec::new(),
            dimension,
        }
    }

    /// Add a document. Returns false (and stores nothing) on a dimension mismatch.
    pub fn add_document(&mut self, text: impl Into<String>, embedding: Embedding) -> bool {
        if embedding.len() != self.dimension {
            warn!(
                "Embedding dimension {} doesn't match store dimension {}",
                embedding.len(),
                self.dimension
            );
            return false;
        }
        self.documents.push(Document {
            text: text.into(),
            embedding,
        });
        true
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn search_sync(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<ScoredText>> {
        if query_embedding.len() != self.dimension {
            return Err(QueryGptError::VectorStore(format!(
                "Query embedding dimension {} doesn't match store dimension {}",
                query_embedding.len(),
                self.dimension
            )));
        }

        let mut results: Vec<ScoredText> = self
            .documents
            .iter()
            .map(|doc| ScoredText {
                text: doc.text.clone(),
                score: cosine_similarity(query_embedding, &doc.embedding),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);

        Ok(results)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorStore {
    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<ScoredText>> {
        self.search_sync(query_embedding, top_k)
    }
}

/// Compute cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
