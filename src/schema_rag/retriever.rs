//! Example retriever
//!
//! Finds previously seen SQL queries similar to a question, for few-shot
//! grounding of the intent and synthesis prompts. Retrieval never fails: any
//! problem yields the static example list.

use crate::error::{QueryGptError, Result};
use crate::schema_rag::embedder::{validate_embedding, Embedder};
use crate::schema_rag::vector_store::{InMemoryVectorStore, VectorIndex};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Used whenever embedding or search fails.
pub const STATIC_EXAMPLES: [&str; 3] = [
    "SELECT po.PO_NUM, po.ORDERED_AMOUNT FROM PO_NORM_TABLE_DUMMY po WHERE po.ORDERED_AMOUNT > 10000",
    "SELECT pr.REQUISTION_NO, pr.CREATION_DATE FROM PR_DATA_DUMMY pr WHERE pr.CREATION_DATE > SYSDATE - 30",
    "SELECT i.INVOICE_NUM, i.INVOICE_AMOUNT FROM PO_INVOICE_DATA_DUMMY i JOIN PO_NORM_TABLE_DUMMY p ON i.PO_NUMBER = p.PO_NUM",
];

pub fn static_examples() -> Vec<String> {
    STATIC_EXAMPLES.iter().map(|s| s.to_string()).collect()
}

pub struct ExampleRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
}

impl ExampleRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, top_k: usize) -> Self {
        Self {
            embedder,
            index,
            top_k,
        }
    }

    /// Up to `top_k` similar example queries, most similar first.
    pub async fn retrieve(&self, query: &str) -> Vec<String> {
        match self.try_retrieve(query).await {
            Ok(examples) => examples,
            Err(e) => {
                warn!("Example retrieval failed, using static examples: {}", e);
                static_examples()
            }
        }
    }

    async fn try_retrieve(&self, query: &str) -> Result<Vec<String>> {
        if query.trim().is_empty() {
            return Err(QueryGptError::VectorStore("User query is empty or invalid".to_string()));
        }

        let embedding = self.embedder.embed_text(query).await?;
        debug!("Embedding length: {}", embedding.len());
        validate_embedding(&embedding)?;

        let results = self.index.search(&embedding, self.top_k).await?;
        if results.is_empty() {
            return Err(QueryGptError::VectorStore("Example index returned no results".to_string()));
        }

        Ok(results.into_iter().map(|r| r.text).collect())
    }
}

/// Read a JSON array of example SQL strings.
pub fn load_examples(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let examples: Vec<String> = serde_json::from_str(&content)?;
    Ok(examples)
}

/// Embed and index examples. Examples whose embedding fails are skipped.
pub async fn build_example_index(
    embedder: &dyn Embedder,
    examples: &[String],
) -> InMemoryVectorStore {
    let mut store = InMemoryVectorStore::new(embedder.dimension());

    for example in examples {
        let embedded = embedder
            .embed_text(example)
            .await
            .and_then(|e| validate_embedding(&e).map(|_| e));
        match embedded {
            Ok(embedding) => {
                store.add_document(example.clone(), embedding);
            }
            Err(e) => warn!("Skipping example '{}': {}", example, e),
        }
    }

    info!("Indexed {} of {} SQL examples", store.len(), examples.len());
    store
}
