//! In-process doubles for the generation, embedding and audit backends.

#![allow(dead_code)]

use async_trait::async_trait;
use querygpt::audit::{AuditRecord, AuditSink};
use querygpt::catalog::SchemaCatalog;
use querygpt::error::{QueryGptError, Result};
use querygpt::llm::{Generation, TextGenerator};
use querygpt::pipeline::Pipeline;
use querygpt::prompts::Prompt;
use querygpt::schema_rag::{Embedder, Embedding, ExampleRetriever, InMemoryVectorStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const DIM: usize = 4;

/// Answers prompts by name and remembers every rendered prompt.
#[derive(Default)]
pub struct ScriptedGenerator {
    answers: HashMap<&'static str, std::result::Result<Generation, String>>,
    pub seen: Mutex<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, prompt: &'static str, text: &str) -> Self {
        self.answers.insert(prompt, Ok(Generation::text(text)));
        self
    }

    pub fn structured(mut self, prompt: &'static str, value: Value) -> Self {
        let map = value.as_object().cloned().unwrap_or_default();
        self.answers.insert(prompt, Ok(Generation::Structured(map)));
        self
    }

    pub fn failing(mut self, prompt: &'static str, message: &str) -> Self {
        self.answers.insert(prompt, Err(message.to_string()));
        self
    }

    /// Rendered text of the last prompt with this name.
    pub fn rendered(&self, prompt: &str) -> Option<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(name, _)| name == prompt)
            .map(|(_, text)| text.clone())
    }

    pub fn calls(&self, prompt: &str) -> usize {
        self.seen.lock().unwrap().iter().filter(|(name, _)| name == prompt).count()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation> {
        self.seen
            .lock()
            .unwrap()
            .push((prompt.name.to_string(), prompt.render()));
        match self.answers.get(prompt.name) {
            Some(Ok(generation)) => Ok(generation.clone()),
            Some(Err(message)) => Err(QueryGptError::Llm(message.clone())),
            None => Err(QueryGptError::Llm(format!("no scripted answer for '{}'", prompt.name))),
        }
    }
}

/// Always returns the same vector.
pub struct FixedEmbedder(pub Embedding);

#[async_trait]
impl Embedder for FixedEmbedder {
    fn dimension(&self) -> usize {
        self.0.len()
    }

    async fn embed_text(&self, _text: &str) -> Result<Embedding> {
        Ok(self.0.clone())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed_text(&self, _text: &str) -> Result<Embedding> {
        Err(QueryGptError::Embedding("embedding service unavailable".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingAuditSink {
    pub records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn record(&self, _record: &AuditRecord) -> Result<()> {
        Err(QueryGptError::Database("audit table missing".to_string()))
    }
}

/// Index holding two indexed examples.
pub fn example_index() -> InMemoryVectorStore {
    let mut store = InMemoryVectorStore::new(DIM);
    store.add_document(
        "SELECT PO_NUM FROM PO_NORM_TABLE_DUMMY WHERE ORDERED_AMOUNT > 5000",
        vec![1.0, 0.0, 0.0, 0.0],
    );
    store.add_document("SELECT COUNT(*) FROM GRN_DATA_DUMMY", vec![0.0, 1.0, 0.0, 0.0]);
    store
}

pub fn retriever(embedder: Arc<dyn Embedder>) -> Arc<ExampleRetriever> {
    Arc::new(ExampleRetriever::new(embedder, Arc::new(example_index()), 3))
}

pub fn catalog() -> Arc<SchemaCatalog> {
    Arc::new(SchemaCatalog::builtin().unwrap())
}

pub fn pipeline_with(
    generator: Arc<ScriptedGenerator>,
    embedder: Arc<dyn Embedder>,
    audit: Arc<dyn AuditSink>,
) -> Pipeline {
    Pipeline::from_backends(catalog(), generator, retriever(embedder), audit)
}

/// Well-formed answers for every stage of "purchase orders over 10000".
pub fn happy_generator() -> ScriptedGenerator {
    ScriptedGenerator::new()
        .text(
            "intent",
            r#"Here is the analysis:
{"operation_type": "SELECT", "possible_tables": ["PO_NORM_TABLE_DUMMY"],
 "conditions": ["ORDERED_AMOUNT > 10000"], "aggregations": [],
 "intent_summary": "List purchase orders with an ordered amount above 10000"}"#,
        )
        .structured(
            "table_selection",
            serde_json::json!({
                "relevant_tables": ["PO_NORM_TABLE_DUMMY"],
                "justification": "Purchase order amounts live in the PO table"
            }),
        )
        .text(
            "column_selection",
            r#"{"columns": {"PO_NORM_TABLE_DUMMY": ["PO_NUM", "ORDERED_AMOUNT"]}, "justification": "ids and amounts"}"#,
        )
        .text(
            "sql_generation",
            "SELECT po.PO_NUM, po.ORDERED_AMOUNT FROM PO_NORM_TABLE_DUMMY po WHERE po.ORDERED_AMOUNT > 10000",
        )
        .text("explanation", "This lists every purchase order whose amount exceeds 10000.")
}
