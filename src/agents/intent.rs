use crate::agents::null_as_default;
use crate::error::Result;
use crate::llm::{Generation, TextGenerator};
use crate::prompts::{self, numbered_examples, Prompt};
use crate::schema_rag::ExampleRetriever;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the user is asking for. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub operation_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub possible_tables: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditions: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub aggregations: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub intent_summary: String,
}

impl IntentResult {
    /// SELECT with no hints, summarised by the raw question.
    pub fn fallback(user_query: &str) -> Self {
        Self {
            operation_type: "SELECT".to_string(),
            possible_tables: Vec::new(),
            conditions: Vec::new(),
            aggregations: Vec::new(),
            intent_summary: user_query.to_string(),
        }
    }

    /// Operation type, defaulting to SELECT when the model left it out.
    pub fn operation(&self) -> &str {
        let op = self.operation_type.trim();
        if op.is_empty() {
            "SELECT"
        } else {
            op
        }
    }
}

pub struct IntentAgent {
    generator: Arc<dyn TextGenerator>,
    retriever: Arc<ExampleRetriever>,
}

impl IntentAgent {
    pub fn new(generator: Arc<dyn TextGenerator>, retriever: Arc<ExampleRetriever>) -> Self {
        Self { generator, retriever }
    }

    pub fn build_prompt(user_query: &str, examples: &[String]) -> Prompt {
        Prompt::new("intent", prompts::INTENT)
            .var("query", user_query)
            .var("sql_examples", numbered_examples(examples))
    }

    /// Retrieve similar examples, then ask the model for the query intent.
    pub async fn analyze_intent(&self, user_query: &str) -> Result<Generation> {
        let examples = self.retriever.retrieve(user_query).await;
        let prompt = Self::build_prompt(user_query, &examples);
        self.generator.generate(&prompt).await
    }
}
