use crate::agents::{join_or_none, null_as_default, IntentResult, FALLBACK_JUSTIFICATION};
use crate::catalog::SchemaCatalog;
use crate::error::Result;
use crate::llm::{Generation, TextGenerator};
use crate::prompts::{self, Prompt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Number of catalog tables used when table selection cannot be parsed.
pub const FALLBACK_TABLE_COUNT: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSelection {
    #[serde(default, deserialize_with = "null_as_default")]
    pub relevant_tables: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub justification: String,
}

impl TableSelection {
    /// The first catalog tables.
    pub fn fallback(catalog: &SchemaCatalog) -> Self {
        Self {
            relevant_tables: catalog.first_tables(FALLBACK_TABLE_COUNT),
            justification: FALLBACK_JUSTIFICATION.to_string(),
        }
    }
}

pub struct TableAgent {
    generator: Arc<dyn TextGenerator>,
    catalog: Arc<SchemaCatalog>,
}

impl TableAgent {
    pub fn new(generator: Arc<dyn TextGenerator>, catalog: Arc<SchemaCatalog>) -> Self {
        Self { generator, catalog }
    }

    /// `- NAME: <schema up to the first parenthesis>` for every catalog table.
    pub fn available_tables(catalog: &SchemaCatalog) -> String {
        catalog
            .tables()
            .iter()
            .map(|table| {
                let definition = table.definition();
                let label = definition.split('(').next().unwrap_or("").trim_end();
                format!("- {}: {}", table.name, label)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn build_prompt(catalog: &SchemaCatalog, intent: &IntentResult) -> Prompt {
        Prompt::new("table_selection", prompts::TABLE_SELECTION)
            .var("available_tables", Self::available_tables(catalog))
            .var("intent_summary", intent.intent_summary.clone())
            .var("possible_tables", join_or_none(&intent.possible_tables))
    }

    pub async fn identify_tables(&self, intent: &IntentResult) -> Result<Generation> {
        let prompt = Self::build_prompt(&self.catalog, intent);
        self.generator.generate(&prompt).await
    }
}
