use crate::agents::{join_or_none, null_as_default, IntentResult, TableSelection, FALLBACK_JUSTIFICATION};
use crate::catalog::SchemaCatalog;
use crate::error::Result;
use crate::llm::{Generation, TextGenerator};
use crate::prompts::{self, Prompt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Column marker meaning "every column of the table".
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSelection {
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub justification: String,
}

impl ColumnSelection {
    /// Every selected table mapped to the wildcard.
    pub fn fallback(tables: &TableSelection) -> Self {
        Self {
            columns: tables
                .relevant_tables
                .iter()
                .map(|t| (t.clone(), vec![WILDCARD.to_string()]))
                .collect(),
            justification: FALLBACK_JUSTIFICATION.to_string(),
        }
    }

    /// Columns chosen for a table, or the wildcard when the table has no entry.
    pub fn columns_for(&self, table: &str) -> Vec<String> {
        self.columns
            .iter()
            .find(|(name, cols)| name.eq_ignore_ascii_case(table) && !cols.is_empty())
            .map(|(_, cols)| cols.clone())
            .unwrap_or_else(|| vec![WILDCARD.to_string()])
    }
}

pub struct ColumnAgent {
    generator: Arc<dyn TextGenerator>,
    catalog: Arc<SchemaCatalog>,
}

impl ColumnAgent {
    pub fn new(generator: Arc<dyn TextGenerator>, catalog: Arc<SchemaCatalog>) -> Self {
        Self { generator, catalog }
    }

    /// Full schemas of the selected tables only.
    pub fn table_schemas(catalog: &SchemaCatalog, tables: &TableSelection) -> String {
        tables
            .relevant_tables
            .iter()
            .filter_map(|table| match catalog.get_schema(table) {
                Some(schema) => Some(format!("{}:\n{}", table, schema)),
                None => {
                    warn!("No schema for table '{}', leaving it out of the column prompt", table);
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn build_prompt(catalog: &SchemaCatalog, intent: &IntentResult, tables: &TableSelection) -> Prompt {
        Prompt::new("column_selection", prompts::COLUMN_SELECTION)
            .var("table_schemas", Self::table_schemas(catalog, tables))
            .var("intent_summary", intent.intent_summary.clone())
            .var("operation_type", intent.operation().to_string())
            .var("conditions", join_or_none(&intent.conditions))
            .var("aggregations", join_or_none(&intent.aggregations))
    }

    pub async fn prune_columns(&self, intent: &IntentResult, tables: &TableSelection) -> Result<Generation> {
        let prompt = Self::build_prompt(&self.catalog, intent, tables);
        self.generator.generate(&prompt).await
    }
}
