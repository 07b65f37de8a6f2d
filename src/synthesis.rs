//! Query synthesis
//!
//! Two independent generation calls: one writes the SQL from everything the
//! earlier stages produced, the other explains the formatted SQL.

use crate::agents::{ColumnSelection, IntentResult, TableSelection};
use crate::error::{QueryGptError, Result};
use crate::llm::{Generation, TextGenerator};
use crate::prompts::{self, numbered_examples, Prompt};
use itertools::Itertools;
use serde_json::Value;
use std::sync::Arc;

/// Field holding the text when a backend returns a structured result.
pub const TEXT_FIELD: &str = "text";

pub struct QueryGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl QueryGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// `TABLE (col1, col2)` per selected table, wildcard when no columns were chosen.
    pub fn table_listing(tables: &TableSelection, columns: &ColumnSelection) -> String {
        tables
            .relevant_tables
            .iter()
            .map(|table| format!("{} ({})", table, columns.columns_for(table).join(", ")))
            .join("\n")
    }

    /// Every selected column as `table.column`.
    pub fn qualified_columns(columns: &ColumnSelection) -> String {
        columns
            .columns
            .iter()
            .flat_map(|(table, cols)| cols.iter().map(move |col| format!("{}.{}", table, col)))
            .join("\n")
    }

    pub fn build_sql_prompt(
        user_query: &str,
        intent: &IntentResult,
        tables: &TableSelection,
        columns: &ColumnSelection,
        examples: &[String],
    ) -> Prompt {
        Prompt::new("sql_generation", prompts::SQL_GENERATION)
            .var("user_query", user_query)
            .var("operation_type", intent.operation().to_string())
            .var("intent_summary", intent.intent_summary.clone())
            .var("table_schemas", Self::table_listing(tables, columns))
            .var("selected_columns", Self::qualified_columns(columns))
            .var("sql_examples", numbered_examples(examples))
    }

    pub fn build_explanation_prompt(user_query: &str, sql_query: &str) -> Prompt {
        Prompt::new("explanation", prompts::EXPLANATION)
            .var("user_query", user_query)
            .var("sql_query", sql_query)
    }

    /// Raw (unformatted) SQL. Any failure here is fatal to the request.
    pub async fn generate_sql(&self, prompt: &Prompt) -> Result<String> {
        let output = self.generator.generate(prompt).await?;
        let sql = unwrap_text(output, "SQL query")?;
        if sql.trim().is_empty() {
            return Err(QueryGptError::Synthesis("Generated SQL query is empty".to_string()));
        }
        Ok(sql)
    }

    pub async fn generate_explanation(&self, user_query: &str, formatted_sql: &str) -> Result<String> {
        let prompt = Self::build_explanation_prompt(user_query, formatted_sql);
        let output = self.generator.generate(&prompt).await?;
        unwrap_text(output, "Explanation")
    }
}

/// Plain text passes through; a structured result must carry a non-empty
/// string under `text`.
pub fn unwrap_text(output: Generation, what: &str) -> Result<String> {
    match output {
        Generation::Text(text) => Ok(text),
        Generation::Structured(map) => match map.get(TEXT_FIELD) {
            None => Err(QueryGptError::Synthesis(format!(
                "{} not found in the response dictionary (missing field '{}')",
                what, TEXT_FIELD
            ))),
            Some(Value::String(text)) if text.is_empty() => Err(QueryGptError::Synthesis(format!(
                "{} not found in the response dictionary (field '{}' is empty)",
                what, TEXT_FIELD
            ))),
            Some(Value::String(text)) => Ok(text.clone()),
            Some(other) => Err(QueryGptError::Synthesis(format!(
                "Expected a string for {}, got {} instead",
                what.to_lowercase(),
                json_type_name(other)
            ))),
        },
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
