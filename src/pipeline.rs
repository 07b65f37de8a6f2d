//! Question-to-SQL pipeline
//!
//! Runs the stages strictly in order: intent, table selection, column
//! selection, example retrieval, SQL synthesis, formatting, explanation and
//! audit. The first three stages substitute a valid-shaped fallback when their
//! output cannot be parsed, so the next stage can always run. Only SQL
//! synthesis is fatal.

use crate::agents::{ColumnAgent, ColumnSelection, IntentAgent, IntentResult, TableAgent, TableSelection};
use crate::audit::{AuditRecord, AuditSink};
use crate::catalog::SchemaCatalog;
use crate::config::StageFailurePolicy;
use crate::error::Result;
use crate::extract::extract_as;
use crate::llm::{Generation, TextGenerator};
use crate::schema_rag::ExampleRetriever;
use crate::sql_format::format_sql_query;
use crate::synthesis::QueryGenerator;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Returned in place of an explanation when that call fails.
pub const EXPLANATION_PLACEHOLDER: &str = "An explanation could not be generated for this query.";

pub const STAGE_INTENT: &str = "intent";
pub const STAGE_TABLES: &str = "table_selection";
pub const STAGE_COLUMNS: &str = "column_selection";

/// A stage result together with whether it is a fallback substitute.
/// `raw` is the model output as returned, when the backend answered.
#[derive(Debug, Clone, PartialEq)]
pub struct Staged<T> {
    pub value: T,
    pub fallback: bool,
    pub raw: Option<Value>,
}

impl<T> Staged<T> {
    pub fn parsed(value: T) -> Self {
        Self {
            value,
            fallback: false,
            raw: None,
        }
    }

    pub fn fallback(value: T) -> Self {
        Self {
            value,
            fallback: true,
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub sql: String,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<Value>,
}

/// Per-step wall-clock timings in milliseconds.
#[derive(Debug, Default)]
struct StepTimings(BTreeMap<&'static str, u64>);

impl StepTimings {
    fn start(&self, step: &'static str) -> Instant {
        info!("Pipeline step '{}' started", step);
        Instant::now()
    }

    fn record(&mut self, step: &'static str, started: Instant) {
        let elapsed = started.elapsed().as_millis() as u64;
        info!("Pipeline step '{}' took {} ms", step, elapsed);
        self.0.insert(step, elapsed);
    }
}

pub struct Pipeline {
    catalog: Arc<SchemaCatalog>,
    intent_agent: IntentAgent,
    table_agent: TableAgent,
    column_agent: ColumnAgent,
    retriever: Arc<ExampleRetriever>,
    query_generator: QueryGenerator,
    audit: Arc<dyn AuditSink>,
    policy: StageFailurePolicy,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        intent_agent: IntentAgent,
        table_agent: TableAgent,
        column_agent: ColumnAgent,
        retriever: Arc<ExampleRetriever>,
        query_generator: QueryGenerator,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            catalog,
            intent_agent,
            table_agent,
            column_agent,
            retriever,
            query_generator,
            audit,
            policy: StageFailurePolicy::Propagate,
        }
    }

    /// Wire every stage to the same generation backend.
    pub fn from_backends(
        catalog: Arc<SchemaCatalog>,
        generator: Arc<dyn TextGenerator>,
        retriever: Arc<ExampleRetriever>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self::new(
            catalog.clone(),
            IntentAgent::new(generator.clone(), retriever.clone()),
            TableAgent::new(generator.clone(), catalog.clone()),
            ColumnAgent::new(generator.clone(), catalog),
            retriever,
            QueryGenerator::new(generator),
            audit,
        )
    }

    pub fn with_failure_policy(mut self, policy: StageFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub async fn run(&self, user_query: &str, debug: bool) -> Result<PipelineOutput> {
        let total = Instant::now();
        let mut timings = StepTimings::default();
        info!("Generating SQL for query: {}", user_query);

        // INTENT
        let started = timings.start(STAGE_INTENT);
        let intent = self.resolve_stage(
            STAGE_INTENT,
            self.intent_agent.analyze_intent(user_query).await,
            || IntentResult::fallback(user_query),
        )?;
        timings.record(STAGE_INTENT, started);

        // TABLE_SELECT
        let started = timings.start(STAGE_TABLES);
        let mut tables = self.resolve_stage(
            STAGE_TABLES,
            self.table_agent.identify_tables(&intent.value).await,
            || TableSelection::fallback(&self.catalog),
        )?;
        let (valid, invalid_tables) = self.catalog.validate_table_names(&tables.value.relevant_tables);
        if !invalid_tables.is_empty() {
            warn!("Dropping tables not in the catalog: {:?}", invalid_tables);
        }
        if valid.is_empty() {
            warn!("No valid tables selected, using fallback tables");
            let raw = tables.raw.take();
            tables = Staged::fallback(TableSelection::fallback(&self.catalog));
            tables.raw = raw;
        } else {
            tables.value.relevant_tables = valid;
        }
        timings.record(STAGE_TABLES, started);

        // COLUMN_SELECT
        let started = timings.start(STAGE_COLUMNS);
        let columns = self.resolve_stage(
            STAGE_COLUMNS,
            self.column_agent.prune_columns(&intent.value, &tables.value).await,
            || ColumnSelection::fallback(&tables.value),
        )?;
        let unknown_columns = self.catalog.unknown_columns(&columns.value.columns);
        if !unknown_columns.is_empty() {
            warn!("Selected columns not found in the catalog: {:?}", unknown_columns);
        }
        timings.record(STAGE_COLUMNS, started);

        // RETRIEVE_EXAMPLES
        let started = timings.start("retrieve_examples");
        let examples = self.retriever.retrieve(user_query).await;
        timings.record("retrieve_examples", started);

        // SYNTHESIZE_SQL
        let started = timings.start("synthesize_sql");
        let prompt = QueryGenerator::build_sql_prompt(
            user_query,
            &intent.value,
            &tables.value,
            &columns.value,
            &examples,
        );
        let raw_sql = self.query_generator.generate_sql(&prompt).await.map_err(|e| {
            error!("SQL synthesis failed: {:?}", e);
            e
        })?;
        timings.record("synthesize_sql", started);

        // FORMAT_SQL
        let started = timings.start("format_sql");
        let sql = format_sql_query(&raw_sql);
        timings.record("format_sql", started);

        // EXPLAIN
        let started = timings.start("explain");
        let explanation = match self.query_generator.generate_explanation(user_query, &sql).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Explanation generation failed: {}", e);
                EXPLANATION_PLACEHOLDER.to_string()
            }
        };
        timings.record("explain", started);

        // AUDIT
        let started = timings.start("audit");
        if let Err(e) = self.audit.record(&AuditRecord::new(user_query, &sql)).await {
            warn!("Failed to write audit record: {}", e);
        }
        timings.record("audit", started);

        info!("SQL generated in {} ms", total.elapsed().as_millis());

        let debug_info = if debug {
            let fallbacks: Vec<&str> = [
                (STAGE_INTENT, intent.fallback),
                (STAGE_TABLES, tables.fallback),
                (STAGE_COLUMNS, columns.fallback),
            ]
            .iter()
            .filter(|(_, used)| *used)
            .map(|(stage, _)| *stage)
            .collect();

            Some(json!({
                "intent_analysis": serde_json::to_value(&intent.value)?,
                "table_selection": serde_json::to_value(&tables.value)?,
                "column_selection": serde_json::to_value(&columns.value)?,
                "similar_sql": examples,
                "fallbacks": fallbacks,
                "invalid_tables": invalid_tables,
                "unknown_columns": unknown_columns,
                "raw_outputs": {
                    STAGE_INTENT: intent.raw,
                    STAGE_TABLES: tables.raw,
                    STAGE_COLUMNS: columns.raw,
                },
                "timings_ms": timings.0,
            }))
        } else {
            None
        };

        Ok(PipelineOutput {
            sql,
            explanation,
            debug_info,
        })
    }

    /// Parse a stage's output, substituting the fallback when it cannot be parsed.
    /// A backend error falls back only under [`StageFailurePolicy::Fallback`].
    fn resolve_stage<T, F>(&self, stage: &str, output: Result<Generation>, fallback: F) -> Result<Staged<T>>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        match output {
            Ok(generation) => {
                let staged = match extract_as::<T>(&generation) {
                    Some(value) => Staged::parsed(value),
                    None => {
                        warn!("Could not parse {} output, using fallback", stage);
                        Staged::fallback(fallback())
                    }
                };
                Ok(staged.with_raw(generation.to_value()))
            }
            Err(e) => match self.policy {
                StageFailurePolicy::Propagate => {
                    error!("Stage {} failed: {:?}", stage, e);
                    Err(e)
                }
                StageFailurePolicy::Fallback => {
                    warn!("Stage {} failed, using fallback: {}", stage, e);
                    Ok(Staged::fallback(fallback()))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::LogAuditSink;
    use crate::error::QueryGptError;
    use crate::prompts::Prompt;
    use crate::schema_rag::{InMemoryVectorStore, OfflineEmbedder};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Answers each prompt by name; unknown names are backend errors.
    struct Scripted(HashMap<&'static str, Generation>);

    #[async_trait]
    impl TextGenerator for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&self, prompt: &Prompt) -> Result<Generation> {
            self.0
                .get(prompt.name)
                .cloned()
                .ok_or_else(|| QueryGptError::Llm(format!("no answer for {}", prompt.name)))
        }
    }

    fn pipeline(answers: &[(&'static str, &str)]) -> Pipeline {
        let generator = Scripted(
            answers
                .iter()
                .map(|(name, text)| (*name, Generation::text(*text)))
                .collect(),
        );
        let retriever = ExampleRetriever::new(
            Arc::new(OfflineEmbedder::new(8)),
            Arc::new(InMemoryVectorStore::new(8)),
            3,
        );
        Pipeline::from_backends(
            Arc::new(SchemaCatalog::builtin().unwrap()),
            Arc::new(generator),
            Arc::new(retriever),
            Arc::new(LogAuditSink),
        )
    }

    #[test]
    fn test_resolve_stage_fallback_on_garbage() {
        let p = pipeline(&[]);
        let staged: Staged<TableSelection> = p
            .resolve_stage(STAGE_TABLES, Ok(Generation::text("not json")), TableSelection::default)
            .unwrap();
        assert!(staged.fallback);
        assert_eq!(staged.raw, Some(json!("not json")));
    }

    #[test]
    fn test_resolve_stage_backend_error_respects_policy() {
        let p = pipeline(&[]);
        let err = || Err(QueryGptError::Llm("down".to_string()));
        assert!(p
            .resolve_stage::<TableSelection, _>(STAGE_TABLES, err(), TableSelection::default)
            .is_err());

        let p = p.with_failure_policy(StageFailurePolicy::Fallback);
        let staged = p
            .resolve_stage::<TableSelection, _>(STAGE_TABLES, err(), TableSelection::default)
            .unwrap();
        assert!(staged.fallback);
        assert_eq!(staged.raw, None);
    }

    #[tokio::test]
    async fn test_invalid_tables_are_dropped() {
        let p = pipeline(&[
            ("intent", r#"{"operation_type": "SELECT", "intent_summary": "receipts"}"#),
            ("table_selection", r#"{"relevant_tables": ["GRN_DATA_DUMMY", "VENDORS"]}"#),
            ("column_selection", r#"{"columns": {"GRN_DATA_DUMMY": ["GRN_NUM", "BOGUS"]}}"#),
            ("sql_generation", "SELECT GRN_NUM FROM GRN_DATA_DUMMY"),
            ("explanation", "Lists receipts."),
        ]);

        let out = p.run("receipts", true).await.unwrap();
        let debug = out.debug_info.unwrap();
        assert_eq!(debug["table_selection"]["relevant_tables"], json!(["GRN_DATA_DUMMY"]));
        assert_eq!(debug["invalid_tables"], json!(["VENDORS"]));
        assert_eq!(debug["unknown_columns"], json!(["GRN_DATA_DUMMY.BOGUS"]));
        assert_eq!(debug["fallbacks"], json!([]));
        assert_eq!(
            debug["raw_outputs"]["table_selection"],
            json!(r#"{"relevant_tables": ["GRN_DATA_DUMMY", "VENDORS"]}"#)
        );
    }

    #[tokio::test]
    async fn test_no_valid_tables_uses_fallback() {
        let p = pipeline(&[
            ("intent", r#"{"intent_summary": "vendors"}"#),
            ("table_selection", r#"{"relevant_tables": ["VENDORS"]}"#),
            ("column_selection", "nope"),
            ("sql_generation", "SELECT * FROM PO_NORM_TABLE_DUMMY"),
            ("explanation", "All orders."),
        ]);

        let out = p.run("vendors", true).await.unwrap();
        let debug = out.debug_info.unwrap();
        let fallback_tables = p.catalog().first_tables(2);
        assert_eq!(debug["table_selection"]["relevant_tables"], json!(fallback_tables));
        assert_eq!(debug["fallbacks"], json!(["table_selection", "column_selection"]));
        for table in &fallback_tables {
            assert_eq!(debug["column_selection"]["columns"][table], json!(["*"]));
        }
        assert_eq!(debug["raw_outputs"]["table_selection"], json!(r#"{"relevant_tables": ["VENDORS"]}"#));
        assert_eq!(debug["raw_outputs"]["column_selection"], json!("nope"));
    }

    #[tokio::test]
    async fn test_timings_cover_every_step() {
        let p = pipeline(&[
            ("intent", r#"{"intent_summary": "orders"}"#),
            ("table_selection", r#"{"relevant_tables": ["PO_NORM_TABLE_DUMMY"]}"#),
            ("column_selection", r#"{"columns": {"PO_NORM_TABLE_DUMMY": ["PO_NUM"]}}"#),
            ("sql_generation", "SELECT PO_NUM FROM PO_NORM_TABLE_DUMMY"),
            ("explanation", "Order numbers."),
        ]);

        let debug = p.run("orders", true).await.unwrap().debug_info.unwrap();
        let steps: Vec<&str> = debug["timings_ms"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(
            steps,
            vec![
                "audit",
                "column_selection",
                "explain",
                "format_sql",
                "intent",
                "retrieve_examples",
                "synthesize_sql",
                "table_selection",
            ]
        );
    }
}
