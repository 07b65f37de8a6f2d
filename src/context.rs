//! Process-wide shared state
//!
//! Everything a request needs, built once at startup and shared through `Arc`.

use crate::agents::{ColumnAgent, IntentAgent, TableAgent};
use crate::audit::{AuditSink, JsonlAuditSink, LogAuditSink};
use crate::catalog::SchemaCatalog;
use crate::config::{AppConfig, AuditSinkKind};
use crate::db::{init_pool, DbPool, PgAuditSink};
use crate::error::{QueryGptError, Result};
use crate::llm::{OfflineGenerator, OpenAiClient, TextGenerator};
use crate::pipeline::Pipeline;
use crate::synthesis::QueryGenerator;
use crate::schema_rag::{
    build_example_index, load_examples, Embedder, ExampleRetriever, InMemoryVectorStore, OfflineEmbedder,
    OpenAiEmbedder,
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct AppContext {
    pub config: AppConfig,
    pub catalog: Arc<SchemaCatalog>,
    pub pipeline: Arc<Pipeline>,
    pub pool: Option<DbPool>,
}

impl AppContext {
    pub fn new(config: AppConfig, catalog: Arc<SchemaCatalog>, pipeline: Arc<Pipeline>, pool: Option<DbPool>) -> Self {
        Self {
            config,
            catalog,
            pipeline,
            pool,
        }
    }

    pub async fn build(config: AppConfig) -> Result<Self> {
        let catalog = Arc::new(match &config.catalog_path {
            Some(path) => SchemaCatalog::load(path)?,
            None => SchemaCatalog::builtin()?,
        });
        info!("Loaded schema catalog with {} tables", catalog.len());

        let (generator, embedder): (Arc<dyn TextGenerator>, Arc<dyn Embedder>) = if config.is_offline() {
            warn!("OpenAI API key not configured, using offline generator and embedder");
            (
                Arc::new(OfflineGenerator),
                Arc::new(OfflineEmbedder::new(config.embedding_dimension)),
            )
        } else {
            let api_key = config.api_key.clone().unwrap_or_default();
            (
                Arc::new(OpenAiClient::new(
                    api_key.clone(),
                    config.model.clone(),
                    config.base_url.clone(),
                    config.llm_timeout,
                )?),
                Arc::new(OpenAiEmbedder::new(
                    api_key,
                    config.base_url.clone(),
                    config.embedding_model.clone(),
                    config.embedding_dimension,
                    config.llm_timeout,
                )?),
            )
        };
        info!("Using '{}' generation backend", generator.name());

        let index = match &config.sql_examples_path {
            Some(path) => {
                let examples = load_examples(path)?;
                build_example_index(embedder.as_ref(), &examples).await
            }
            None => {
                info!("SQL_EXAMPLES_PATH not set, example retrieval will use static examples");
                InMemoryVectorStore::new(embedder.dimension())
            }
        };
        let retriever = Arc::new(ExampleRetriever::new(
            embedder,
            Arc::new(index),
            config.examples_top_k,
        ));

        let intent_agent = IntentAgent::new(generator.clone(), retriever.clone());
        let table_agent = TableAgent::new(generator.clone(), catalog.clone());
        let column_agent = ColumnAgent::new(generator.clone(), catalog.clone());
        let query_generator = QueryGenerator::new(generator);

        let pool = match &config.database_url {
            Some(url) => Some(init_pool(url, config.db_max_connections).await?),
            None => {
                info!("DATABASE_URL not set, query execution disabled");
                None
            }
        };

        let audit: Arc<dyn AuditSink> = match config.audit_sink {
            AuditSinkKind::Log => Arc::new(LogAuditSink),
            AuditSinkKind::Jsonl => Arc::new(JsonlAuditSink::new(config.audit_log_path.clone())),
            AuditSinkKind::Postgres => {
                let pool = pool.clone().ok_or_else(|| {
                    QueryGptError::Config("AUDIT_SINK=postgres requires DATABASE_URL".to_string())
                })?;
                let sink = PgAuditSink::new(pool);
                sink.ensure_table().await?;
                Arc::new(sink)
            }
        };

        let pipeline = Pipeline::new(
            catalog.clone(),
            intent_agent,
            table_agent,
            column_agent,
            retriever,
            query_generator,
            audit,
        )
        .with_failure_policy(config.stage_failure_policy);

        Ok(Self::new(config, catalog, Arc::new(pipeline), pool))
    }
}
