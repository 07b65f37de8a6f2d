//! Process configuration
//!
//! Read once at startup from the environment (after `.env` is loaded by the
//! binary). Every value has a default except the credentials.

use crate::error::{QueryGptError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// API key value that forces the offline backends.
pub const DUMMY_API_KEY: &str = "dummy-api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditSinkKind {
    Log,
    Jsonl,
    Postgres,
}

impl FromStr for AuditSinkKind {
    type Err = QueryGptError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "log" => Ok(AuditSinkKind::Log),
            "jsonl" | "file" => Ok(AuditSinkKind::Jsonl),
            "postgres" | "pg" => Ok(AuditSinkKind::Postgres),
            other => Err(QueryGptError::Config(format!("Unknown audit sink '{}'", other))),
        }
    }
}

/// What the orchestrator does when the generation backend itself fails
/// (as opposed to returning unparsable output) during the intent, table or
/// column step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFailurePolicy {
    /// Backend failure fails the request.
    Propagate,
    /// Backend failure degrades to the same fallback as a parse failure.
    Fallback,
}

impl FromStr for StageFailurePolicy {
    type Err = QueryGptError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "propagate" => Ok(StageFailurePolicy::Propagate),
            "fallback" => Ok(StageFailurePolicy::Fallback),
            other => Err(QueryGptError::Config(format!(
                "Unknown stage failure policy '{}' (expected 'propagate' or 'fallback')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub llm_timeout: Duration,
    pub examples_top_k: usize,
    pub catalog_path: Option<PathBuf>,
    pub sql_examples_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub audit_sink: AuditSinkKind,
    pub audit_log_path: PathBuf,
    pub stage_failure_policy: StageFailurePolicy,
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            llm_timeout: Duration::from_secs(60),
            examples_top_k: 3,
            catalog_path: None,
            sql_examples_path: None,
            database_url: None,
            db_max_connections: 10,
            audit_sink: AuditSinkKind::Log,
            audit_log_path: PathBuf::from("query_logs.jsonl"),
            stage_failure_policy: StageFailurePolicy::Propagate,
            bind_addr: "0.0.0.0:9002".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            api_key: get("OPENAI_API_KEY"),
            model: get("OPENAI_MODEL").unwrap_or(defaults.model),
            base_url: get("OPENAI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            embedding_model: get("OPENAI_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_or(get("EMBEDDING_DIMENSION"), "EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            llm_timeout: Duration::from_secs(parse_or(get("LLM_TIMEOUT_SECS"), "LLM_TIMEOUT_SECS", 60u64)?),
            examples_top_k: parse_or(get("EXAMPLES_TOP_K"), "EXAMPLES_TOP_K", defaults.examples_top_k)?,
            catalog_path: get("CATALOG_PATH").map(PathBuf::from),
            sql_examples_path: get("SQL_EXAMPLES_PATH").map(PathBuf::from),
            database_url: get("DATABASE_URL"),
            db_max_connections: parse_or(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            audit_sink: get("AUDIT_SINK").map(|v| v.parse()).transpose()?.unwrap_or(defaults.audit_sink),
            audit_log_path: get("AUDIT_LOG_PATH").map(PathBuf::from).unwrap_or(defaults.audit_log_path),
            stage_failure_policy: get("STAGE_FAILURE_POLICY")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(defaults.stage_failure_policy),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }

    /// True when no usable API key is configured and the offline backends should be used.
    pub fn is_offline(&self) -> bool {
        match self.api_key.as_deref() {
            None => true,
            Some(key) => key == DUMMY_API_KEY,
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| QueryGptError::Config(format!("Invalid value for {}: '{}'", key, raw))),
    }
}
