//! Audit trail of generated queries
//!
//! One record per successful pipeline run. Sinks are append-only and write
//! failures never reach the caller.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub user_query: String,
    pub generated_sql: String,
}

impl AuditRecord {
    pub fn new(user_query: &str, generated_sql: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            user_query: user_query.to_string(),
            generated_sql: generated_sql.to_string(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// Emits each record as a structured log event.
#[derive(Debug, Clone, Default)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        let entry = serde_json::to_string(record)?;
        info!(target: "querygpt::audit", "{}", entry);
        Ok(())
    }
}

/// Appends one JSON object per line.
pub struct JsonlAuditSink {
    path: PathBuf,
    // serialises appends from concurrent requests
    lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
