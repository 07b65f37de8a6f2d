//! Postgres-backed audit log of generated queries

use crate::audit::{AuditRecord, AuditSink};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the audit table if it does not exist yet.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS query_audit_log (
                id UUID PRIMARY KEY,
                logged_at TIMESTAMPTZ NOT NULL,
                user_query TEXT NOT NULL,
                generated_sql TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO query_audit_log (id, logged_at, user_query, generated_sql)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.timestamp)
        .bind(&record.user_query)
        .bind(&record.generated_sql)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
