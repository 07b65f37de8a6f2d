//! Ad-hoc statement execution
//!
//! Runs one statement on one pooled connection and turns the rows into JSON
//! objects. The connection goes back to the pool when it is dropped, so every
//! exit path releases it.

use crate::error::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgPool, PgRow, PgValueRef};
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};
use tracing::debug;

/// One result row, column name -> value.
pub type QueryRow = Map<String, Value>;

pub async fn execute_query(pool: &PgPool, sql: &str) -> Result<Vec<QueryRow>> {
    let mut conn = pool.acquire().await?;

    // Simple query protocol: every value arrives in text format
    let rows = conn.fetch_all(sqlx::raw_sql(sql)).await?;
    debug!("Statement returned {} rows", rows.len());

    rows.iter().map(row_to_json).collect()
}

fn row_to_json(row: &PgRow) -> Result<QueryRow> {
    let mut out = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.type_info().name())?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Result<Value> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let value = match type_name {
        "BOOL" => Value::Bool(row.try_get::<bool, _>(idx)?),
        "INT2" => Value::from(row.try_get::<i16, _>(idx)?),
        "INT4" => Value::from(row.try_get::<i32, _>(idx)?),
        "INT8" => Value::from(row.try_get::<i64, _>(idx)?),
        "FLOAT4" => float_value(row.try_get::<f32, _>(idx)? as f64),
        "FLOAT8" => float_value(row.try_get::<f64, _>(idx)?),
        "NUMERIC" => text_of(raw).map(|s| numeric_value(&s)).unwrap_or(Value::Null),
        "DATE" => Value::String(format_date(row.try_get::<NaiveDate, _>(idx)?)),
        "TIME" => Value::String(format_time(row.try_get::<NaiveTime, _>(idx)?)),
        "TIMESTAMP" => Value::String(format_timestamp(row.try_get::<NaiveDateTime, _>(idx)?)),
        "TIMESTAMPTZ" => Value::String(row.try_get::<DateTime<Utc>, _>(idx)?.to_rfc3339()),
        "UUID" => Value::String(row.try_get::<uuid::Uuid, _>(idx)?.to_string()),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx)?,
        _ => text_of(raw).map(Value::String).unwrap_or(Value::Null),
    };

    Ok(value)
}

fn text_of(raw: PgValueRef<'_>) -> Option<String> {
    raw.as_str().ok().map(str::to_string)
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// NUMERIC text as a JSON number when it fits, otherwise the exact text.
fn numeric_value(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => float_value(f),
        _ => Value::String(text.to_string()),
    }
}

fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M:%S%.f").to_string()
}

fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}
