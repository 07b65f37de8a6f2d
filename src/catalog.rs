//! Schema catalog
//!
//! Static, read-only listing of the tables the pipeline may query. Loaded once
//! at startup and shared across requests.

use crate::error::{QueryGptError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use strsim::jaro_winkler;
use tracing::info;

const BUILTIN_CATALOG: &str = include_str!("../config/catalog.json");

/// Minimum Jaro-Winkler similarity for resolving a misspelled table name.
const TABLE_NAME_SIMILARITY: f64 = 0.92;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// `NAME (col TYPE, col TYPE, ...)`
    pub fn definition(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.data_type))
            .collect();
        format!("{} ({})", self.name, columns.join(", "))
    }

    pub fn has_column(&self, column: &str) -> bool {
        column == "*" || self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(column))
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    tables: Vec<TableSchema>,
}

#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    tables: Vec<TableSchema>,
    // upper-cased name -> position in `tables`
    by_name: HashMap<String, usize>,
}

impl SchemaCatalog {
    pub fn new(tables: Vec<TableSchema>) -> Result<Self> {
        if tables.is_empty() {
            return Err(QueryGptError::Catalog("Catalog contains no tables".to_string()));
        }

        let mut by_name = HashMap::new();
        for (idx, table) in tables.iter().enumerate() {
            if by_name.insert(table.name.to_uppercase(), idx).is_some() {
                return Err(QueryGptError::Catalog(format!(
                    "Duplicate table '{}' in catalog",
                    table.name
                )));
            }
        }

        Ok(Self { tables, by_name })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| QueryGptError::Catalog(format!("Failed to parse catalog: {}", e)))?;
        Self::new(file.tables)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QueryGptError::Catalog(format!("Failed to read catalog {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json(&content)?;
        info!("Loaded {} tables from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// The procurement catalog shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Table names in catalog order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// The first `n` tables, used as the table-selection fallback.
    pub fn first_tables(&self, n: usize) -> Vec<String> {
        self.tables.iter().take(n).map(|t| t.name.clone()).collect()
    }

    pub fn get_table(&self, name: &str) -> Option<&TableSchema> {
        self.by_name
            .get(&name.trim().to_uppercase())
            .map(|&idx| &self.tables[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_table(name).is_some()
    }

    /// Column-definition string for a table, `NAME (col TYPE, ...)`.
    pub fn get_schema(&self, name: &str) -> Option<String> {
        self.get_table(name).map(TableSchema::definition)
    }

    /// Split table names into (valid, invalid). Valid names come back in
    /// catalog spelling; near-misses are resolved to the closest catalog table.
    pub fn validate_table_names(&self, tables: &[String]) -> (Vec<String>, Vec<String>) {
        let mut valid: Vec<String> = Vec::new();
        let mut invalid = Vec::new();

        for requested in tables {
            let resolved = match self.get_table(requested) {
                Some(table) => Some(table.name.clone()),
                None => self.closest_table(requested).map(|name| {
                    info!("Resolved table '{}' to catalog table '{}'", requested, name);
                    name
                }),
            };

            match resolved {
                Some(name) => {
                    if !valid.contains(&name) {
                        valid.push(name);
                    }
                }
                None => invalid.push(requested.clone()),
            }
        }

        (valid, invalid)
    }

    /// `table.column` pairs that do not exist in the catalog. `*` always exists.
    pub fn unknown_columns(&self, columns: &BTreeMap<String, Vec<String>>) -> Vec<String> {
        let mut unknown = Vec::new();
        for (table, cols) in columns {
            match self.get_table(table) {
                Some(schema) => unknown.extend(
                    cols.iter()
                        .filter(|c| !schema.has_column(c))
                        .map(|c| format!("{}.{}", table, c)),
                ),
                None => unknown.extend(cols.iter().map(|c| format!("{}.{}", table, c))),
            }
        }
        unknown
    }

    fn closest_table(&self, requested: &str) -> Option<String> {
        let needle = requested.trim().to_uppercase();
        self.tables
            .iter()
            .map(|t| (jaro_winkler(&needle, &t.name.to_uppercase()), &t.name))
            .filter(|(score, _)| *score >= TABLE_NAME_SIMILARITY)
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, name)| name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::builtin().unwrap()
    }

    #[test]
    fn test_builtin_catalog_order() {
        let catalog = catalog();
        assert_eq!(
            catalog.first_tables(2),
            vec!["PO_NORM_TABLE_DUMMY".to_string(), "PR_DATA_DUMMY".to_string()]
        );
        assert_eq!(catalog.table_names().len(), catalog.len());
    }

    #[test]
    fn test_schema_string_splits_at_first_paren() {
        let schema = catalog().get_schema("po_norm_table_dummy").unwrap();
        assert!(schema.starts_with("PO_NORM_TABLE_DUMMY ("));
        assert!(schema.contains("ORDERED_AMOUNT NUMBER"));
        assert_eq!(schema.split('(').next().unwrap().trim(), "PO_NORM_TABLE_DUMMY");
    }

    #[test]
    fn test_validate_table_names() {
        let catalog = catalog();
        let (valid, invalid) = catalog.validate_table_names(&[
            "pr_data_dummy".to_string(),
            "PO_NORM_TABLE".to_string(),
            "CUSTOMERS".to_string(),
        ]);
        assert_eq!(valid, vec!["PR_DATA_DUMMY".to_string(), "PO_NORM_TABLE_DUMMY".to_string()]);
        assert_eq!(invalid, vec!["CUSTOMERS".to_string()]);
    }

    #[test]
    fn test_unknown_columns() {
        let mut columns = BTreeMap::new();
        columns.insert(
            "PO_NORM_TABLE_DUMMY".to_string(),
            vec!["PO_NUM".to_string(), "NOT_A_COLUMN".to_string()],
        );
        columns.insert("GRN_DATA_DUMMY".to_string(), vec!["*".to_string()]);
        assert_eq!(
            catalog().unknown_columns(&columns),
            vec!["PO_NORM_TABLE_DUMMY.NOT_A_COLUMN".to_string()]
        );
    }

    #[test]
    fn test_rejects_empty_and_duplicate_catalogs() {
        assert!(SchemaCatalog::from_json(r#"{"tables": []}"#).is_err());
        let dup = r#"{"tables": [
            {"name": "A", "columns": []},
            {"name": "a", "columns": []}
        ]}"#;
        assert!(SchemaCatalog::from_json(dup).is_err());
    }
}
