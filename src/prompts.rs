//! Prompt templates for every generation call in the pipeline.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` render as literal braces
//! so JSON examples can be written inline.

use std::collections::BTreeMap;

/// A template plus the variables to substitute into it.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub name: &'static str,
    template: &'static str,
    vars: BTreeMap<&'static str, String>,
}

impl Prompt {
    pub fn new(name: &'static str, template: &'static str) -> Self {
        Self {
            name,
            template,
            vars: BTreeMap::new(),
        }
    }

    pub fn var(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.vars.insert(key, value.into());
        self
    }

    /// Substitute variables. Unknown placeholders are left untouched.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template;

        while let Some(pos) = rest.find(|c| c == '{' || c == '}') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("{{") {
                out.push('{');
                rest = &tail[2..];
            } else if tail.starts_with("}}") {
                out.push('}');
                rest = &tail[2..];
            } else if tail.starts_with('{') {
                match tail[1..].find('}') {
                    Some(end) => {
                        let key = &tail[1..1 + end];
                        match self.vars.get(key) {
                            Some(value) => out.push_str(value),
                            None => out.push_str(&tail[..end + 2]),
                        }
                        rest = &tail[end + 2..];
                    }
                    None => {
                        out.push_str(tail);
                        rest = "";
                    }
                }
            } else {
                out.push('}');
                rest = &tail[1..];
            }
        }

        out.push_str(rest);
        out
    }
}

pub const INTENT: &str = r#"You are an agent tasked with understanding the intent of a natural language query
related to database operations. Based on the user's query, identify:

1. The likely operation type (SELECT, INSERT, UPDATE, DELETE, etc.)
2. The main entities/tables that might be involved
3. Any conditions or filters mentioned
4. Any aggregation or grouping operations requested

User Query: {query}

Similar SQL examples for reference:
{sql_examples}

Provide your analysis in JSON format:
{{
    "operation_type": "SELECT|INSERT|UPDATE|DELETE",
    "possible_tables": ["table1", "table2"],
    "conditions": ["condition1", "condition2"],
    "aggregations": ["aggregation1", "aggregation2"],
    "intent_summary": "Brief summary of what the user wants to do"
}}"#;

pub const TABLE_SELECTION: &str = r#"You are an agent tasked with identifying the most relevant tables for a SQL query based on a user's intent.

Available tables in the database:
{available_tables}

User's query intent: {intent_summary}
Possible tables mentioned in intent: {possible_tables}

Based on the intent and the available tables, determine which tables should be used in the SQL query.
Do not include tables that don't exist in the available tables list.

Return your answer in JSON format:
{{
    "relevant_tables": ["table1", "table2"],
    "justification": "Explanation of why these tables were selected"
}}"#;

pub const COLUMN_SELECTION: &str = r#"You are an agent tasked with selecting the most relevant columns for a SQL query based on the user's intent.

Table schemas:
{table_schemas}

User's query intent: {intent_summary}
Operation type: {operation_type}
Conditions mentioned in intent: {conditions}
Aggregations mentioned in intent: {aggregations}

For each table, determine which columns should be included in the SQL query.
Consider:
1. Columns needed in the SELECT clause
2. Columns needed for JOIN conditions (if multiple tables)
3. Columns needed for WHERE conditions
4. Columns needed for GROUP BY, ORDER BY, etc.

Return your answer in JSON format:
{{
    "columns": {{
        "table1": ["col1", "col2"],
        "table2": ["col1", "col3"]
    }},
    "justification": "Explanation of why these columns were selected"
}}"#;

pub const SQL_GENERATION: &str = r#"You are an expert SQL developer tasked with writing a SQL query based on a user's request.

User's natural language query: {user_query}

Intent analysis:
- Operation type: {operation_type}
- Intent summary: {intent_summary}

Tables to use:
{table_schemas}

Selected columns:
{selected_columns}

Similar SQL examples for reference:
{sql_examples}

Instructions:
1. Write a syntactically correct SQL query that addresses the user's request
2. Use only the tables and columns provided
3. Make sure to handle joins correctly if multiple tables are used
4. Add appropriate comments to explain complex parts of the query
5. Format the query with proper indentation for readability

Provide only the SQL query without any explanation:"#;

pub const EXPLANATION: &str = r#"You are an expert at explaining SQL queries to non-technical users.

User's natural language query: {user_query}

SQL query generated:
```sql
{sql_query}
```

Provide a clear, concise explanation of what this SQL query does in simple terms.
Break down each part of the query (SELECT, FROM, WHERE, etc.) and explain its purpose.
Avoid technical jargon when possible and focus on helping the user understand what data they will get from this query.

Your explanation:"#;

/// `Example 1: ...` lines, one per example.
pub fn numbered_examples(examples: &[String]) -> String {
    examples
        .iter()
        .enumerate()
        .map(|(i, sql)| format!("Example {}: {}", i + 1, sql))
        .collect::<Vec<_>>()
        .join("\n")
}
