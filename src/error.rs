use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryGptError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("SQL synthesis error: {0}")]
    Synthesis(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for QueryGptError {
    fn from(err: sqlx::Error) -> Self {
        QueryGptError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QueryGptError>;
