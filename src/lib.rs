pub mod agents;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod schema_rag;
pub mod server;
pub mod sql_format;
pub mod synthesis;

pub use error::{QueryGptError, Result};
pub use pipeline::{Pipeline, PipelineOutput};
