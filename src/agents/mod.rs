//! Stage agents
//!
//! Each agent renders its prompt from typed upstream results, calls the
//! generation backend once and hands back the raw output. Parsing and
//! fallback handling belong to the pipeline.

pub mod column;
pub mod intent;
pub mod table;

pub use column::{ColumnAgent, ColumnSelection};
pub use intent::{IntentAgent, IntentResult};
pub use table::{TableAgent, TableSelection};

use serde::{Deserialize, Deserializer};

/// Justification attached to every fallback selection.
pub const FALLBACK_JUSTIFICATION: &str = "Fallback selection due to parsing error";

/// Text used in prompts for empty lists.
pub(crate) const NONE_MENTIONED: &str = "None specifically mentioned";

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        NONE_MENTIONED.to_string()
    } else {
        items.join(", ")
    }
}
