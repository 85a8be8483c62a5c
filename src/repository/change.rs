//! The materialized file/directory view the repository engine hands back
//! to callers. `Change` itself lives on the commit object (it is part of
//! what gets persisted); this module only adds the read-side `Entry`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crate::internal::object::commit::{Change, Markup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    Json,
    Yaml,
    Text,
    Directory,
}

impl EntryType {
    pub fn of_path(path: &str) -> Option<EntryType> {
        if path.ends_with(".json") {
            Some(EntryType::Json)
        } else if path.ends_with(".yml") || path.ends_with(".yaml") {
            Some(EntryType::Yaml)
        } else {
            Some(EntryType::Text)
        }
    }
}

/// YAML is transcoded to the equivalent JSON value model on read — the
/// engine treats it as JSON with different surface syntax, so a JSON path
/// query or merge works the same regardless of which file format an entry
/// was stored as.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryContent {
    Structured(Value),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub path: String,
    pub entry_type: EntryType,
    pub content: Option<EntryContent>,
}

impl Entry {
    pub fn directory(path: impl Into<String>) -> Entry {
        Entry {
            path: path.into(),
            entry_type: EntryType::Directory,
            content: None,
        }
    }
}
