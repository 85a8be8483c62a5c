//! Tree objects: a directory snapshot, one level deep. A full path's
//! content is reached by walking trees segment by segment from a commit's
//! root tree, exactly as in a git tree/subtree chain.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::hash::ObjectId;
use crate::internal::object::types::ObjectType;
use crate::internal::object::ObjectTrait;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeEntryKind {
    Blob,
    Tree,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub kind: TreeEntryKind,
    pub id: ObjectId,
}

/// A directory's immediate children, always stored name-sorted so two
/// trees with the same contents hash identically regardless of the order
/// changes were applied in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(mut entries: Vec<TreeEntry>) -> Tree {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Tree { entries }
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// Returns a copy of this tree with `entry` inserted or replacing the
    /// existing entry of the same name, keeping the sort invariant.
    pub fn with_entry(&self, entry: TreeEntry) -> Tree {
        let mut entries: Vec<TreeEntry> = self
            .entries
            .iter()
            .filter(|e| e.name != entry.name)
            .cloned()
            .collect();
        entries.push(entry);
        Tree::new(entries)
    }

    /// Returns a copy of this tree with `name` removed, if present.
    pub fn without_entry(&self, name: &str) -> Tree {
        let entries: Vec<TreeEntry> = self
            .entries
            .iter()
            .filter(|e| e.name != name)
            .cloned()
            .collect();
        Tree::new(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{:?} {} {}", entry.kind, entry.id, entry.name)?;
        }
        Ok(())
    }
}

impl ObjectTrait for Tree {
    fn from_bytes(data: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(data)
            .map_err(|e| CoreError::Internal(format!("corrupt tree object: {e}")))
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn to_data(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::Internal(format!("encode tree: {e}")))
    }
}
