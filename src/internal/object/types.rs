//! Object type enumeration shared by the store and hash layers.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// The three object kinds the store persists. Unlike a git loose object
/// store this one never needs delta/tag objects: a tree's only consumer
/// is a commit, and there is no separate annotated-tag concept here.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
        }
    }

    pub fn from_str(s: &str) -> Option<ObjectType> {
        match s {
            "commit" => Some(ObjectType::Commit),
            "tree" => Some(ObjectType::Tree),
            "blob" => Some(ObjectType::Blob),
            _ => None,
        }
    }
}

impl Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for ty in [ObjectType::Commit, ObjectType::Tree, ObjectType::Blob] {
            assert_eq!(ObjectType::from_str(ty.as_str()), Some(ty));
        }
    }

    #[test]
    fn from_str_rejects_unknown() {
        assert_eq!(ObjectType::from_str("tag"), None);
    }
}
