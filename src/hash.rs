//! Content address for objects in the store: blobs, trees, and commits are
//! all identified by the SHA-256 of their type-tagged, canonically
//! serialized bytes, mirroring a git loose object id but with a single,
//! fixed hash algorithm (the store never needs to interoperate with an
//! existing git history, so the teacher's pluggable SHA-1/SHA-256
//! selector is unneeded complexity here).

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::internal::object::types::ObjectType;

pub const OBJECT_ID_HEX_LEN: usize = 64;

/// A SHA-256 content hash identifying a blob, tree, or commit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    pub const ZERO: ObjectId = ObjectId([0u8; 32]);

    /// Hash raw bytes directly (no type header). Used for blob content.
    pub fn of(data: &[u8]) -> ObjectId {
        let digest = sha2::Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        ObjectId(bytes)
    }

    /// Hash an object's serialized body together with its type, the way a
    /// git loose object is named after `"<type> <len>\0<body>"`.
    pub fn of_typed(object_type: ObjectType, data: &[u8]) -> ObjectId {
        let mut framed = Vec::with_capacity(data.len() + 16);
        framed.extend_from_slice(object_type.as_str().as_bytes());
        framed.push(b' ');
        framed.extend_from_slice(data.len().to_string().as_bytes());
        framed.push(0);
        framed.extend_from_slice(data);
        ObjectId::of(&framed)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First byte as hex, used as the loose-object shard directory.
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "ObjectId({})", hex::encode(self.0))
    }
}

impl FromStr for ObjectId {
    type Err = crate::errors::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != OBJECT_ID_HEX_LEN {
            return Err(crate::errors::CoreError::InvalidRequest(format!(
                "`{s}` is not a valid object id (expected {OBJECT_ID_HEX_LEN} hex chars)"
            )));
        }
        let bytes = hex::decode(s)
            .map_err(|e| crate::errors::CoreError::InvalidRequest(format!("bad object id: {e}")))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(ObjectId(out))
    }
}
