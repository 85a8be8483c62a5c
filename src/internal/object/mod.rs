//! Object model for the content-addressed store: blobs, trees, and commits,
//! plus the [`ObjectTrait`] that lets the store layer create strongly typed
//! values from the raw bytes it reads off disk.

pub mod blob;
pub mod commit;
pub mod tree;
pub mod types;

use std::fmt::Display;

use crate::errors::CoreError;
use crate::hash::ObjectId;
use crate::internal::object::types::ObjectType;

/// Common interface for blob, tree, and commit objects.
pub trait ObjectTrait: Send + Sync + Display {
    /// Reconstructs a typed object from its stored (decompressed) bytes.
    fn from_bytes(data: &[u8]) -> Result<Self, CoreError>
    where
        Self: Sized;

    fn object_type(&self) -> ObjectType;

    /// Canonical serialized form that [`ObjectTrait::object_id`] hashes.
    fn to_data(&self) -> Result<Vec<u8>, CoreError>;

    /// Computes the object's content address from its serialized data.
    fn object_id(&self) -> Result<ObjectId, CoreError> {
        let data = self.to_data()?;
        Ok(ObjectId::of_typed(self.object_type(), &data))
    }
}
