//! Blob objects: the raw bytes of a single file at a point in history.
//! Content type (JSON/YAML/text) is a repository-engine concern layered on
//! top of these bytes, not part of the stored object.

use std::fmt::Display;

use crate::errors::CoreError;
use crate::internal::object::types::ObjectType;
use crate::internal::object::ObjectTrait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Blob {
        Blob { data }
    }
}

impl Display for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "blob ({} bytes)", self.data.len())
    }
}

impl ObjectTrait for Blob {
    fn from_bytes(data: &[u8]) -> Result<Self, CoreError> {
        Ok(Blob { data: data.to_vec() })
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::Blob
    }

    fn to_data(&self) -> Result<Vec<u8>, CoreError> {
        Ok(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bytes() {
        let blob = Blob::new(b"hello".to_vec());
        let data = blob.to_data().unwrap();
        let restored = Blob::from_bytes(&data).unwrap();
        assert_eq!(blob, restored);
    }
}
