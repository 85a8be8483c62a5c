//! The single mutable ref each repository owns: a file holding the hex id
//! of the tip commit, updated by compare-and-swap (write a temp file,
//! verify the previous contents, rename over).

use std::fs;
use std::path::Path;

use crate::errors::CoreError;
use crate::hash::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefCasOutcome {
    Ok,
    Mismatch { actual: Option<ObjectId> },
}

pub fn read_head(ref_path: &Path) -> Result<Option<ObjectId>, CoreError> {
    match fs::read_to_string(ref_path) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.parse()?))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CoreError::Io(e)),
    }
}

/// Writes `new` as the ref's value iff its current value equals
/// `expected_old`. The caller is responsible for excluding concurrent
/// writers to the same ref from other threads (see `ObjectStore::head_lock`);
/// this function only protects against the value having drifted since it
/// was last observed.
pub fn cas(
    ref_path: &Path,
    expected_old: Option<ObjectId>,
    new: ObjectId,
) -> Result<RefCasOutcome, CoreError> {
    let current = read_head(ref_path)?;
    if current != expected_old {
        return Ok(RefCasOutcome::Mismatch { actual: current });
    }
    let tmp = ref_path.with_extension("tmp");
    fs::write(&tmp, new.to_string())?;
    fs::rename(&tmp, ref_path)?;
    Ok(RefCasOutcome::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn cas_succeeds_when_expected_matches() {
        let dir = tempdir().unwrap();
        let ref_path = dir.path().join("HEAD");
        let id = ObjectId::of(b"commit-1");
        let outcome = cas(&ref_path, None, id).unwrap();
        assert_eq!(outcome, RefCasOutcome::Ok);
        assert_eq!(read_head(&ref_path).unwrap(), Some(id));
    }

    #[test]
    fn cas_reports_mismatch() {
        let dir = tempdir().unwrap();
        let ref_path = dir.path().join("HEAD");
        let first = ObjectId::of(b"commit-1");
        cas(&ref_path, None, first).unwrap();

        let second = ObjectId::of(b"commit-2");
        let outcome = cas(&ref_path, None, second).unwrap();
        assert_eq!(
            outcome,
            RefCasOutcome::Mismatch {
                actual: Some(first)
            }
        );
        assert_eq!(read_head(&ref_path).unwrap(), Some(first));
    }
}
