//! Content-addressed object store: durable persistence for blobs, trees,
//! and commits, plus the single mutable ref each repository owns. Mirrors a
//! git loose-object layout (`objects/<2-hex>/<62-hex>`, zlib-compressed
//! bodies) without any git plumbing or interop requirement.

pub mod refs;

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::errors::CoreError;
use crate::hash::ObjectId;
use crate::internal::object::blob::Blob;
use crate::internal::object::commit::Commit;
use crate::internal::object::tree::{Tree, TreeEntryKind};
use crate::internal::object::ObjectTrait;
use crate::internal::store::refs::RefCasOutcome;

/// One repository's bare object store, rooted at
/// `<dataDir>/<project>/<repo>`.
pub struct ObjectStore {
    root: PathBuf,
    head_lock: Mutex<()>,
}

impl ObjectStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<ObjectStore, CoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        Ok(ObjectStore {
            root,
            head_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_string();
        self.objects_dir().join(&hex[..2]).join(&hex[2..])
    }

    fn ref_path(&self) -> PathBuf {
        self.root.join("HEAD")
    }

    pub fn read_head(&self) -> Result<Option<ObjectId>, CoreError> {
        refs::read_head(&self.ref_path())
    }

    /// Compare-and-swap the repository head. In-process callers are
    /// serialized by `head_lock`; the underlying rename still protects
    /// against any out-of-process writer racing the same ref file.
    pub fn ref_cas(
        &self,
        expected_old: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<RefCasOutcome, CoreError> {
        let _guard = self.head_lock.lock().unwrap();
        refs::cas(&self.ref_path(), expected_old, new)
    }

    pub fn has_object(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    fn put_object<T: ObjectTrait>(&self, object: &T) -> Result<ObjectId, CoreError> {
        let id = object.object_id()?;
        let path = self.object_path(&id);
        if path.is_file() {
            return Ok(id);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = object.to_data()?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&data)?;
        let compressed = encoder.finish()?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, compressed)?;
        fs::rename(&tmp, &path)?;
        Ok(id)
    }

    fn read_object<T: ObjectTrait>(&self, id: &ObjectId) -> Result<T, CoreError> {
        let path = self.object_path(id);
        let compressed = fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::not_found(format!("object {id}")),
            _ => CoreError::Io(e),
        })?;
        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut data = Vec::new();
        decoder.read_to_end(&mut data)?;
        T::from_bytes(&data)
    }

    pub fn put_blob(&self, data: Vec<u8>) -> Result<ObjectId, CoreError> {
        self.put_object(&Blob::new(data))
    }

    pub fn read_blob(&self, id: &ObjectId) -> Result<Blob, CoreError> {
        self.read_object(id)
    }

    pub fn put_tree(&self, tree: &Tree) -> Result<ObjectId, CoreError> {
        self.put_object(tree)
    }

    pub fn read_tree(&self, id: &ObjectId) -> Result<Tree, CoreError> {
        self.read_object(id)
    }

    pub fn put_commit(&self, commit: &Commit) -> Result<ObjectId, CoreError> {
        self.put_object(commit)
    }

    pub fn read_commit(&self, id: &ObjectId) -> Result<Commit, CoreError> {
        self.read_object(id)
    }

    /// Walks the parent chain from `start` down to (but excluding) `stop`,
    /// newest first, collecting at most `max` commits.
    pub fn walk_history(
        &self,
        start: ObjectId,
        stop: Option<ObjectId>,
        max: usize,
    ) -> Result<Vec<(ObjectId, Commit)>, CoreError> {
        let mut out = Vec::new();
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            if Some(id) == stop || out.len() >= max {
                break;
            }
            let commit = self.read_commit(&id)?;
            cursor = commit.parent_commit_id;
            out.push((id, commit));
        }
        Ok(out)
    }

    /// Mark-and-sweep garbage collection: walks every commit reachable from
    /// head (the whole history, so past revisions stay queryable), marks
    /// each commit's tree and blob/subtree closure, then removes any
    /// loose object not marked. Returns the number of objects removed.
    pub fn gc(&self) -> Result<usize, CoreError> {
        let mut reachable: HashSet<ObjectId> = HashSet::new();
        if let Some(head) = self.read_head()? {
            let mut cursor = Some(head);
            while let Some(id) = cursor {
                if !reachable.insert(id) {
                    break;
                }
                let commit = self.read_commit(&id)?;
                self.mark_tree(commit.tree_id, &mut reachable)?;
                cursor = commit.parent_commit_id;
            }
        }

        let mut removed = 0;
        for shard_entry in fs::read_dir(self.objects_dir())? {
            let shard_entry = shard_entry?;
            if !shard_entry.file_type()?.is_dir() {
                continue;
            }
            let shard = shard_entry.file_name().to_string_lossy().to_string();
            for object_entry in fs::read_dir(shard_entry.path())? {
                let object_entry = object_entry?;
                let rest = object_entry.file_name().to_string_lossy().to_string();
                let hex = format!("{shard}{rest}");
                let Ok(id) = hex.parse::<ObjectId>() else {
                    continue;
                };
                if !reachable.contains(&id) {
                    fs::remove_file(object_entry.path())?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn mark_tree(&self, tree_id: ObjectId, reachable: &mut HashSet<ObjectId>) -> Result<(), CoreError> {
        if !reachable.insert(tree_id) {
            return Ok(());
        }
        let tree = self.read_tree(&tree_id)?;
        for entry in tree.entries {
            match entry.kind {
                TreeEntryKind::Blob => {
                    reachable.insert(entry.id);
                }
                TreeEntryKind::Tree => self.mark_tree(entry.id, reachable)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::object::commit::Markup;
    use crate::internal::object::tree::TreeEntry;
    use tempfile::tempdir;

    #[test]
    fn put_and_read_blob_round_trips() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).unwrap();
        let id = store.put_blob(b"hello".to_vec()).unwrap();
        let blob = store.read_blob(&id).unwrap();
        assert_eq!(blob.data, b"hello");
    }

    #[test]
    fn put_blob_is_idempotent_by_content() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).unwrap();
        let a = store.put_blob(b"same".to_vec()).unwrap();
        let b = store.put_blob(b"same".to_vec()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ref_cas_detects_mismatch() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).unwrap();
        let first = ObjectId::of(b"c1");
        assert_eq!(store.ref_cas(None, first).unwrap(), RefCasOutcome::Ok);

        let second = ObjectId::of(b"c2");
        let outcome = store.ref_cas(None, second).unwrap();
        assert_eq!(
            outcome,
            RefCasOutcome::Mismatch {
                actual: Some(first)
            }
        );
    }

    fn make_commit(store: &ObjectStore, revision: i64, parent: Option<ObjectId>, path: &str) -> (ObjectId, Commit) {
        let blob_id = store.put_blob(path.as_bytes().to_vec()).unwrap();
        let tree = Tree::new(vec![TreeEntry {
            name: path.trim_start_matches('/').to_string(),
            kind: TreeEntryKind::Blob,
            id: blob_id,
        }]);
        let tree_id = store.put_tree(&tree).unwrap();
        let commit = Commit {
            tree_id,
            parent_commit_id: parent,
            revision,
            author: "test".to_string(),
            timestamp_ms: revision,
            summary: format!("commit {revision}"),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes: vec![],
        };
        let id = store.put_commit(&commit).unwrap();
        (id, commit)
    }

    #[test]
    fn walk_history_follows_parent_chain() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).unwrap();
        let (c1, _) = make_commit(&store, 1, None, "/a.json");
        let (c2, _) = make_commit(&store, 2, Some(c1), "/b.json");
        let (c3, _) = make_commit(&store, 3, Some(c2), "/c.json");

        let history = store.walk_history(c3, None, 100).unwrap();
        let revisions: Vec<i64> = history.iter().map(|(_, c)| c.revision).collect();
        assert_eq!(revisions, vec![3, 2, 1]);
    }

    #[test]
    fn gc_keeps_reachable_history() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).unwrap();
        let (c1, _) = make_commit(&store, 1, None, "/a.json");
        let (c2, c2_obj) = make_commit(&store, 2, Some(c1), "/b.json");
        store.ref_cas(None, c2).unwrap();

        let removed = store.gc().unwrap();
        assert_eq!(removed, 0);
        assert!(store.read_commit(&c1).is_ok());
        assert!(store.read_tree(&c2_obj.tree_id).is_ok());
    }
}
