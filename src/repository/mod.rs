//! The repository engine: a single version-controlled tree of JSON/YAML/
//! text entries, exposed as `find`/`get`/`history`/`diff`/`preview_diff`/
//! `merge_files`/`commit` over an [`crate::internal::store::ObjectStore`].
//!
//! Revisions are plain increasing integers starting at 1; revision 0 is the
//! always-present empty tree before the first commit. A non-positive
//! revision argument is relative to the current head (`0` = head, `-1` =
//! one before head), matching how a caller usually means "as of now" or
//! "a few commits back" rather than an absolute number it has to look up
//! first.

pub mod change;
pub mod merge;
pub mod pattern;
pub mod query;

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::errors::CoreError;
use crate::hash::ObjectId;
use crate::internal::object::commit::{Commit, Markup};
use crate::internal::object::tree::{Tree, TreeEntry, TreeEntryKind};
use crate::internal::object::commit::Change;
use crate::internal::store::ObjectStore;
use crate::repository::change::{Entry, EntryContent, EntryType};
use crate::repository::query::Query;
use crate::utils::{path_segments, validate_path};

/// How many times `commit` retries its compare-and-swap before giving up
/// and reporting the repository as too contended.
const MAX_COMMIT_RETRIES: u32 = 8;

/// Path patterns a `meta` repository may be written to: credentials,
/// mirrors, member roles, and the repository's own metadata. A `meta`
/// repository's root directory is named `meta` (its reserved repository
/// name doubles as its on-disk directory name), which is how `commit`
/// tells it apart from an ordinary repository without threading a
/// separate flag through every caller.
const META_WRITABLE_PATTERNS: [&str; 4] =
    ["/credentials/**", "/mirrors/**", "/members.json", "/repository.json"];

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub revision: i64,
    pub author: String,
    pub timestamp_ms: i64,
    pub summary: String,
    pub detail: String,
    pub markup: Markup,
    pub changes: Vec<Change>,
}

impl From<Commit> for HistoryEntry {
    fn from(commit: Commit) -> HistoryEntry {
        HistoryEntry {
            revision: commit.revision,
            author: commit.author,
            timestamp_ms: commit.timestamp_ms,
            summary: commit.summary,
            detail: commit.detail,
            markup: commit.markup,
            changes: commit.changes,
        }
    }
}

pub struct Repository {
    store: ObjectStore,
    is_meta: bool,
}

impl Repository {
    pub fn open(root: impl AsRef<Path>) -> Result<Repository, CoreError> {
        let store = ObjectStore::open(root.as_ref())?;
        let is_meta = store.root().file_name().and_then(|n| n.to_str()) == Some("meta");
        Ok(Repository { store, is_meta })
    }

    /// Checks `changes` against `META_WRITABLE_PATTERNS` when this is a
    /// `meta` repository; a no-op for any other repository.
    fn check_meta_write_scope(&self, changes: &[Change]) -> Result<(), CoreError> {
        if !self.is_meta {
            return Ok(());
        }
        for change in changes {
            let paths = match change {
                Change::Rename { path, new_path } => vec![path.as_str(), new_path.as_str()],
                other => vec![other.path()],
            };
            for path in paths {
                if !META_WRITABLE_PATTERNS.iter().any(|pattern| pattern::matches(pattern, path)) {
                    return Err(CoreError::invalid(format!(
                        "`{path}` is not a documented `meta` file (credentials/*, mirrors/*, members.json, repository.json)"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn head_revision(&self) -> Result<i64, CoreError> {
        match self.store.read_head()? {
            None => Ok(0),
            Some(id) => Ok(self.store.read_commit(&id)?.revision),
        }
    }

    /// Creates the always-present revision-1 init commit if this
    /// repository has no commits yet; a no-op otherwise. `changes` lets a
    /// caller (the executor, for the `meta` repository) seed the init
    /// commit with an initial document instead of an empty tree.
    pub fn ensure_initialized(
        &self,
        author: String,
        timestamp_ms: i64,
        changes: Vec<Change>,
    ) -> Result<(), CoreError> {
        if self.store.read_head()?.is_some() {
            return Ok(());
        }
        self.check_meta_write_scope(&changes)?;
        let mut tree_id = self.store.put_tree(&Tree::new(Vec::new()))?;
        for change in &changes {
            tree_id = apply_change(&self.store, tree_id, change)?;
        }
        let commit = Commit {
            tree_id,
            parent_commit_id: None,
            revision: 1,
            author,
            timestamp_ms,
            summary: "init".to_string(),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes,
        };
        let commit_id = self.store.put_commit(&commit)?;
        match self.store.ref_cas(None, commit_id)? {
            crate::internal::store::refs::RefCasOutcome::Ok => Ok(()),
            // Lost the race to another writer initializing the same
            // repository; either outcome means head is now >= 1.
            crate::internal::store::refs::RefCasOutcome::Mismatch { .. } => Ok(()),
        }
    }

    /// Resolves a possibly-relative revision (`<= 0`, relative to head) to
    /// an absolute one, failing if it names a revision that doesn't exist.
    pub fn normalize(&self, revision: i64) -> Result<i64, CoreError> {
        let head_revision = self.head_revision()?;
        let abs = if revision <= 0 {
            head_revision + revision
        } else {
            revision
        };
        if abs < 0 || abs > head_revision {
            return Err(CoreError::not_found(format!("revision {revision}")));
        }
        Ok(abs)
    }

    fn commit_at(&self, abs_revision: i64) -> Result<(ObjectId, Commit), CoreError> {
        let head_id = self
            .store
            .read_head()?
            .ok_or_else(|| CoreError::not_found(format!("revision {abs_revision}")))?;
        let head_commit = self.store.read_commit(&head_id)?;
        let steps_back = (head_commit.revision - abs_revision) as usize;
        let history = self.store.walk_history(head_id, None, steps_back + 1)?;
        history
            .into_iter()
            .nth(steps_back)
            .ok_or_else(|| CoreError::not_found(format!("revision {abs_revision}")))
    }

    fn tree_at(&self, revision: i64) -> Result<ObjectId, CoreError> {
        let abs = self.normalize(revision)?;
        if abs == 0 {
            return self.store.put_tree(&Tree::new(Vec::new()));
        }
        Ok(self.commit_at(abs)?.1.tree_id)
    }

    /// Lists every entry under `path_pattern` as of `revision`.
    pub fn find(&self, revision: i64, path_pattern: &str) -> Result<BTreeMap<String, Entry>, CoreError> {
        let tree_id = self.tree_at(revision)?;
        let mut blobs = Vec::new();
        collect_blobs(&self.store, tree_id, "", &mut blobs)?;

        let mut out = BTreeMap::new();
        for (path, blob_id) in blobs {
            if !pattern::matches(path_pattern, &path) {
                continue;
            }
            let entry = self.read_entry_at(tree_id, &path, Some(blob_id))?;
            out.insert(path, entry);
        }
        Ok(out)
    }

    /// Fetches a single entry and, for a JSON-path query, evaluates it.
    pub fn get(&self, revision: i64, query: &Query) -> Result<Value, CoreError> {
        let tree_id = self.tree_at(revision)?;
        let entry = self.read_entry_at(tree_id, query.path(), None)?;
        let value = content_to_value(entry.content);
        match query {
            Query::Identity { .. } => Ok(value),
            Query::JsonPath { expressions, .. } => query::evaluate_first(&value, expressions),
        }
    }

    fn read_entry_at(&self, tree_id: ObjectId, path: &str, blob_id: Option<ObjectId>) -> Result<Entry, CoreError> {
        let segments = path_segments(path);
        let blob_id = match blob_id {
            Some(id) => id,
            None => get_blob_id(&self.store, tree_id, &segments)?
                .ok_or_else(|| CoreError::not_found(format!("`{path}`")))?,
        };
        let blob = self.store.read_blob(&blob_id)?;
        let entry_type = EntryType::of_path(path).unwrap_or(EntryType::Text);
        let content = parse_content(entry_type, &blob.data)?;
        Ok(Entry {
            path: path.to_string(),
            entry_type,
            content: Some(content),
        })
    }

    /// Revision history restricted to commits touching `path_pattern`,
    /// newest first, regardless of which of `from`/`to` is numerically
    /// larger, capped at `max` entries.
    pub fn history(
        &self,
        from: i64,
        to: i64,
        path_pattern: &str,
        max: usize,
    ) -> Result<Vec<HistoryEntry>, CoreError> {
        let from_abs = self.normalize(from)?;
        let to_abs = self.normalize(to)?;
        let (hi, lo) = if from_abs >= to_abs {
            (from_abs, to_abs)
        } else {
            (to_abs, from_abs)
        };
        if hi == 0 {
            return Ok(Vec::new());
        }
        let (start_id, _) = self.commit_at(hi)?;
        let stop_id = if lo <= 1 { None } else { Some(self.commit_at(lo - 1)?.0) };
        let commits = self.store.walk_history(start_id, stop_id, max)?;
        Ok(commits
            .into_iter()
            .filter(|(_, commit)| commit.changes.iter().any(|c| pattern::matches(path_pattern, c.path())))
            .map(|(_, commit)| HistoryEntry::from(commit))
            .collect())
    }

    /// Synthesizes the `Change[]` that would turn `from`'s tree into `to`'s
    /// tree, restricted to `path_pattern`. Unlike `history`, which replays
    /// the changes an author actually submitted, this always emits whole-
    /// file upserts/removals describing the net effect between the two
    /// revisions, since they need not be adjacent commits.
    pub fn diff(&self, from: i64, to: i64, path_pattern: &str) -> Result<Vec<Change>, CoreError> {
        let from_tree = self.tree_at(from)?;
        let to_tree = self.tree_at(to)?;

        let mut from_blobs = Vec::new();
        collect_blobs(&self.store, from_tree, "", &mut from_blobs)?;
        let from_map: BTreeMap<String, ObjectId> = from_blobs.into_iter().collect();

        let mut to_blobs = Vec::new();
        collect_blobs(&self.store, to_tree, "", &mut to_blobs)?;
        let to_map: BTreeMap<String, ObjectId> = to_blobs.into_iter().collect();

        let mut changes = Vec::new();
        for (path, to_id) in &to_map {
            if !pattern::matches(path_pattern, path) {
                continue;
            }
            if from_map.get(path) == Some(to_id) {
                continue;
            }
            let blob = self.store.read_blob(to_id)?;
            changes.push(upsert_change_for(path, blob.data)?);
        }
        for path in from_map.keys() {
            if pattern::matches(path_pattern, path) && !to_map.contains_key(path) {
                changes.push(Change::Remove { path: path.clone() });
            }
        }
        Ok(changes)
    }

    /// Applies `changes` against `base_revision`'s tree without committing,
    /// returning the resulting content of every path the changes touched
    /// (a removed path comes back as a `REMOVE`).
    pub fn preview_diff(
        &self,
        base_revision: i64,
        changes: &[Change],
    ) -> Result<BTreeMap<String, Change>, CoreError> {
        let mut tree_id = self.tree_at(base_revision)?;
        let mut touched = Vec::new();
        for change in changes {
            touched.push(change.path().to_string());
            if let Change::Rename { new_path, .. } = change {
                touched.push(new_path.clone());
            }
            tree_id = apply_change(&self.store, tree_id, change)?;
        }

        let mut out = BTreeMap::new();
        for path in touched {
            let segments = path_segments(&path);
            match get_blob_id(&self.store, tree_id, &segments)? {
                Some(blob_id) => {
                    let blob = self.store.read_blob(&blob_id)?;
                    out.insert(path.clone(), upsert_change_for(&path, blob.data)?);
                }
                None => {
                    out.insert(path.clone(), Change::Remove { path });
                }
            }
        }
        Ok(out)
    }

    /// Merges `paths` (required) and `optional_paths` (skipped if absent)
    /// as of `revision` into one JSON document, later paths overriding
    /// earlier ones.
    pub fn merge_files(
        &self,
        revision: i64,
        paths: &[String],
        optional_paths: &[String],
    ) -> Result<Value, CoreError> {
        let tree_id = self.tree_at(revision)?;
        let mut values = Vec::new();
        for path in paths {
            let entry = self.read_entry_at(tree_id, path, None)?;
            values.push((path.clone(), content_to_value(entry.content)));
        }
        for path in optional_paths {
            let segments = path_segments(path);
            if let Some(blob_id) = get_blob_id(&self.store, tree_id, &segments)? {
                let blob = self.store.read_blob(&blob_id)?;
                let entry_type = EntryType::of_path(path).unwrap_or(EntryType::Text);
                let content = parse_content(entry_type, &blob.data)?;
                values.push((path.clone(), content_to_value(Some(content))));
            }
        }
        merge::merge_json(values)
    }

    /// Applies `changes` atomically on top of `base_revision`, retrying the
    /// head compare-and-swap if a concurrent commit lands first. Rejects an
    /// empty `changes` as `InvalidRequest` (distinct from a non-empty but
    /// no-op commit, see `RedundantChange` below), and rejects any path a
    /// `meta` repository doesn't document as writable. Fails with
    /// `RedundantChange` if the resulting tree equals the base tree, and
    /// with `ChangeConflict` if the CAS keeps losing past the retry budget.
    #[allow(clippy::too_many_arguments)]
    pub fn commit(
        &self,
        base_revision: i64,
        author: String,
        timestamp_ms: i64,
        summary: String,
        detail: String,
        markup: Markup,
        changes: Vec<Change>,
    ) -> Result<i64, CoreError> {
        if changes.is_empty() {
            return Err(CoreError::invalid("commit has no changes"));
        }
        self.check_meta_write_scope(&changes)?;
        let base_abs = self.normalize(base_revision)?;
        let current_head = self.head_revision()?;
        if base_abs != current_head {
            return Err(CoreError::change_conflict(format!(
                "base revision {base_abs} is stale; head is at {current_head}"
            )));
        }

        for _ in 0..MAX_COMMIT_RETRIES {
            let head = self.store.read_head()?;
            let (base_tree_id, parent_commit_id, base_commit_revision, parent_timestamp_ms) = match head {
                Some(id) => {
                    let commit = self.store.read_commit(&id)?;
                    (commit.tree_id, Some(id), commit.revision, commit.timestamp_ms)
                }
                None => (self.store.put_tree(&Tree::new(Vec::new()))?, None, 0, 0),
            };

            let mut tree_id = base_tree_id;
            for change in &changes {
                tree_id = apply_change(&self.store, tree_id, change)?;
            }
            if tree_id == base_tree_id {
                return Err(CoreError::RedundantChange);
            }

            // Revisions must carry non-decreasing timestamps; a client
            // supplying a stale clock value is clamped forward to the
            // parent's rather than rejected outright, since a straggling
            // writer racing a faster one is routine, not an error.
            let new_revision = base_commit_revision + 1;
            let commit = Commit {
                tree_id,
                parent_commit_id,
                revision: new_revision,
                author: author.clone(),
                timestamp_ms: timestamp_ms.max(parent_timestamp_ms),
                summary: summary.clone(),
                detail: detail.clone(),
                markup,
                changes: changes.clone(),
            };
            let commit_id = self.store.put_commit(&commit)?;

            match self.store.ref_cas(parent_commit_id, commit_id)? {
                crate::internal::store::refs::RefCasOutcome::Ok => return Ok(new_revision),
                crate::internal::store::refs::RefCasOutcome::Mismatch { .. } => continue,
            }
        }
        Err(CoreError::change_conflict(
            "too many concurrent writers to this repository",
        ))
    }
}

fn content_to_value(content: Option<EntryContent>) -> Value {
    match content {
        Some(EntryContent::Structured(v)) => v,
        Some(EntryContent::Text(s)) => Value::String(s),
        None => Value::Null,
    }
}

fn parse_content(entry_type: EntryType, bytes: &[u8]) -> Result<EntryContent, CoreError> {
    match entry_type {
        EntryType::Json => {
            let value: Value = serde_json::from_slice(bytes)
                .map_err(|e| CoreError::invalid(format!("malformed JSON: {e}")))?;
            Ok(EntryContent::Structured(value))
        }
        EntryType::Yaml => {
            let value: Value = serde_yaml::from_slice(bytes)
                .map_err(|e| CoreError::invalid(format!("malformed YAML: {e}")))?;
            Ok(EntryContent::Structured(value))
        }
        EntryType::Text | EntryType::Directory => {
            Ok(EntryContent::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
    }
}

fn upsert_change_for(path: &str, bytes: Vec<u8>) -> Result<Change, CoreError> {
    match EntryType::of_path(path) {
        Some(EntryType::Json) | Some(EntryType::Yaml) => {
            let value: Value = serde_json::from_slice(&bytes)
                .map_err(|e| CoreError::Internal(format!("corrupt entry `{path}`: {e}")))?;
            Ok(Change::UpsertJson {
                path: path.to_string(),
                content: value,
            })
        }
        _ => {
            let text = String::from_utf8(bytes)
                .map_err(|e| CoreError::Internal(format!("corrupt entry `{path}`: {e}")))?;
            Ok(Change::UpsertText {
                path: path.to_string(),
                content: text,
            })
        }
    }
}

fn collect_blobs(
    store: &ObjectStore,
    tree_id: ObjectId,
    prefix: &str,
    out: &mut Vec<(String, ObjectId)>,
) -> Result<(), CoreError> {
    let tree = store.read_tree(&tree_id)?;
    for entry in &tree.entries {
        let full_path = format!("{prefix}/{}", entry.name);
        match entry.kind {
            TreeEntryKind::Blob => out.push((full_path, entry.id)),
            TreeEntryKind::Tree => collect_blobs(store, entry.id, &full_path, out)?,
        }
    }
    Ok(())
}

fn get_blob_id(store: &ObjectStore, tree_id: ObjectId, segments: &[&str]) -> Result<Option<ObjectId>, CoreError> {
    let tree = store.read_tree(&tree_id)?;
    let Some(entry) = tree.get(segments[0]) else {
        return Ok(None);
    };
    if segments.len() == 1 {
        return Ok(match entry.kind {
            TreeEntryKind::Blob => Some(entry.id),
            TreeEntryKind::Tree => None,
        });
    }
    match entry.kind {
        TreeEntryKind::Tree => get_blob_id(store, entry.id, &segments[1..]),
        TreeEntryKind::Blob => Ok(None),
    }
}

fn set_path(store: &ObjectStore, tree_id: ObjectId, segments: &[&str], blob_id: ObjectId) -> Result<ObjectId, CoreError> {
    let tree = store.read_tree(&tree_id)?;
    if segments.len() == 1 {
        let new_tree = tree.with_entry(TreeEntry {
            name: segments[0].to_string(),
            kind: TreeEntryKind::Blob,
            id: blob_id,
        });
        return store.put_tree(&new_tree);
    }
    let child_id = match tree.get(segments[0]) {
        Some(entry) if entry.kind == TreeEntryKind::Tree => entry.id,
        Some(_) => {
            return Err(CoreError::change_conflict(format!(
                "`{}` is a file, not a directory",
                segments[0]
            )))
        }
        None => store.put_tree(&Tree::new(Vec::new()))?,
    };
    let new_child_id = set_path(store, child_id, &segments[1..], blob_id)?;
    let new_tree = tree.with_entry(TreeEntry {
        name: segments[0].to_string(),
        kind: TreeEntryKind::Tree,
        id: new_child_id,
    });
    store.put_tree(&new_tree)
}

fn remove_path(store: &ObjectStore, tree_id: ObjectId, segments: &[&str]) -> Result<ObjectId, CoreError> {
    let tree = store.read_tree(&tree_id)?;
    if segments.len() == 1 {
        if tree.get(segments[0]).is_none() {
            return Err(CoreError::not_found(format!("`{}`", segments[0])));
        }
        return store.put_tree(&tree.without_entry(segments[0]));
    }
    match tree.get(segments[0]) {
        Some(entry) if entry.kind == TreeEntryKind::Tree => {
            let new_child_id = remove_path(store, entry.id, &segments[1..])?;
            let child_tree = store.read_tree(&new_child_id)?;
            let new_tree = if child_tree.is_empty() {
                tree.without_entry(segments[0])
            } else {
                tree.with_entry(TreeEntry {
                    name: segments[0].to_string(),
                    kind: TreeEntryKind::Tree,
                    id: new_child_id,
                })
            };
            store.put_tree(&new_tree)
        }
        _ => Err(CoreError::not_found(format!("`/{}`", segments.join("/")))),
    }
}

fn apply_change(store: &ObjectStore, tree_id: ObjectId, change: &Change) -> Result<ObjectId, CoreError> {
    match change {
        Change::UpsertJson { path, content } => {
            validate_path(path)?;
            let bytes = serde_json::to_vec_pretty(content)
                .map_err(|e| CoreError::Internal(format!("encode `{path}`: {e}")))?;
            let blob_id = store.put_blob(bytes)?;
            set_path(store, tree_id, &path_segments(path), blob_id)
        }
        Change::UpsertText { path, content } => {
            validate_path(path)?;
            let blob_id = store.put_blob(content.clone().into_bytes())?;
            set_path(store, tree_id, &path_segments(path), blob_id)
        }
        Change::Remove { path } => {
            validate_path(path)?;
            remove_path(store, tree_id, &path_segments(path))
        }
        Change::Rename { path, new_path } => {
            validate_path(path)?;
            validate_path(new_path)?;
            let segments = path_segments(path);
            let blob_id = get_blob_id(store, tree_id, &segments)?
                .ok_or_else(|| CoreError::not_found(format!("`{path}`")))?;
            let new_segments = path_segments(new_path);
            if get_blob_id(store, tree_id, &new_segments)?.is_some() {
                return Err(CoreError::change_conflict(format!("`{new_path}` already exists")));
            }
            let tree_id = remove_path(store, tree_id, &segments)?;
            set_path(store, tree_id, &new_segments, blob_id)
        }
        Change::ApplyJsonPatch { path, content } => {
            validate_path(path)?;
            let segments = path_segments(path);
            let blob_id = get_blob_id(store, tree_id, &segments)?
                .ok_or_else(|| CoreError::not_found(format!("`{path}`")))?;
            let blob = store.read_blob(&blob_id)?;
            let mut target: Value = serde_json::from_slice(&blob.data)
                .map_err(|e| CoreError::change_conflict(format!("`{path}` is not valid JSON: {e}")))?;
            let patch: json_patch::Patch = serde_json::from_value(content.clone())
                .map_err(|e| CoreError::invalid(format!("malformed JSON patch: {e}")))?;
            json_patch::patch(&mut target, &patch)
                .map_err(|e| CoreError::change_conflict(format!("patch does not apply to `{path}`: {e}")))?;
            let bytes = serde_json::to_vec_pretty(&target)
                .map_err(|e| CoreError::Internal(format!("encode `{path}`: {e}")))?;
            let new_blob_id = store.put_blob(bytes)?;
            set_path(store, tree_id, &segments, new_blob_id)
        }
        Change::ApplyTextPatch { path, content } => {
            validate_path(path)?;
            let segments = path_segments(path);
            let blob_id = get_blob_id(store, tree_id, &segments)?
                .ok_or_else(|| CoreError::not_found(format!("`{path}`")))?;
            let blob = store.read_blob(&blob_id)?;
            let original = String::from_utf8(blob.data)
                .map_err(|e| CoreError::change_conflict(format!("`{path}` is not valid UTF-8: {e}")))?;
            let patch = diffy::Patch::from_str(content)
                .map_err(|e| CoreError::invalid(format!("malformed text patch: {e}")))?;
            let patched = diffy::apply(&original, &patch)
                .map_err(|e| CoreError::change_conflict(format!("patch does not apply to `{path}`: {e}")))?;
            let new_blob_id = store.put_blob(patched.into_bytes())?;
            set_path(store, tree_id, &segments, new_blob_id)
        }
    }
}
