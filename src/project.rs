//! The project/repository catalog: which projects and repositories exist,
//! their creation metadata, and soft-removal state. This is metadata about
//! repositories, not their content — the content itself lives in an
//! [`crate::internal::store::ObjectStore`] per repository, opened lazily by
//! whatever holds a `ProjectManager` (see `context.rs`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::utils::validate_name;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryMeta {
    pub name: String,
    pub author: String,
    pub created_at_ms: i64,
    /// Set when soft-removed; the repository stays on disk and queryable
    /// by an operator until a `PURGE_REPOSITORY` command deletes it for
    /// good, after `removal_grace_period_millis` has passed.
    pub removed_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub name: String,
    pub author: String,
    pub created_at_ms: i64,
    pub removed_at_ms: Option<i64>,
    pub repositories: BTreeMap<String, RepositoryMeta>,
}

/// Catalog of projects and repositories, persisted as one JSON document per
/// project under `<dataDir>/<project>/project.json`, guarded by an
/// in-process lock (the executor is this catalog's only writer, so no
/// cross-process coordination is needed beyond what the replication log
/// already provides).
pub struct ProjectManager {
    data_dir: PathBuf,
    projects: RwLock<BTreeMap<String, ProjectMeta>>,
}

impl ProjectManager {
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<ProjectManager, CoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        let mut projects = BTreeMap::new();
        for entry in fs::read_dir(&data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let meta_path = entry.path().join("project.json");
            if !meta_path.is_file() {
                continue;
            }
            let contents = fs::read_to_string(&meta_path)?;
            let meta: ProjectMeta = serde_json::from_str(&contents)
                .map_err(|e| CoreError::Internal(format!("corrupt project metadata: {e}")))?;
            projects.insert(meta.name.clone(), meta);
        }
        Ok(ProjectManager {
            data_dir,
            projects: RwLock::new(projects),
        })
    }

    fn project_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    fn persist(&self, meta: &ProjectMeta) -> Result<(), CoreError> {
        let dir = self.project_path(&meta.name);
        fs::create_dir_all(&dir)?;
        let tmp = dir.join("project.json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(meta)?)?;
        fs::rename(&tmp, dir.join("project.json"))?;
        Ok(())
    }

    pub fn create_project(&self, name: &str, author: &str, now_ms: i64) -> Result<(), CoreError> {
        validate_name(name)?;
        let mut projects = self.projects.write().unwrap();
        if projects.contains_key(name) {
            return Err(CoreError::AlreadyExists(format!("project `{name}`")));
        }
        let meta = ProjectMeta {
            name: name.to_string(),
            author: author.to_string(),
            created_at_ms: now_ms,
            removed_at_ms: None,
            repositories: BTreeMap::new(),
        };
        self.persist(&meta)?;
        projects.insert(name.to_string(), meta);
        Ok(())
    }

    pub fn set_project_removed(&self, name: &str, removed: bool, now_ms: i64) -> Result<(), CoreError> {
        let mut projects = self.projects.write().unwrap();
        let meta = projects
            .get_mut(name)
            .ok_or_else(|| CoreError::not_found(format!("project `{name}`")))?;
        meta.removed_at_ms = removed.then_some(now_ms);
        self.persist(meta)
    }

    pub fn purge_project(&self, name: &str) -> Result<(), CoreError> {
        let mut projects = self.projects.write().unwrap();
        if !projects.contains_key(name) {
            return Err(CoreError::not_found(format!("project `{name}`")));
        }
        let dir = self.project_path(name);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        }
        projects.remove(name);
        Ok(())
    }

    pub fn create_repository(&self, project: &str, name: &str, author: &str, now_ms: i64) -> Result<(), CoreError> {
        validate_name(name)?;
        let mut projects = self.projects.write().unwrap();
        let meta = projects
            .get_mut(project)
            .ok_or_else(|| CoreError::not_found(format!("project `{project}`")))?;
        if meta.repositories.contains_key(name) {
            return Err(CoreError::AlreadyExists(format!("repository `{project}/{name}`")));
        }
        meta.repositories.insert(
            name.to_string(),
            RepositoryMeta {
                name: name.to_string(),
                author: author.to_string(),
                created_at_ms: now_ms,
                removed_at_ms: None,
            },
        );
        self.persist(meta)
    }

    pub fn set_repository_removed(
        &self,
        project: &str,
        name: &str,
        removed: bool,
        now_ms: i64,
    ) -> Result<(), CoreError> {
        let mut projects = self.projects.write().unwrap();
        let meta = projects
            .get_mut(project)
            .ok_or_else(|| CoreError::not_found(format!("project `{project}`")))?;
        let repo = meta
            .repositories
            .get_mut(name)
            .ok_or_else(|| CoreError::not_found(format!("repository `{project}/{name}`")))?;
        repo.removed_at_ms = removed.then_some(now_ms);
        self.persist(meta)
    }

    pub fn purge_repository(&self, project: &str, name: &str) -> Result<(), CoreError> {
        let mut projects = self.projects.write().unwrap();
        let meta = projects
            .get_mut(project)
            .ok_or_else(|| CoreError::not_found(format!("project `{project}`")))?;
        if meta.repositories.remove(name).is_none() {
            return Err(CoreError::not_found(format!("repository `{project}/{name}`")));
        }
        let repo_dir = self.project_path(project).join(name);
        if repo_dir.is_dir() {
            fs::remove_dir_all(&repo_dir)?;
        }
        self.persist(meta)
    }

    pub fn repository_root(&self, project: &str, name: &str) -> Result<PathBuf, CoreError> {
        let projects = self.projects.read().unwrap();
        let meta = projects
            .get(project)
            .ok_or_else(|| CoreError::not_found(format!("project `{project}`")))?;
        if !meta.repositories.contains_key(name) {
            return Err(CoreError::not_found(format!("repository `{project}/{name}`")));
        }
        Ok(self.project_path(project).join(name))
    }

    pub fn project(&self, name: &str) -> Option<ProjectMeta> {
        self.projects.read().unwrap().get(name).cloned()
    }

    pub fn list_projects(&self) -> Vec<ProjectMeta> {
        self.projects.read().unwrap().values().cloned().collect()
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> CoreError {
        CoreError::Internal(format!("serialize project metadata: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_project_then_repository_round_trips() {
        let dir = tempdir().unwrap();
        let manager = ProjectManager::open(dir.path()).unwrap();
        manager.create_project("demo", "alice", 0).unwrap();
        manager.create_repository("demo", "meta", "alice", 0).unwrap();

        let root = manager.repository_root("demo", "meta").unwrap();
        assert_eq!(root, dir.path().join("demo").join("meta"));
    }

    #[test]
    fn create_project_rejects_duplicate_name() {
        let dir = tempdir().unwrap();
        let manager = ProjectManager::open(dir.path()).unwrap();
        manager.create_project("demo", "alice", 0).unwrap();
        let result = manager.create_project("demo", "alice", 0);
        assert!(matches!(result, Err(CoreError::AlreadyExists(_))));
    }

    #[test]
    fn reopening_manager_restores_catalog_from_disk() {
        let dir = tempdir().unwrap();
        {
            let manager = ProjectManager::open(dir.path()).unwrap();
            manager.create_project("demo", "alice", 0).unwrap();
            manager.create_repository("demo", "meta", "alice", 0).unwrap();
        }
        let reopened = ProjectManager::open(dir.path()).unwrap();
        assert!(reopened.repository_root("demo", "meta").is_ok());
    }

    #[test]
    fn purge_repository_removes_its_directory() {
        let dir = tempdir().unwrap();
        let manager = ProjectManager::open(dir.path()).unwrap();
        manager.create_project("demo", "alice", 0).unwrap();
        manager.create_repository("demo", "meta", "alice", 0).unwrap();
        let root = manager.repository_root("demo", "meta").unwrap();
        fs::create_dir_all(&root).unwrap();

        manager.purge_repository("demo", "meta").unwrap();
        assert!(!root.exists());
        assert!(manager.repository_root("demo", "meta").is_err());
    }
}
