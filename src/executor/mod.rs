//! Dispatches commands — submitted locally or replayed from the
//! replication log — to the project catalog and repository engine. Keeping
//! this as one place means a replayed command and a freshly submitted one
//! go through exactly the same handler, which is what makes replay safe:
//! the only difference between the two paths is `is_replay`, consulted
//! solely to make already-applied side effects a no-op instead of an
//! error.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::sync::Mutex as AsyncMutex;

use crate::cache::QueryCache;
use crate::command::Command;
use crate::errors::CoreError;
use crate::internal::object::commit::{Change, Markup};
use crate::project::ProjectManager;
use crate::replication::{LogEntry, ReplicationLog};
use crate::repository::Repository;
use crate::watch::Notifier;

/// Repository names a caller may never create directly: `meta` and
/// `dogma` are seeded automatically by `CREATE_PROJECT` and otherwise
/// reserved for the system's own bookkeeping.
const RESERVED_REPOSITORY_NAMES: [&str; 2] = ["meta", "dogma"];

/// Whether a command handler is running because a client just submitted
/// it, or because the executor is replaying the log (on startup, or after
/// a fail-over). Idempotent commands treat "already applied" as success
/// only in the replay case — a fresh duplicate submission (e.g. a project
/// name collision) is still a real conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    Submit,
    Replay,
}

pub struct CommandExecutor {
    projects: Arc<ProjectManager>,
    log: Arc<dyn ReplicationLog>,
    notifier: Arc<Notifier>,
    cache: Option<Arc<QueryCache>>,
    repositories: DashMap<(String, String), Arc<Repository>>,
    applied_up_to: AsyncMutex<u64>,
}

impl CommandExecutor {
    pub fn new(projects: Arc<ProjectManager>, log: Arc<dyn ReplicationLog>, notifier: Arc<Notifier>) -> CommandExecutor {
        CommandExecutor {
            projects,
            log,
            notifier,
            cache: None,
            repositories: DashMap::new(),
            applied_up_to: AsyncMutex::new(0),
        }
    }

    /// Attaches the shared read cache so purges can invalidate the entries
    /// of a repository whose name gets reused after a purge.
    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> CommandExecutor {
        self.cache = Some(cache);
        self
    }

    fn repository(&self, project: &str, name: &str) -> Result<Arc<Repository>, CoreError> {
        let key = (project.to_string(), name.to_string());
        if let Some(repo) = self.repositories.get(&key) {
            return Ok(repo.clone());
        }
        let root = self.projects.repository_root(project, name)?;
        let repo = Arc::new(Repository::open(root)?);
        self.repositories.insert(key, repo.clone());
        Ok(repo)
    }

    /// Appends `command` to the replication log (if it is a write) and
    /// applies it locally, returning a receiver that resolves once the
    /// command has actually been applied. Non-write commands (pure reads
    /// like `NORMALIZE_REVISION`) are applied immediately without touching
    /// the log.
    pub async fn submit(&self, command: Command) -> Result<oneshot::Receiver<Result<Value, CoreError>>, CoreError> {
        let (tx, rx) = oneshot::channel();
        if !command.is_write() {
            let result = self.apply(&command, ExecutionContext::Submit).await;
            let _ = tx.send(result);
            return Ok(rx);
        }

        let index = self.log.append(command.clone()).await?;
        let result = self.apply(&command, ExecutionContext::Submit).await;
        {
            let mut applied = self.applied_up_to.lock().await;
            *applied = (*applied).max(index);
        }
        let _ = tx.send(result);
        Ok(rx)
    }

    /// Replays every log entry after the last index this executor has
    /// applied; used on startup and after taking over leadership.
    pub async fn catch_up(&self) -> Result<u64, CoreError> {
        let after = *self.applied_up_to.lock().await;
        let entries: Vec<LogEntry> = self.log.entries_from(after).await?;
        let mut last = after;
        for entry in entries {
            self.apply(&entry.command, ExecutionContext::Replay).await?;
            last = entry.index;
        }
        *self.applied_up_to.lock().await = last;
        Ok(last)
    }

    async fn apply(&self, command: &Command, ctx: ExecutionContext) -> Result<Value, CoreError> {
        match command {
            Command::CreateProject { name, author, .. } => {
                match self.projects.create_project(name, author, now_ms()) {
                    Ok(()) => {}
                    Err(CoreError::AlreadyExists(_)) if ctx == ExecutionContext::Replay => {}
                    Err(e) => return Err(e),
                }
                // A project's catalog comes with a `meta` repository for
                // its own configuration and a `dogma` repository for
                // internal bookkeeping, created as part of the same
                // composite operation so a caller never observes a project
                // without either. Both are reserved names a plain
                // `CREATE_REPOSITORY` command may not target directly.
                for reserved in RESERVED_REPOSITORY_NAMES {
                    match self.projects.create_repository(name, reserved, author, now_ms()) {
                        Ok(()) => {}
                        Err(CoreError::AlreadyExists(_)) if ctx == ExecutionContext::Replay => {}
                        Err(e) => return Err(e),
                    }
                }
                let meta = self.repository(name, "meta")?;
                meta.ensure_initialized(
                    author.clone(),
                    now_ms(),
                    vec![Change::UpsertJson {
                        path: "/repository.json".to_string(),
                        content: json!({"name": name, "author": author}),
                    }],
                )?;
                let dogma = self.repository(name, "dogma")?;
                dogma.ensure_initialized(author.clone(), now_ms(), Vec::new())?;
                Ok(json!({"name": name}))
            }
            Command::RemoveProject { name, .. } => {
                self.projects.set_project_removed(name, true, now_ms())?;
                Ok(Value::Null)
            }
            Command::UnremoveProject { name, .. } => {
                self.projects.set_project_removed(name, false, now_ms())?;
                Ok(Value::Null)
            }
            Command::PurgeProject { name, .. } => {
                if let Some(cache) = &self.cache {
                    if let Some(meta) = self.projects.project(name) {
                        for repo_name in meta.repositories.keys() {
                            cache.invalidate_repository(name, repo_name).await;
                        }
                    }
                }
                self.projects.purge_project(name)?;
                self.repositories.retain(|(p, _), _| p != name);
                Ok(Value::Null)
            }
            Command::CreateRepository { project, name, author, .. } => {
                if RESERVED_REPOSITORY_NAMES.contains(&name.as_str()) {
                    return Err(CoreError::invalid(format!(
                        "`{name}` is a reserved repository name"
                    )));
                }
                match self.projects.create_repository(project, name, author, now_ms()) {
                    Ok(()) => {}
                    Err(CoreError::AlreadyExists(_)) if ctx == ExecutionContext::Replay => {}
                    Err(e) => return Err(e),
                }
                self.repository(project, name)?
                    .ensure_initialized(author.clone(), now_ms(), Vec::new())?;
                Ok(json!({"project": project, "name": name}))
            }
            Command::RemoveRepository { project, name, .. } => {
                self.projects.set_repository_removed(project, name, true, now_ms())?;
                Ok(Value::Null)
            }
            Command::UnremoveRepository { project, name, .. } => {
                self.projects.set_repository_removed(project, name, false, now_ms())?;
                Ok(Value::Null)
            }
            Command::PurgeRepository { project, name, .. } => {
                if let Some(cache) = &self.cache {
                    cache.invalidate_repository(project, name).await;
                }
                self.projects.purge_repository(project, name)?;
                self.repositories.remove(&(project.clone(), name.clone()));
                Ok(Value::Null)
            }
            Command::NormalizeRevision {
                project,
                repository,
                revision,
                ..
            } => {
                let repo = self.repository(project, repository)?;
                let abs = repo.normalize(*revision)?;
                Ok(json!({"revision": abs}))
            }
            Command::Push {
                project,
                repository,
                base_revision,
                author,
                timestamp_ms,
                summary,
                detail,
                markup,
                changes,
                ..
            } => {
                let repo = self.repository(project, repository)?;
                let revision = repo.commit(
                    *base_revision,
                    author.clone(),
                    *timestamp_ms,
                    summary.clone(),
                    detail.clone(),
                    *markup,
                    changes.clone(),
                )?;
                self.notifier.notify(project, repository, revision);
                Ok(json!({"revision": revision}))
            }
            Command::Transform {
                project,
                repository,
                base_revision,
                author,
                timestamp_ms,
                summary,
                detail,
                markup,
                transform_spec,
                ..
            } => {
                // The transform spec's own language (query + patch) is an
                // external collaborator's concern; here it is already a
                // `Change[]` by the time it reaches the executor.
                let changes = serde_json::from_value(transform_spec.clone())
                    .map_err(|e| CoreError::invalid(format!("malformed transform: {e}")))?;
                let repo = self.repository(project, repository)?;
                let revision = repo.commit(
                    *base_revision,
                    author.clone(),
                    *timestamp_ms,
                    summary.clone(),
                    detail.clone(),
                    *markup,
                    changes,
                )?;
                self.notifier.notify(project, repository, revision);
                Ok(json!({"revision": revision}))
            }
            Command::CreateSession { author, .. } => Ok(json!({"author": author})),
            Command::RemoveSession { .. } => Ok(Value::Null),
            Command::UpdateServerStatus { replica_id, writable, .. } => {
                Ok(json!({"replicaId": replica_id, "writable": writable}))
            }
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::StandaloneLog;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn executor(dir: &std::path::Path) -> CommandExecutor {
        let projects = Arc::new(ProjectManager::open(dir).unwrap());
        let log: Arc<dyn ReplicationLog> = Arc::new(StandaloneLog::new());
        let notifier = Arc::new(Notifier::new());
        CommandExecutor::new(projects, log, notifier)
    }

    #[tokio::test]
    async fn create_project_also_creates_meta_repository() {
        let dir = tempdir().unwrap();
        let executor = executor(dir.path());
        executor
            .submit(Command::CreateProject {
                idempotency_key: Uuid::now_v7(),
                name: "demo".to_string(),
                author: "alice".to_string(),
            })
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        let repo = executor.repository("demo", "meta");
        assert!(repo.is_ok());
    }

    #[tokio::test]
    async fn push_commits_and_notifies() {
        let dir = tempdir().unwrap();
        let executor = executor(dir.path());
        executor
            .submit(Command::CreateProject {
                idempotency_key: Uuid::now_v7(),
                name: "demo".to_string(),
                author: "alice".to_string(),
            })
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        let result = executor
            .submit(Command::Push {
                idempotency_key: Uuid::now_v7(),
                project: "demo".to_string(),
                repository: "dogma".to_string(),
                base_revision: 0,
                author: "alice".to_string(),
                timestamp_ms: 0,
                summary: "init".to_string(),
                detail: String::new(),
                markup: Markup::Plaintext,
                changes: vec![crate::internal::object::commit::Change::UpsertJson {
                    path: "/a.json".to_string(),
                    content: json!({"k": 1}),
                }],
            })
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result["revision"], 2);
    }

    #[tokio::test]
    async fn push_to_meta_rejects_undocumented_path() {
        let dir = tempdir().unwrap();
        let executor = executor(dir.path());
        executor
            .submit(Command::CreateProject {
                idempotency_key: Uuid::now_v7(),
                name: "demo".to_string(),
                author: "alice".to_string(),
            })
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        let result = executor
            .submit(Command::Push {
                idempotency_key: Uuid::now_v7(),
                project: "demo".to_string(),
                repository: "meta".to_string(),
                base_revision: 0,
                author: "alice".to_string(),
                timestamp_ms: 0,
                summary: "arbitrary".to_string(),
                detail: String::new(),
                markup: Markup::Plaintext,
                changes: vec![crate::internal::object::commit::Change::UpsertJson {
                    path: "/settings/app.json".to_string(),
                    content: json!({"k": 1}),
                }],
            })
            .await
            .unwrap()
            .await
            .unwrap();

        assert!(matches!(result, Err(CoreError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn create_project_also_creates_dogma_repository_and_seeds_meta() {
        let dir = tempdir().unwrap();
        let executor = executor(dir.path());
        executor
            .submit(Command::CreateProject {
                idempotency_key: Uuid::now_v7(),
                name: "demo".to_string(),
                author: "alice".to_string(),
            })
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        let dogma = executor.repository("demo", "dogma").unwrap();
        assert_eq!(dogma.head_revision().unwrap(), 1);

        let meta = executor.repository("demo", "meta").unwrap();
        assert_eq!(meta.head_revision().unwrap(), 1);
        let seeded = meta
            .get(0, &crate::repository::query::Query::Identity { path: "/repository.json".to_string() })
            .unwrap();
        assert_eq!(seeded["name"], "demo");
    }

    #[tokio::test]
    async fn create_repository_rejects_reserved_names() {
        let dir = tempdir().unwrap();
        let executor = executor(dir.path());
        executor
            .submit(Command::CreateProject {
                idempotency_key: Uuid::now_v7(),
                name: "demo".to_string(),
                author: "alice".to_string(),
            })
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        let result = executor
            .submit(Command::CreateRepository {
                idempotency_key: Uuid::now_v7(),
                project: "demo".to_string(),
                name: "dogma".to_string(),
                author: "alice".to_string(),
            })
            .await
            .unwrap()
            .await
            .unwrap();
        assert!(matches!(result, Err(CoreError::InvalidRequest(_))));
    }
}
