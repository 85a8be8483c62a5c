//! Everything a request handler needs, threaded through explicitly rather
//! than reached for via a static — makes the server testable with an
//! in-memory `Context` and keeps `main` the only place that wires concrete
//! implementations together.

use std::sync::Arc;

use tokio::sync::Notify;

use crate::cache::QueryCache;
use crate::command::Command;
use crate::config::Config;
use crate::errors::CoreError;
use crate::executor::CommandExecutor;
use crate::project::ProjectManager;
use crate::replication::elector::{LeaderElector, SingleReplicaElector};
use crate::replication::quota::WriteQuota;
use crate::replication::{ReplicationLog, StandaloneLog};
use crate::watch::Notifier;

pub struct Context {
    pub config: Config,
    pub projects: Arc<ProjectManager>,
    pub executor: Arc<CommandExecutor>,
    pub cache: Arc<QueryCache>,
    pub notifier: Arc<Notifier>,
    pub quota: Arc<WriteQuota>,
    pub elector: Arc<dyn LeaderElector>,
    shutdown: Arc<Notify>,
}

impl Context {
    /// Wires up a context for `replication.method: NONE`. A quorum-backed
    /// deployment would construct a different `ReplicationLog`/
    /// `LeaderElector` pair here; the rest of the context is unaffected.
    pub async fn new(config: Config) -> Result<Context, CoreError> {
        let projects = Arc::new(ProjectManager::open(&config.data_dir)?);
        let log: Arc<dyn ReplicationLog> = Arc::new(StandaloneLog::new());
        let notifier = Arc::new(Notifier::new());
        let cache = Arc::new(QueryCache::new(&config.cache_spec));
        let executor = Arc::new(
            CommandExecutor::new(projects.clone(), log.clone(), notifier.clone()).with_cache(cache.clone()),
        );
        let quota = Arc::new(WriteQuota::new(
            config.write_quota_per_repository,
            config.quota_window_millis,
        ));
        let elector: Arc<SingleReplicaElector> =
            Arc::new(SingleReplicaElector::new(config.replication.replica_id.clone()));
        elector.start().await;

        Ok(Context {
            config,
            projects,
            executor,
            cache,
            notifier,
            quota,
            elector,
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub async fn submit(&self, command: Command) -> Result<serde_json::Value, CoreError> {
        if command.is_write() {
            self.quota_check(&command)?;
        }
        self.executor
            .submit(command)
            .await?
            .await
            .map_err(|_| CoreError::Internal("command dropped before completion".to_string()))?
    }

    fn quota_check(&self, command: &Command) -> Result<(), CoreError> {
        if let Command::Push { project, repository, .. } | Command::Transform { project, repository, .. } = command {
            self.quota.try_acquire(project, repository)?;
        }
        Ok(())
    }

    pub fn begin_shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown.notified().await;
    }
}
