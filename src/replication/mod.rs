//! The replication log: a totally-ordered, append-only record of every
//! write command, which the executor applies locally and which a standby
//! replica would replay to stay in sync. This crate only ships a
//! single-node log (`StandaloneLog`) — a real multi-replica transport is an
//! external collaborator plugged in behind the [`ReplicationLog`] trait,
//! the same way [`elector::LeaderElector`] abstracts over leader election.

pub mod elector;
pub mod quota;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::errors::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: u64,
    pub command: Command,
}

/// A totally-ordered append-only log of write commands.
#[async_trait]
pub trait ReplicationLog: Send + Sync {
    /// Appends `command`, returning the index it was assigned. Fails with
    /// `ReplicationUnavailable` if this replica is not (or no longer) the
    /// leader by the time the append lands.
    async fn append(&self, command: Command) -> Result<u64, CoreError>;

    /// Entries with index `> after`, oldest first.
    async fn entries_from(&self, after: u64) -> Result<Vec<LogEntry>, CoreError>;

    async fn last_index(&self) -> u64;

    /// Drops entries older than `min_log_age_millis` once the log exceeds
    /// `max_log_count`, per the retention policy in the replication config.
    async fn prune(&self, max_log_count: u64, min_age_millis: u64, now_ms: i64) -> Result<u64, CoreError>;
}

/// In-memory log for a single, self-leading replica (`replication.method:
/// NONE`). Every append is immediately "committed" since there is no other
/// replica to agree with.
pub struct StandaloneLog {
    entries: tokio::sync::Mutex<Vec<(i64, LogEntry)>>,
}

impl StandaloneLog {
    pub fn new() -> StandaloneLog {
        StandaloneLog {
            entries: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

impl Default for StandaloneLog {
    fn default() -> StandaloneLog {
        StandaloneLog::new()
    }
}

#[async_trait]
impl ReplicationLog for StandaloneLog {
    async fn append(&self, command: Command) -> Result<u64, CoreError> {
        let mut entries = self.entries.lock().await;
        let index = entries.last().map(|(_, e)| e.index + 1).unwrap_or(1);
        let appended_at = chrono::Utc::now().timestamp_millis();
        entries.push((appended_at, LogEntry { index, command }));
        Ok(index)
    }

    async fn entries_from(&self, after: u64) -> Result<Vec<LogEntry>, CoreError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|(_, e)| e.index > after)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn last_index(&self) -> u64 {
        self.entries.lock().await.last().map(|(_, e)| e.index).unwrap_or(0)
    }

    async fn prune(&self, max_log_count: u64, min_age_millis: u64, now_ms: i64) -> Result<u64, CoreError> {
        let mut entries = self.entries.lock().await;
        if (entries.len() as u64) <= max_log_count {
            return Ok(0);
        }
        let excess = entries.len() as u64 - max_log_count;
        let mut removed = 0;
        while removed < excess {
            let Some((appended_at, _)) = entries.first() else {
                break;
            };
            if now_ms - *appended_at < min_age_millis as i64 {
                break;
            }
            entries.remove(0);
            removed += 1;
        }
        Ok(removed)
    }
}
