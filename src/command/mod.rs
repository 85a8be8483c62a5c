//! The command model: every state-changing operation flows through one of
//! these tagged-union variants, whether it originates from a client request
//! or replay of the replication log. Centralizing on one enum keeps the log
//! entry format, the executor's dispatch table, and idempotency handling in
//! one place instead of scattered per-endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::internal::object::commit::{Change, Markup};

fn new_idempotency_key() -> Uuid {
    Uuid::now_v7()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "CREATE_PROJECT")]
    CreateProject {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        name: String,
        author: String,
    },
    #[serde(rename = "REMOVE_PROJECT")]
    RemoveProject {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        name: String,
    },
    #[serde(rename = "UNREMOVE_PROJECT")]
    UnremoveProject {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        name: String,
    },
    #[serde(rename = "PURGE_PROJECT")]
    PurgeProject {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        name: String,
    },
    #[serde(rename = "CREATE_REPOSITORY")]
    CreateRepository {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        project: String,
        name: String,
        author: String,
    },
    #[serde(rename = "REMOVE_REPOSITORY")]
    RemoveRepository {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        project: String,
        name: String,
    },
    #[serde(rename = "UNREMOVE_REPOSITORY")]
    UnremoveRepository {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        project: String,
        name: String,
    },
    #[serde(rename = "PURGE_REPOSITORY")]
    PurgeRepository {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        project: String,
        name: String,
    },
    #[serde(rename = "NORMALIZE_REVISION")]
    NormalizeRevision {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        project: String,
        repository: String,
        revision: i64,
    },
    #[serde(rename = "PUSH")]
    Push {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        project: String,
        repository: String,
        base_revision: i64,
        author: String,
        timestamp_ms: i64,
        summary: String,
        detail: String,
        markup: Markup,
        changes: Vec<Change>,
    },
    #[serde(rename = "TRANSFORM")]
    Transform {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        project: String,
        repository: String,
        base_revision: i64,
        author: String,
        timestamp_ms: i64,
        summary: String,
        detail: String,
        markup: Markup,
        /// A JSON-path-addressed transform description, evaluated against
        /// the base revision to produce the `Change[]` actually committed.
        transform_spec: Value,
    },
    #[serde(rename = "CREATE_SESSION")]
    CreateSession {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        author: String,
    },
    #[serde(rename = "REMOVE_SESSION")]
    RemoveSession {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        session_id: String,
    },
    #[serde(rename = "UPDATE_SERVER_STATUS")]
    UpdateServerStatus {
        #[serde(default = "new_idempotency_key")]
        idempotency_key: Uuid,
        replica_id: String,
        writable: bool,
    },
}

impl Command {
    pub fn idempotency_key(&self) -> Uuid {
        match self {
            Command::CreateProject { idempotency_key, .. }
            | Command::RemoveProject { idempotency_key, .. }
            | Command::UnremoveProject { idempotency_key, .. }
            | Command::PurgeProject { idempotency_key, .. }
            | Command::CreateRepository { idempotency_key, .. }
            | Command::RemoveRepository { idempotency_key, .. }
            | Command::UnremoveRepository { idempotency_key, .. }
            | Command::PurgeRepository { idempotency_key, .. }
            | Command::NormalizeRevision { idempotency_key, .. }
            | Command::Push { idempotency_key, .. }
            | Command::Transform { idempotency_key, .. }
            | Command::CreateSession { idempotency_key, .. }
            | Command::RemoveSession { idempotency_key, .. }
            | Command::UpdateServerStatus { idempotency_key, .. } => *idempotency_key,
        }
    }

    /// Whether this command mutates replicated state and therefore needs to
    /// go through the replication log rather than being served locally.
    pub fn is_write(&self) -> bool {
        !matches!(self, Command::NormalizeRevision { .. })
    }
}
