//! Error types for the confrepo core.
//!
//! A single enumeration covers every error kind named in the error-handling
//! design: object-store/repository failures, replication/quota conditions,
//! and request-shape problems. Each variant maps to exactly one of the
//! error kinds the server adapter translates to an HTTP status; that
//! mapping lives at the edge (`server::error_map`), not here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Project, repository, revision, or entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate project or repository name.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Base revision stale, patch target missing, rename collision, or
    /// merge type mismatch.
    #[error("change conflict: {0}")]
    ChangeConflict(String),

    /// The commit would produce a tree identical to its base.
    #[error("redundant change: resulting tree is identical to base")]
    RedundantChange,

    /// JSON-path evaluated to nothing, or a merge hit a type clash.
    #[error("query failure: {0}")]
    QueryFailure(String),

    /// Malformed path, bad name, or malformed request body.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Caller lacks the role/permission required for the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Write-rate quota exhausted for a repository.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// No leader, or a leadership fail-over is in progress.
    #[error("replication unavailable: {0}")]
    ReplicationUnavailable(String),

    /// The replica is draining and rejects new commands.
    #[error("shutting down")]
    ShuttingDown,

    /// I/O failure from the object store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal condition; never expected to be hit by a
    /// correct caller, surfaced rather than panicking.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        CoreError::NotFound(what.to_string())
    }

    pub fn change_conflict(what: impl std::fmt::Display) -> Self {
        CoreError::ChangeConflict(what.to_string())
    }

    pub fn query_failure(what: impl std::fmt::Display) -> Self {
        CoreError::QueryFailure(what.to_string())
    }

    pub fn invalid(what: impl std::fmt::Display) -> Self {
        CoreError::InvalidRequest(what.to_string())
    }

    /// Transient (I/O, coordinator) errors are retried internally; this
    /// tells a retry loop whether it is worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Io(_) | CoreError::Internal(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
