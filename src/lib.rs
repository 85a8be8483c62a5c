//! confrepo-core: a replicated, version-controlled configuration repository
//! engine. A multi-tenant store of Projects containing Repositories, each a
//! linear history of Commits over a tree of JSON/YAML/text files, with
//! JSON-path querying, diffing, merging, a shared read cache, a replication
//! log that orders writes across replicas, and a watch fan-out for
//! long-polling clients.
//!
//! The hard engineering lives in [`repository`] (the per-repository
//! commit/query/watch surface over [`internal::store`], the git-like object
//! store), [`replication`] (the append-only log that orders every mutating
//! [`command`] across replicas), and [`watch`] (the fan-out that resolves
//! long-polled reads when a repository's head advances). [`server`] is a
//! thin edge adapting those to HTTP.

pub mod cache;
pub mod command;
pub mod config;
pub mod context;
pub mod diff;
pub mod errors;
pub mod executor;
pub mod hash;
pub mod internal;
pub mod project;
pub mod replication;
pub mod repository;
pub mod server;
pub mod utils;
pub mod watch;
