//! HTTP wire adapter: a thin `axum` router translating requests into
//! `Command`s for writes and direct `Repository` calls for reads, with
//! every handler's `CoreError` turned into a response by `error_map`.

pub mod auth;
pub mod error_map;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, Query as AxumQuery, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::command::Command;
use crate::context::Context;
use crate::errors::CoreError;
use crate::internal::object::commit::{Change, Markup};
use crate::repository::query::Query;
use crate::server::auth::{AllowAll, AuthProvider, Caller};

pub fn router(context: Arc<Context>) -> Router {
    Router::new()
        .route("/api/v1/projects", get(list_projects).post(create_project))
        .route("/api/v1/projects/:project/repos", post(create_repository))
        .route(
            "/api/v1/projects/:project/repos/:repo/contents/*path",
            get(get_entry),
        )
        .route("/api/v1/projects/:project/repos/:repo/list", get(find_entries))
        .route(
            "/api/v1/projects/:project/repos/:repo/commits",
            get(history).post(push),
        )
        .route("/api/v1/projects/:project/repos/:repo/watch", get(watch))
        .route("/api/v1/projects/:project/repos/:repo/merge", get(merge))
        .with_state(context)
}

async fn caller(headers: &HeaderMap) -> Caller {
    AllowAll
        .authenticate(headers)
        .await
        .unwrap_or(Caller { author: "anonymous".to_string() })
}

#[derive(Deserialize)]
struct CreateProjectRequest {
    name: String,
}

async fn list_projects(State(ctx): State<Arc<Context>>) -> Json<Value> {
    let projects: Vec<Value> = ctx
        .projects
        .list_projects()
        .into_iter()
        .map(|p| json!({"name": p.name, "createdAtMs": p.created_at_ms, "removed": p.removed_at_ms.is_some()}))
        .collect();
    Json(json!({"projects": projects}))
}

async fn create_project(
    State(ctx): State<Arc<Context>>,
    headers: HeaderMap,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<Value>, CoreError> {
    let caller = caller(&headers).await;
    let result = ctx
        .submit(Command::CreateProject {
            idempotency_key: Uuid::now_v7(),
            name: body.name,
            author: caller.author,
        })
        .await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct CreateRepositoryRequest {
    name: String,
}

async fn create_repository(
    State(ctx): State<Arc<Context>>,
    AxumPath(project): AxumPath<String>,
    headers: HeaderMap,
    Json(body): Json<CreateRepositoryRequest>,
) -> Result<Json<Value>, CoreError> {
    let caller = caller(&headers).await;
    let result = ctx
        .submit(Command::CreateRepository {
            idempotency_key: Uuid::now_v7(),
            project,
            name: body.name,
            author: caller.author,
        })
        .await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct RevisionQueryParams {
    #[serde(default)]
    revision: i64,
    #[serde(rename = "jsonpath", default)]
    jsonpath: Vec<String>,
}

async fn get_entry(
    State(ctx): State<Arc<Context>>,
    AxumPath((project, repo, path)): AxumPath<(String, String, String)>,
    AxumQuery(params): AxumQuery<RevisionQueryParams>,
) -> Result<Json<Value>, CoreError> {
    let root = ctx.projects.repository_root(&project, &repo)?;
    let repository = crate::repository::Repository::open(root)?;
    let full_path = format!("/{path}");
    let query = if params.jsonpath.is_empty() {
        Query::Identity { path: full_path }
    } else {
        Query::JsonPath {
            path: full_path,
            expressions: params.jsonpath,
        }
    };

    let cache_key = crate::cache::CacheKey {
        project: project.clone(),
        repository: repo.clone(),
        revision: repository.normalize(params.revision)?,
        fingerprint: format!("{:?}", query),
    };
    let value = ctx
        .cache
        .get_or_compute(cache_key, || async { repository.get(params.revision, &query) })
        .await?;
    Ok(Json(value))
}

#[derive(Deserialize)]
struct ListQueryParams {
    #[serde(default = "default_pattern")]
    #[serde(rename = "pathPattern")]
    path_pattern: String,
    #[serde(default)]
    revision: i64,
}

fn default_pattern() -> String {
    "/**".to_string()
}

async fn find_entries(
    State(ctx): State<Arc<Context>>,
    AxumPath((project, repo)): AxumPath<(String, String)>,
    AxumQuery(params): AxumQuery<ListQueryParams>,
) -> Result<Json<Value>, CoreError> {
    let root = ctx.projects.repository_root(&project, &repo)?;
    let repository = crate::repository::Repository::open(root)?;
    let entries = repository.find(params.revision, &params.path_pattern)?;
    let entries: BTreeMap<&String, &crate::repository::change::Entry> = entries.iter().collect();
    Ok(Json(json!({"entries": entries})))
}

#[derive(Deserialize)]
struct HistoryQueryParams {
    #[serde(default)]
    from: i64,
    #[serde(default)]
    to: i64,
    #[serde(default = "default_pattern", rename = "pathPattern")]
    path_pattern: String,
    #[serde(default = "default_max_commits", rename = "maxCommits")]
    max_commits: usize,
}

fn default_max_commits() -> usize {
    100
}

async fn history(
    State(ctx): State<Arc<Context>>,
    AxumPath((project, repo)): AxumPath<(String, String)>,
    AxumQuery(params): AxumQuery<HistoryQueryParams>,
) -> Result<Json<Value>, CoreError> {
    let root = ctx.projects.repository_root(&project, &repo)?;
    let repository = crate::repository::Repository::open(root)?;
    let commits = repository.history(params.from, params.to, &params.path_pattern, params.max_commits)?;
    let commits: Vec<Value> = commits
        .into_iter()
        .map(|c| {
            json!({
                "revision": c.revision,
                "author": c.author,
                "timestampMs": c.timestamp_ms,
                "summary": c.summary,
                "detail": c.detail,
                "changes": c.changes,
            })
        })
        .collect();
    Ok(Json(json!({"commits": commits})))
}

#[derive(Deserialize)]
struct PushRequest {
    #[serde(default, rename = "baseRevision")]
    base_revision: i64,
    summary: String,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    markup: Markup,
    changes: Vec<Change>,
}

async fn push(
    State(ctx): State<Arc<Context>>,
    AxumPath((project, repo)): AxumPath<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<PushRequest>,
) -> Result<Json<Value>, CoreError> {
    let caller = caller(&headers).await;
    let result = ctx
        .submit(Command::Push {
            idempotency_key: Uuid::now_v7(),
            project,
            repository: repo,
            base_revision: body.base_revision,
            author: caller.author,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            summary: body.summary,
            detail: body.detail,
            markup: body.markup,
            changes: body.changes,
        })
        .await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct WatchQueryParams {
    #[serde(default)]
    revision: i64,
    #[serde(default = "default_pattern", rename = "pathPattern")]
    path_pattern: String,
    #[serde(default = "default_timeout_millis", rename = "timeoutMillis")]
    timeout_millis: u64,
    #[serde(default, rename = "notifyOnMissing")]
    notify_on_missing: bool,
}

fn default_timeout_millis() -> u64 {
    60_000
}

async fn watch(
    State(ctx): State<Arc<Context>>,
    AxumPath((project, repo)): AxumPath<(String, String)>,
    AxumQuery(params): AxumQuery<WatchQueryParams>,
) -> Result<Json<Value>, CoreError> {
    let root = ctx.projects.repository_root(&project, &repo)?;
    let repository = crate::repository::Repository::open(root)?;
    let result = ctx
        .notifier
        .wait_for_change(
            &repository,
            &project,
            &repo,
            params.revision,
            &params.path_pattern,
            Duration::from_millis(params.timeout_millis),
            params.notify_on_missing,
        )
        .await?;
    Ok(Json(json!({"revision": result})))
}

#[derive(Deserialize)]
struct MergeQueryParams {
    #[serde(default)]
    revision: i64,
    paths: Vec<String>,
    #[serde(default, rename = "optionalPaths")]
    optional_paths: Vec<String>,
}

async fn merge(
    State(ctx): State<Arc<Context>>,
    AxumPath((project, repo)): AxumPath<(String, String)>,
    AxumQuery(params): AxumQuery<MergeQueryParams>,
) -> Result<Json<Value>, CoreError> {
    let root = ctx.projects.repository_root(&project, &repo)?;
    let repository = crate::repository::Repository::open(root)?;
    let merged = repository.merge_files(params.revision, &params.paths, &params.optional_paths)?;
    Ok(Json(merged))
}
