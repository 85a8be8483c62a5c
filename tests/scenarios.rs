//! End-to-end scenarios exercising the public surface together: catalog,
//! commit engine, replication log, watch fan-out, merge, and quota.

use std::sync::Arc;

use confrepo_core::command::Command;
use confrepo_core::executor::CommandExecutor;
use confrepo_core::internal::object::commit::{Change, Markup};
use confrepo_core::project::ProjectManager;
use confrepo_core::replication::quota::WriteQuota;
use confrepo_core::replication::{ReplicationLog, StandaloneLog};
use confrepo_core::repository::query::Query;
use confrepo_core::repository::Repository;
use confrepo_core::watch::Notifier;
use serde_json::json;
use tempfile::tempdir;
use uuid::Uuid;

fn new_executor(dir: &std::path::Path) -> (CommandExecutor, Arc<Notifier>) {
    let projects = Arc::new(ProjectManager::open(dir).unwrap());
    let log: Arc<dyn ReplicationLog> = Arc::new(StandaloneLog::new());
    let notifier = Arc::new(Notifier::new());
    (
        CommandExecutor::new(projects, log, notifier.clone()),
        notifier,
    )
}

async fn submit(executor: &CommandExecutor, command: Command) -> serde_json::Value {
    executor.submit(command).await.unwrap().await.unwrap().unwrap()
}

async fn create_config_repository(executor: &CommandExecutor, project: &str) {
    submit(
        executor,
        Command::CreateRepository {
            idempotency_key: Uuid::now_v7(),
            project: project.to_string(),
            name: "config".to_string(),
            author: "alice".to_string(),
        },
    )
    .await;
}

#[tokio::test]
async fn create_project_push_then_list_entries() {
    let dir = tempdir().unwrap();
    let (executor, _notifier) = new_executor(dir.path());

    submit(
        &executor,
        Command::CreateProject {
            idempotency_key: Uuid::now_v7(),
            name: "demo".to_string(),
            author: "alice".to_string(),
        },
    )
    .await;
    create_config_repository(&executor, "demo").await;

    submit(
        &executor,
        Command::Push {
            idempotency_key: Uuid::now_v7(),
            project: "demo".to_string(),
            repository: "config".to_string(),
            base_revision: 0,
            author: "alice".to_string(),
            timestamp_ms: 0,
            summary: "add settings".to_string(),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes: vec![Change::UpsertJson {
                path: "/settings/app.json".to_string(),
                content: json!({"featureFlag": true}),
            }],
        },
    )
    .await;

    let repo = Repository::open(dir.path().join("demo").join("config")).unwrap();
    let found = repo.find(0, "/settings/**").unwrap();
    assert_eq!(found.len(), 1);
    assert!(found.contains_key("/settings/app.json"));
}

#[tokio::test]
async fn jsonpath_query_resolves_after_watch_reports_new_revision() {
    let dir = tempdir().unwrap();
    let (executor, notifier) = new_executor(dir.path());

    submit(
        &executor,
        Command::CreateProject {
            idempotency_key: Uuid::now_v7(),
            name: "demo".to_string(),
            author: "alice".to_string(),
        },
    )
    .await;
    create_config_repository(&executor, "demo").await;

    let repo = Repository::open(dir.path().join("demo").join("config")).unwrap();

    let wait = notifier.wait_for_change(
        &repo,
        "demo",
        "config",
        0,
        "/settings/**",
        std::time::Duration::from_secs(5),
        false,
    );

    submit(
        &executor,
        Command::Push {
            idempotency_key: Uuid::now_v7(),
            project: "demo".to_string(),
            repository: "config".to_string(),
            base_revision: 0,
            author: "alice".to_string(),
            timestamp_ms: 0,
            summary: "add settings".to_string(),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes: vec![Change::UpsertJson {
                path: "/settings/app.json".to_string(),
                content: json!({"limits": {"maxConnections": 10}}),
            }],
        },
    )
    .await;

    let observed = wait.await.unwrap();
    assert_eq!(observed, Some(2));

    let value = repo
        .get(
            0,
            &Query::JsonPath {
                path: "/settings/app.json".to_string(),
                expressions: vec!["$.limits.maxConnections".to_string()],
            },
        )
        .unwrap();
    assert_eq!(value, json!(10));
}

#[tokio::test]
async fn merge_files_reports_type_conflict_with_json_pointer() {
    let dir = tempdir().unwrap();
    let (executor, _notifier) = new_executor(dir.path());
    submit(
        &executor,
        Command::CreateProject {
            idempotency_key: Uuid::now_v7(),
            name: "demo".to_string(),
            author: "alice".to_string(),
        },
    )
    .await;
    create_config_repository(&executor, "demo").await;

    submit(
        &executor,
        Command::Push {
            idempotency_key: Uuid::now_v7(),
            project: "demo".to_string(),
            repository: "config".to_string(),
            base_revision: 0,
            author: "alice".to_string(),
            timestamp_ms: 0,
            summary: "base + override".to_string(),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes: vec![
                Change::UpsertJson {
                    path: "/base.json".to_string(),
                    content: json!({"db": {"host": "a", "port": 1}}),
                },
                Change::UpsertJson {
                    path: "/override.json".to_string(),
                    content: json!({"db": 5}),
                },
            ],
        },
    )
    .await;

    let repo = Repository::open(dir.path().join("demo").join("config")).unwrap();
    let result = repo.merge_files(0, &["/base.json".to_string(), "/override.json".to_string()], &[]);
    let err = result.unwrap_err().to_string();
    assert!(err.contains("/db"), "error was: {err}");
}

#[tokio::test]
async fn merge_files_reports_scalar_type_conflict_with_json_pointer() {
    let dir = tempdir().unwrap();
    let (executor, _notifier) = new_executor(dir.path());
    submit(
        &executor,
        Command::CreateProject {
            idempotency_key: Uuid::now_v7(),
            name: "demo".to_string(),
            author: "alice".to_string(),
        },
    )
    .await;
    create_config_repository(&executor, "demo").await;

    submit(
        &executor,
        Command::Push {
            idempotency_key: Uuid::now_v7(),
            project: "demo".to_string(),
            repository: "config".to_string(),
            base_revision: 0,
            author: "alice".to_string(),
            timestamp_ms: 0,
            summary: "three overlapping scalars".to_string(),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes: vec![
                Change::UpsertJson {
                    path: "/foo.json".to_string(),
                    content: json!({"a": "bar"}),
                },
                Change::UpsertJson {
                    path: "/foo2.json".to_string(),
                    content: json!({"a": "new_bar"}),
                },
                Change::UpsertJson {
                    path: "/foo10.json".to_string(),
                    content: json!({"a": 1}),
                },
            ],
        },
    )
    .await;

    let repo = Repository::open(dir.path().join("demo").join("config")).unwrap();
    let result = repo.merge_files(
        0,
        &["/foo.json".to_string(), "/foo2.json".to_string(), "/foo10.json".to_string()],
        &[],
    );
    let err = result.unwrap_err().to_string();
    assert!(err.contains("/a"), "error was: {err}");
    assert!(err.contains("number"), "error was: {err}");
    assert!(err.contains("string"), "error was: {err}");
}

#[tokio::test]
async fn concurrent_pushes_serialize_into_distinct_revisions() {
    let dir = tempdir().unwrap();
    let (executor, _notifier) = new_executor(dir.path());
    submit(
        &executor,
        Command::CreateProject {
            idempotency_key: Uuid::now_v7(),
            name: "demo".to_string(),
            author: "alice".to_string(),
        },
    )
    .await;
    create_config_repository(&executor, "demo").await;

    let repo = Arc::new(Repository::open(dir.path().join("demo").join("config")).unwrap());
    let mut handles = Vec::new();
    for i in 0..5 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let base = repo.head_revision().unwrap();
                let result = repo.commit(
                    base,
                    "writer".to_string(),
                    i,
                    format!("write {i}"),
                    String::new(),
                    Markup::Plaintext,
                    vec![Change::UpsertJson {
                        path: format!("/writer-{i}.json"),
                        content: json!({"i": i}),
                    }],
                );
                match result {
                    Ok(revision) => break revision,
                    Err(_) => continue,
                }
            }
        }));
    }

    let mut revisions: Vec<i64> = Vec::new();
    for handle in handles {
        revisions.push(handle.await.unwrap());
    }
    revisions.sort();
    assert_eq!(revisions, vec![2, 3, 4, 5, 6]);
    assert_eq!(repo.head_revision().unwrap(), 6);
}

#[tokio::test]
async fn write_quota_rejects_writes_past_the_bucket_capacity() {
    let quota = WriteQuota::new(2, 60_000);
    assert!(quota.try_acquire("demo", "meta").is_ok());
    assert!(quota.try_acquire("demo", "meta").is_ok());
    let result = quota.try_acquire("demo", "meta");
    assert!(result.is_err());
}

#[tokio::test]
async fn json_patch_change_modifies_existing_document_after_unremove() {
    let dir = tempdir().unwrap();
    let (executor, _notifier) = new_executor(dir.path());
    submit(
        &executor,
        Command::CreateProject {
            idempotency_key: Uuid::now_v7(),
            name: "demo".to_string(),
            author: "alice".to_string(),
        },
    )
    .await;
    create_config_repository(&executor, "demo").await;
    submit(
        &executor,
        Command::Push {
            idempotency_key: Uuid::now_v7(),
            project: "demo".to_string(),
            repository: "config".to_string(),
            base_revision: 0,
            author: "alice".to_string(),
            timestamp_ms: 0,
            summary: "seed".to_string(),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes: vec![Change::UpsertJson {
                path: "/settings/app.json".to_string(),
                content: json!({"featureFlag": false}),
            }],
        },
    )
    .await;

    submit(
        &executor,
        Command::RemoveProject {
            idempotency_key: Uuid::now_v7(),
            name: "demo".to_string(),
        },
    )
    .await;
    submit(
        &executor,
        Command::UnremoveProject {
            idempotency_key: Uuid::now_v7(),
            name: "demo".to_string(),
        },
    )
    .await;

    submit(
        &executor,
        Command::Push {
            idempotency_key: Uuid::now_v7(),
            project: "demo".to_string(),
            repository: "config".to_string(),
            base_revision: 0,
            author: "alice".to_string(),
            timestamp_ms: 1,
            summary: "flip flag via patch".to_string(),
            detail: String::new(),
            markup: Markup::Plaintext,
            changes: vec![Change::ApplyJsonPatch {
                path: "/settings/app.json".to_string(),
                content: json!([{"op": "replace", "path": "/featureFlag", "value": true}]),
            }],
        },
    )
    .await;

    let repo = Repository::open(dir.path().join("demo").join("config")).unwrap();
    let value = repo
        .get(0, &Query::Identity { path: "/settings/app.json".to_string() })
        .unwrap();
    assert_eq!(value, json!({"featureFlag": true}));
}
