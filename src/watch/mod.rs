//! Watch fan-out: lets a caller long-poll for the next commit touching a
//! path pattern instead of re-polling `history`. One [`tokio::sync::watch`]
//! channel per repository carries only the latest known revision — there
//! is no per-waiter queue, so a waiter that's been away for ten commits
//! just sees "revision moved, go re-run your query" rather than replaying
//! every commit in between.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::watch;

use crate::errors::CoreError;
use crate::internal::object::commit::Change;
use crate::repository::{pattern, Repository};

pub struct Notifier {
    channels: RwLock<HashMap<(String, String), watch::Sender<i64>>>,
}

impl Notifier {
    pub fn new() -> Notifier {
        Notifier {
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn channel(&self, project: &str, repository: &str) -> watch::Receiver<i64> {
        if let Some(sender) = self.channels.read().unwrap().get(&(project.to_string(), repository.to_string())) {
            return sender.subscribe();
        }
        let mut channels = self.channels.write().unwrap();
        channels
            .entry((project.to_string(), repository.to_string()))
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    /// Called by the executor right after a commit lands.
    pub fn notify(&self, project: &str, repository: &str, revision: i64) {
        let key = (project.to_string(), repository.to_string());
        let channels = self.channels.read().unwrap();
        if let Some(sender) = channels.get(&key) {
            let _ = sender.send(revision);
            return;
        }
        drop(channels);
        let mut channels = self.channels.write().unwrap();
        let sender = channels.entry(key).or_insert_with(|| watch::channel(0).0);
        let _ = sender.send(revision);
    }

    /// Waits for the first commit after `since_revision` touching
    /// `path_pattern`, up to `timeout`. Returns `None` on timeout (the
    /// long-poll's "nothing changed" response) rather than an error. If
    /// `notify_on_missing` is set, fails with `CoreError::NotFound` as soon
    /// as `path_pattern` names no entry — at registration or at any
    /// subsequent wake-up — rather than waiting out the full timeout.
    pub async fn wait_for_change(
        &self,
        repo: &Repository,
        project: &str,
        repository: &str,
        since_revision: i64,
        path_pattern: &str,
        timeout: Duration,
        notify_on_missing: bool,
    ) -> Result<Option<i64>, CoreError> {
        let mut rx = self.channel(project, repository);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let current = repo.head_revision()?;
            if notify_on_missing && repo.find(current, path_pattern)?.is_empty() {
                return Err(CoreError::not_found(format!("`{path_pattern}`")));
            }
            if current > since_revision {
                let matched = repo
                    .history(current, since_revision + 1, path_pattern, usize::MAX)?
                    .into_iter()
                    .any(|entry| entry.changes.iter().any(|c| pattern::matches(path_pattern, change_path(c))));
                if matched {
                    return Ok(Some(current));
                }
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match tokio::time::timeout(remaining, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return Ok(None),
                Err(_) => return Ok(None),
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Notifier {
        Notifier::new()
    }
}

fn change_path(change: &Change) -> &str {
    change.path()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::object::commit::Markup;
    use tempfile::tempdir;

    #[tokio::test]
    async fn wait_for_change_returns_immediately_when_already_ahead() {
        let dir = tempdir().unwrap();
        let repo = Repository::open(dir.path()).unwrap();
        repo.commit(
            0,
            "alice".to_string(),
            0,
            "init".to_string(),
            String::new(),
            Markup::Plaintext,
            vec![Change::UpsertJson {
                path: "/a.json".to_string(),
                content: serde_json::json!({"k": 1}),
            }],
        )
        .unwrap();

        let notifier = Notifier::new();
        let result = notifier
            .wait_for_change(&repo, "p", "r", 0, "/a.json", Duration::from_millis(500), false)
            .await
            .unwrap();
        assert_eq!(result, Some(1));
    }

    #[tokio::test]
    async fn wait_for_change_times_out_when_nothing_happens() {
        let dir = tempdir().unwrap();
        let repo = Repository::open(dir.path()).unwrap();
        let notifier = Notifier::new();
        let result = notifier
            .wait_for_change(&repo, "p", "r", 0, "/a.json", Duration::from_millis(50), false)
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn notify_on_missing_fails_fast_when_path_absent() {
        let dir = tempdir().unwrap();
        let repo = Repository::open(dir.path()).unwrap();
        repo.commit(
            0,
            "alice".to_string(),
            0,
            "init".to_string(),
            String::new(),
            Markup::Plaintext,
            vec![Change::UpsertJson {
                path: "/other.json".to_string(),
                content: serde_json::json!({"k": 1}),
            }],
        )
        .unwrap();

        let notifier = Notifier::new();
        let result = notifier
            .wait_for_change(&repo, "p", "r", 0, "/missing.json", Duration::from_millis(500), true)
            .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
