//! Leader election as a seam: exactly one replica may append to the
//! replication log at a time, but how that's decided (a quorum store, a
//! lease service) is out of scope for this crate. [`SingleReplicaElector`]
//! is the only implementation shipped here, for `replication.method: NONE`,
//! where the question never has a competing answer.

use async_trait::async_trait;
use tokio::sync::Notify;

#[async_trait]
pub trait LeaderElector: Send + Sync {
    async fn start(&self);
    async fn stop(&self);
    fn is_leader(&self) -> bool;
    fn leader_id(&self) -> Option<String>;

    /// Called once this replica becomes leader; the executor resumes
    /// accepting writes after this returns.
    async fn on_take_leadership(&self) {}

    /// Called once this replica stops being leader; the executor should
    /// stop accepting new writes and let in-flight ones drain.
    async fn on_release_leadership(&self) {}
}

/// Always-leader elector for a standalone replica: there is nobody else to
/// contend with, so leadership is granted unconditionally on `start`.
pub struct SingleReplicaElector {
    replica_id: String,
    leading: std::sync::atomic::AtomicBool,
    ready: Notify,
}

impl SingleReplicaElector {
    pub fn new(replica_id: String) -> SingleReplicaElector {
        SingleReplicaElector {
            replica_id,
            leading: std::sync::atomic::AtomicBool::new(false),
            ready: Notify::new(),
        }
    }

    /// Resolves once leadership has been granted; callers that must not
    /// accept writes before then should await this.
    pub async fn wait_until_leader(&self) {
        if self.is_leader() {
            return;
        }
        self.ready.notified().await;
    }
}

#[async_trait]
impl LeaderElector for SingleReplicaElector {
    async fn start(&self) {
        self.leading.store(true, std::sync::atomic::Ordering::SeqCst);
        self.ready.notify_waiters();
        self.on_take_leadership().await;
    }

    async fn stop(&self) {
        self.leading.store(false, std::sync::atomic::Ordering::SeqCst);
        self.on_release_leadership().await;
    }

    fn is_leader(&self) -> bool {
        self.leading.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn leader_id(&self) -> Option<String> {
        self.is_leader().then(|| self.replica_id.clone())
    }
}
