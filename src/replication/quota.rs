//! Per-repository write-rate quota: a token bucket refilled at
//! `write_quota_per_repository` tokens every `quota_window_millis`,
//! preventing one noisy repository from monopolizing the replication log.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::errors::CoreError;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Holds one token bucket per `(project, repository)`, created lazily on
/// first write.
pub struct WriteQuota {
    capacity: u32,
    window: Duration,
    buckets: DashMap<(String, String), Mutex<Bucket>>,
}

impl WriteQuota {
    pub fn new(capacity: u32, window_millis: u64) -> WriteQuota {
        WriteQuota {
            capacity,
            window: Duration::from_millis(window_millis),
            buckets: DashMap::new(),
        }
    }

    /// Consumes one token for `(project, repository)`, failing with
    /// `QuotaExceeded` if none are available.
    pub fn try_acquire(&self, project: &str, repository: &str) -> Result<(), CoreError> {
        let key = (project.to_string(), repository.to_string());
        let entry = self.buckets.entry(key).or_insert_with(|| {
            Mutex::new(Bucket {
                tokens: self.capacity as f64,
                last_refill: Instant::now(),
            })
        });
        let mut bucket = entry.lock().unwrap();

        let elapsed = bucket.last_refill.elapsed();
        let refill = elapsed.as_secs_f64() / self.window.as_secs_f64() * self.capacity as f64;
        if refill > 0.0 {
            bucket.tokens = (bucket.tokens + refill).min(self.capacity as f64);
            bucket.last_refill = Instant::now();
        }

        if bucket.tokens < 1.0 {
            return Err(CoreError::QuotaExceeded(format!(
                "write quota exceeded for {project}/{repository}"
            )));
        }
        bucket.tokens -= 1.0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausting_capacity_rejects_further_writes() {
        let quota = WriteQuota::new(2, 60_000);
        assert!(quota.try_acquire("p", "r").is_ok());
        assert!(quota.try_acquire("p", "r").is_ok());
        assert!(quota.try_acquire("p", "r").is_err());
    }

    #[test]
    fn separate_repositories_have_independent_buckets() {
        let quota = WriteQuota::new(1, 60_000);
        assert!(quota.try_acquire("p", "r1").is_ok());
        assert!(quota.try_acquire("p", "r2").is_ok());
    }
}
