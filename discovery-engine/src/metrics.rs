use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Process-local counters. Per-user counts are incremented only when a
/// fingerprint is stored for the first time anywhere in the process; they
/// are a read-side view for reporting, not a persistence mechanism.
#[derive(Default)]
pub struct Metrics {
    emails_discovered: AtomicU64,
    emails_to_queue: AtomicU64,
    per_user_discovered: DashMap<Uuid, u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly-unique email discovered for `user_id`.
    pub fn record_new_email(&self, user_id: Uuid) {
        self.emails_discovered.fetch_add(1, Ordering::Relaxed);
        *self.per_user_discovered.entry(user_id).or_insert(0) += 1;
    }

    /// Record a fire-and-forget downstream hand-off.
    pub fn record_queued(&self) {
        self.emails_to_queue.fetch_add(1, Ordering::Relaxed);
    }

    pub fn emails_discovered(&self) -> u64 {
        self.emails_discovered.load(Ordering::Relaxed)
    }

    pub fn emails_to_queue(&self) -> u64 {
        self.emails_to_queue.load(Ordering::Relaxed)
    }

    /// The `n` users with the highest discovered count, descending.
    pub fn top_users(&self, n: usize) -> Vec<(Uuid, u64)> {
        let mut all: Vec<(Uuid, u64)> = self
            .per_user_discovered
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        all.sort_by(|a, b| b.1.cmp(&a.1));
        all.truncate(n);
        all
    }
}

/// Emits a summary log line every `5s ± 1s`, jittered to avoid lining up
/// with other periodic tasks. Pure read-side: never touches the active-user
/// map or the store.
pub async fn run(metrics: std::sync::Arc<Metrics>, cancel: CancellationToken) {
    loop {
        let jitter_millis = rand::random::<u64>() % 2000;
        let interval = Duration::from_millis(4000 + jitter_millis);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => return,
        }

        let top = metrics.top_users(3);
        tracing::info!(
            emails_discovered = metrics.emails_discovered(),
            emails_to_queue = metrics.emails_to_queue(),
            top_users = ?top,
            "discovery engine metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_users_sorted_descending() {
        let metrics = Metrics::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        for _ in 0..5 {
            metrics.record_new_email(a);
        }
        for _ in 0..2 {
            metrics.record_new_email(b);
        }
        metrics.record_new_email(c);

        let top = metrics.top_users(2);
        assert_eq!(top[0], (a, 5));
        assert_eq!(top[1], (b, 2));
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_new_email(Uuid::new_v4());
        metrics.record_new_email(Uuid::new_v4());
        metrics.record_queued();
        assert_eq!(metrics.emails_discovered(), 2);
        assert_eq!(metrics.emails_to_queue(), 1);
    }
}
