use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Counts outstanding storage workers so shutdown can wait for them to
/// drain. A worker registers on spawn and deregisters via `ShutdownGuard`'s
/// drop, so a panicking worker still releases its slot.
#[derive(Clone)]
pub struct WaitGroup {
    count: Arc<AtomicI64>,
    notify: Arc<Notify>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicI64::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Register one outstanding worker. Hold the returned guard for the
    /// lifetime of the work; dropping it (including via panic unwind)
    /// deregisters.
    pub fn guard(&self) -> ShutdownGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        ShutdownGuard {
            count: self.count.clone(),
            notify: self.notify.clone(),
        }
    }

    /// Wait until the count reaches zero, or `timeout` elapses. Returns
    /// true if the count drained in time.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drain = async {
            loop {
                let notified = self.notify.notified();
                if self.count.load(Ordering::SeqCst) == 0 {
                    return;
                }
                notified.await;
            }
        };

        tokio::time::timeout(timeout, drain).await.is_ok()
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ShutdownGuard {
    count: Arc<AtomicI64>,
    notify: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }
}

/// Owns the root cancellation signal and the processor's wait-group.
pub struct Lifecycle {
    pub cancel: CancellationToken,
    pub wait_group: WaitGroup,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            wait_group: WaitGroup::new(),
        }
    }

    /// Trigger cancellation, then wait for outstanding storage workers to
    /// drain or for `timeout` to elapse. Returns whether the drain
    /// completed in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        self.wait_group.wait_for_drain(timeout).await
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
