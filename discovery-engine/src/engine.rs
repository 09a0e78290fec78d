use std::sync::Arc;

use dashmap::DashMap;
use discovery_types::{Provider, Store};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::lifecycle::Lifecycle;
use crate::metrics::{self, Metrics};
use crate::processor;
use crate::tracker::{self, PollerParams};

/// Wires together the tracker, its membership maintainer, the processor
/// and the metrics reporter under one lifecycle, and runs them until
/// `shutdown` is called.
pub struct Engine {
    lifecycle: Arc<Lifecycle>,
    metrics: Arc<Metrics>,
}

impl Engine {
    /// Spawns every long-running task and returns immediately; the caller
    /// decides when to call `shutdown`.
    pub fn spawn(config: &Config, provider: Arc<dyn Provider>, store: Arc<dyn Store>) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        let metrics = Arc::new(Metrics::new());
        let active = Arc::new(DashMap::new());
        let pulse = Arc::new(Notify::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let params = PollerParams {
            poll_interval: config.polling_interval,
            jitter_max: config.jitter_max,
            channel_buffer: config.channel_buffer,
        };

        tokio::spawn(tracker::run(
            config.tenant_id.clone(),
            provider.clone(),
            store.clone(),
            active.clone(),
            events_tx,
            pulse.clone(),
            config.user_rescan_interval,
            params.clone(),
            lifecycle.cancel.clone(),
        ));

        tokio::spawn(tracker::run_maintainer(
            events_rx,
            active.clone(),
            provider,
            store.clone(),
            params,
            pulse.clone(),
            lifecycle.cancel.clone(),
        ));

        tokio::spawn(processor::run(
            active,
            pulse,
            store,
            metrics.clone(),
            lifecycle.wait_group.clone(),
            lifecycle.cancel.clone(),
        ));

        tokio::spawn(metrics::run(metrics.clone(), lifecycle.cancel.clone()));

        Self { lifecycle, metrics }
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.lifecycle.cancel.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Cancels every task and waits for outstanding storage workers to
    /// drain, or for `timeout` to elapse. Returns whether the drain
    /// completed.
    pub async fn shutdown(&self, timeout: std::time::Duration) -> bool {
        self.lifecycle.shutdown(timeout).await
    }
}
