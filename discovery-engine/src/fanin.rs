use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::active_users::{ActiveUsers, PolledItem};

/// A freshly-built merge of every currently-active poller's output.
/// `forwarders` must be aborted before the handle is dropped if the
/// consumer is discarding it for a rebuild rather than letting it drain
/// naturally; otherwise the in-flight `recv` on a soon-to-be-stale
/// receiver lock simply keeps running harmlessly until the channel closes.
pub struct Merged {
    pub output: mpsc::Receiver<PolledItem>,
    pub forwarders: Vec<JoinHandle<()>>,
}

impl Merged {
    pub fn abort(&self) {
        for handle in &self.forwarders {
            handle.abort();
        }
    }
}

/// Snapshot the active-user map and build a fresh merged stream. One
/// forwarder task is spawned per active user; the merged output closes on
/// its own once every forwarder has ended, because each forwarder holds
/// its own clone of the sender and nothing else does.
///
/// The merged output's capacity is 1; tokio's `mpsc` has no true
/// zero-capacity channel, so this is the closest analogue to the
/// unbuffered stream the contract calls for: a forwarder's send completes
/// only once the processor is ready to take the item.
pub fn build(active: &ActiveUsers) -> Merged {
    let (tx, rx) = mpsc::channel(1);

    let forwarders = active
        .iter()
        .map(|entry| {
            let receiver = entry.value().receiver.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    let item = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    match item {
                        Some(item) => {
                            if tx.send(item).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
            })
        })
        .collect();

    drop(tx);

    Merged {
        output: rx,
        forwarders,
    }
}
