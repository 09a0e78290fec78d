use std::sync::Arc;

use dashmap::DashMap;
use discovery_types::{ProviderEmail, User};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One item flowing out of a per-user poller: the email plus the user it
/// was fetched for.
pub type PolledItem = (ProviderEmail, Uuid);

/// Everything the fan-in builder and the tracker need to know about one
/// active poller. The receiver is wrapped so a forwarder task can be
/// spawned, aborted and respawned across fan-in rebuilds without ever
/// taking the channel itself out of the map; the poller on the other end
/// never needs to know a rebuild happened.
pub struct PollerHandle {
    pub user: User,
    pub cancel: CancellationToken,
    pub receiver: Arc<Mutex<mpsc::Receiver<PolledItem>>>,
}

/// Concurrent map of user-id to poller handle, mutated by the user tracker
/// and its membership maintainer, read by the fan-in builder. Per-key
/// operations on a `DashMap` are independently serialized, so no
/// additional locking is needed across the whole map.
pub type ActiveUsers = DashMap<Uuid, PollerHandle>;
