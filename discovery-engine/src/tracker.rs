use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use discovery_types::{Provider, ProviderUser, Store};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::active_users::{ActiveUsers, PollerHandle};
use crate::poller;

/// A membership change discovered by an incremental reconciliation tick.
pub enum MembershipEvent {
    Add(ProviderUser),
    Remove(Uuid),
}

/// Parameters a freshly-added poller is spawned with.
#[derive(Clone)]
pub struct PollerParams {
    pub poll_interval: Duration,
    pub jitter_max: Duration,
    pub channel_buffer: usize,
}

fn spawn_poller(
    store_user: discovery_types::User,
    provider: Arc<dyn Provider>,
    store: Arc<dyn Store>,
    params: &PollerParams,
    parent_cancel: &CancellationToken,
) -> PollerHandle {
    let cancel = parent_cancel.child_token();
    let (tx, rx) = mpsc::channel(params.channel_buffer);
    let handle = PollerHandle {
        user: store_user.clone(),
        cancel: cancel.clone(),
        receiver: Arc::new(Mutex::new(rx)),
    };
    tokio::spawn(poller::run(
        store_user,
        provider,
        store,
        params.poll_interval,
        params.jitter_max,
        tx,
        cancel,
    ));
    handle
}

/// One reconciliation pass: fetches the provider's user list and upserts
/// each into the store. Provider failures abandon the whole tick (logged,
/// retried next time); per-user store failures are logged and skipped.
async fn fetch_and_upsert(
    tenant_id: &str,
    provider: &Arc<dyn Provider>,
    store: &Arc<dyn Store>,
) -> Vec<(ProviderUser, discovery_types::User)> {
    let provider_users = match provider.get_users(tenant_id).await {
        Ok(users) => users,
        Err(err) => {
            tracing::warn!(error = %err, "provider user-list fetch failed, retrying next tick");
            return Vec::new();
        }
    };

    let mut resolved = Vec::with_capacity(provider_users.len());
    for provider_user in provider_users {
        match store.upsert_user_by_email(&provider_user.email).await {
            Ok(store_user) => resolved.push((provider_user, store_user)),
            Err(err) => {
                tracing::warn!(email = %provider_user.email, error = %err, "user upsert failed, skipping this tick");
            }
        }
    }
    resolved
}

/// The user tracker: reconciles the provider's user set against the
/// active-user map at `rescan_interval`. The first tick registers all
/// users synchronously and fires one pulse; every later tick sends
/// `AddUser`/`RemoveUser` events for the membership maintainer to apply.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    tenant_id: String,
    provider: Arc<dyn Provider>,
    store: Arc<dyn Store>,
    active: Arc<ActiveUsers>,
    events_tx: mpsc::UnboundedSender<MembershipEvent>,
    pulse: Arc<Notify>,
    rescan_interval: Duration,
    params: PollerParams,
    cancel: CancellationToken,
) {
    let resolved = fetch_and_upsert(&tenant_id, &provider, &store).await;
    for (_, store_user) in &resolved {
        if active.contains_key(&store_user.id) {
            continue;
        }
        let handle = spawn_poller(
            store_user.clone(),
            provider.clone(),
            store.clone(),
            &params,
            &cancel,
        );
        active.insert(store_user.id, handle);
    }
    pulse.notify_one();

    loop {
        tokio::select! {
            _ = tokio::time::sleep(rescan_interval) => {}
            _ = cancel.cancelled() => return,
        }

        let resolved = fetch_and_upsert(&tenant_id, &provider, &store).await;
        let listed: HashSet<Uuid> = resolved.iter().map(|(_, u)| u.id).collect();

        for (provider_user, store_user) in resolved {
            if !active.contains_key(&store_user.id) {
                let _ = events_tx.send(MembershipEvent::Add(provider_user));
            }
        }

        let stale: Vec<Uuid> = active
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| !listed.contains(id))
            .collect();
        for id in stale {
            let _ = events_tx.send(MembershipEvent::Remove(id));
        }
    }
}

/// Drains membership events and applies them to the active-user map,
/// spawning or cancelling pollers as needed, then pulses the fan-in
/// builder once per event.
pub async fn run_maintainer(
    mut events_rx: mpsc::UnboundedReceiver<MembershipEvent>,
    active: Arc<ActiveUsers>,
    provider: Arc<dyn Provider>,
    store: Arc<dyn Store>,
    params: PollerParams,
    pulse: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            event = events_rx.recv() => event,
            _ = cancel.cancelled() => return,
        };

        let Some(event) = event else { return };

        match event {
            MembershipEvent::Add(provider_user) => {
                let store_user = match store.upsert_user_by_email(&provider_user.email).await {
                    Ok(user) => user,
                    Err(err) => {
                        tracing::warn!(email = %provider_user.email, error = %err, "user upsert failed while applying AddUser");
                        continue;
                    }
                };
                if active.contains_key(&store_user.id) {
                    continue;
                }
                let handle = spawn_poller(
                    store_user.clone(),
                    provider.clone(),
                    store.clone(),
                    &params,
                    &cancel,
                );
                active.insert(store_user.id, handle);
            }
            MembershipEvent::Remove(id) => {
                if let Some((_, handle)) = active.remove(&id) {
                    handle.cancel.cancel();
                }
            }
        }

        pulse.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use dashmap::DashMap;
    use discovery_types::ProviderUser;

    use super::*;
    use crate::testing::{FakeProvider, FakeStore};

    fn provider_user(email: &str) -> ProviderUser {
        ProviderUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: None,
            tenant_id: "tenant-a".into(),
            active: true,
            created_at: Utc::now(),
        }
    }

    fn params() -> PollerParams {
        PollerParams {
            poll_interval: Duration::from_secs(3600),
            jitter_max: Duration::from_millis(1),
            channel_buffer: 8,
        }
    }

    #[tokio::test]
    async fn initial_tick_registers_all_users_and_pulses_once() {
        let provider: Arc<dyn Provider> =
            Arc::new(FakeProvider::with_users(vec![provider_user("a@x"), provider_user("b@x")]));
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let active: Arc<ActiveUsers> = Arc::new(DashMap::new());
        let pulse = Arc::new(Notify::new());
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let notified = pulse.notified();

        let run_cancel = cancel.clone();
        let tracker = tokio::spawn(run(
            "tenant-a".into(),
            provider,
            store,
            active.clone(),
            events_tx,
            pulse.clone(),
            Duration::from_secs(3600),
            params(),
            run_cancel,
        ));

        tokio::time::timeout(Duration::from_secs(1), notified)
            .await
            .expect("initial pulse should fire promptly");

        assert_eq!(active.len(), 2);

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(1), tracker).await;
    }

    #[tokio::test]
    async fn maintainer_applies_add_and_remove_events() {
        let provider: Arc<dyn Provider> = Arc::new(FakeProvider::new());
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let active: Arc<ActiveUsers> = Arc::new(DashMap::new());
        let pulse = Arc::new(Notify::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let maintainer = tokio::spawn(run_maintainer(
            events_rx,
            active.clone(),
            provider,
            store,
            params(),
            pulse.clone(),
            cancel.clone(),
        ));

        let added = provider_user("new@x");
        events_tx.send(MembershipEvent::Add(added)).unwrap();
        tokio::time::timeout(Duration::from_secs(1), pulse.notified())
            .await
            .expect("add should pulse");
        assert_eq!(active.len(), 1);

        let id = *active.iter().next().unwrap().key();
        events_tx.send(MembershipEvent::Remove(id)).unwrap();
        tokio::time::timeout(Duration::from_secs(1), pulse.notified())
            .await
            .expect("remove should pulse");
        assert_eq!(active.len(), 0);

        drop(events_tx);
        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(1), maintainer).await;
    }
}
