use std::sync::Arc;

use chrono::{DateTime, Utc};
use discovery_types::{Email, EmailInsertOutcome, ProviderEmail, Store, StoreError};
use sha2::{Digest, Sha256};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::active_users::ActiveUsers;
use crate::fanin;
use crate::lifecycle::WaitGroup;
use crate::metrics::Metrics;

fn fingerprint(body: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hasher.finalize().into()
}

/// Resolves canonical identity for one email per the dedup protocol: a
/// pre-existing fingerprint wins over the incoming message id.
async fn resolve_identity(
    store: &Arc<dyn Store>,
    id: Uuid,
    fingerprint: [u8; 32],
    received_at: DateTime<Utc>,
) -> Result<EmailInsertOutcome, StoreError> {
    if let Some(existing) = store.get_email_by_fingerprint(&fingerprint).await? {
        return Ok(EmailInsertOutcome {
            email: existing,
            is_new: false,
        });
    }
    store.insert_email(id, fingerprint, received_at).await
}

/// One item's full store protocol, run on its own short-lived task. Holds
/// `_guard` until every step has returned so the wait-group only ever
/// counts outstanding storage work, never in-flight provider calls.
async fn handle_item(
    email: ProviderEmail,
    user_id: Uuid,
    store: Arc<dyn Store>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
    _guard: crate::lifecycle::ShutdownGuard,
) {
    if cancel.is_cancelled() {
        return;
    }

    let id = match Uuid::parse_str(&email.message_id) {
        Ok(id) => id,
        Err(_) => {
            tracing::warn!(message_id = %email.message_id, "malformed message id from provider, skipping");
            return;
        }
    };

    let fp = fingerprint(&email.body);

    let outcome: EmailInsertOutcome = match resolve_identity(&store, id, fp, email.received_at).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(user_id = %user_id, error = %err, "store step failed, email will be re-observed next poll");
            return;
        }
    };
    let canonical: Email = outcome.email;

    if let Err(err) = store.link_user_email(user_id, canonical.id).await {
        tracing::warn!(user_id = %user_id, email_id = %canonical.id, error = %err, "failed to link user to email");
    }

    let now = Utc::now();
    if let Err(err) = store.update_last_email_check(user_id, now).await {
        tracing::warn!(user_id = %user_id, error = %err, "failed to update last_email_check");
    }

    if outcome.is_new {
        if let Err(err) = store
            .update_last_email_received_if_newer(user_id, email.received_at)
            .await
        {
            tracing::warn!(user_id = %user_id, error = %err, "failed to update last_email_received");
        }
        metrics.record_new_email(user_id);
        metrics.record_queued();
    }
}

/// The processor: consumes the current merged stream, spawns one worker
/// per item, and rebuilds the merge whenever a pulse signals that
/// membership changed. A closed merged stream with no pending pulse means
/// the active-user set is empty; the processor waits rather than spins.
pub async fn run(
    active: Arc<ActiveUsers>,
    pulse: Arc<Notify>,
    store: Arc<dyn Store>,
    metrics: Arc<Metrics>,
    wait_group: WaitGroup,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let mut merged = fanin::build(&active);

        loop {
            tokio::select! {
                notified = pulse.notified() => {
                    let _ = notified;
                    merged.abort();
                    break;
                }
                item = merged.output.recv() => {
                    match item {
                        Some((email, user_id)) => {
                            let guard = wait_group.guard();
                            let store = store.clone();
                            let metrics = metrics.clone();
                            let item_cancel = cancel.clone();
                            tokio::spawn(handle_item(email, user_id, store, metrics, item_cancel, guard));
                        }
                        None => {
                            tokio::select! {
                                _ = pulse.notified() => {}
                                _ = cancel.cancelled() => return,
                            }
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    merged.abort();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::WaitGroup;
    use crate::testing::FakeStore;
    use chrono::Duration as ChronoDuration;

    fn email(message_id: &str, received_at: DateTime<Utc>, body: &[u8]) -> ProviderEmail {
        ProviderEmail {
            message_id: message_id.to_string(),
            user_id: Uuid::new_v4(),
            from: "sender@example.com".into(),
            to: vec!["recipient@example.com".into()],
            subject: "subject".into(),
            snippet: "snippet".into(),
            received_at,
            body: body.to_vec(),
        }
    }

    async fn run_item(store: &Arc<dyn Store>, metrics: &Arc<Metrics>, item: ProviderEmail, user_id: Uuid) {
        let wait_group = WaitGroup::new();
        let guard = wait_group.guard();
        handle_item(item, user_id, store.clone(), metrics.clone(), CancellationToken::new(), guard).await;
        assert!(wait_group.wait_for_drain(std::time::Duration::from_secs(1)).await);
    }

    // S1: two distinct message ids, one shared body. Exactly one Email row
    // survives. The fingerprint match on the second sighting wins identity,
    // so received_at stays at the first sighting's value rather than
    // advancing.
    #[tokio::test]
    async fn shared_body_two_ids_collapses_to_one_row() {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let metrics = Arc::new(Metrics::new());
        let user = store.upsert_user_by_email("a@x").await.unwrap();

        let t0 = Utc::now();
        let t1 = t0 + ChronoDuration::seconds(5);
        let id1 = "11111111-1111-1111-1111-111111111111";
        let id2 = "11111111-1111-1111-1111-111111111112";

        run_item(&store, &metrics, email(id1, t0, b"hi"), user.id).await;
        run_item(&store, &metrics, email(id2, t1, b"hi"), user.id).await;

        let fingerprint_val = super::fingerprint(b"hi");
        let stored = store.get_email_by_fingerprint(&fingerprint_val).await.unwrap().unwrap();
        assert_eq!(stored.received_at, t0);
        assert_eq!(metrics.emails_discovered(), 1);

        let updated_user = store.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(updated_user.last_email_received, Some(t0));
    }

    // S2: two users, same body, concurrent-ish processing. One Email row,
    // two user_emails links, one discovered count.
    #[tokio::test]
    async fn shared_body_two_users_links_both() {
        let fake_store = Arc::new(FakeStore::new());
        let store: Arc<dyn Store> = fake_store.clone();
        let metrics = Arc::new(Metrics::new());
        let u1 = store.upsert_user_by_email("u1@x").await.unwrap();
        let u2 = store.upsert_user_by_email("u2@x").await.unwrap();

        let t0 = Utc::now();
        let id1 = "22222222-2222-2222-2222-222222222221";
        let id2 = "22222222-2222-2222-2222-222222222222";

        run_item(&store, &metrics, email(id1, t0, b"z"), u1.id).await;
        run_item(&store, &metrics, email(id2, t0, b"z"), u2.id).await;

        assert_eq!(metrics.emails_discovered(), 1);
        assert_eq!(fake_store.email_count(), 1);
        assert_eq!(fake_store.user_email_count(), 2);
        assert_eq!(fake_store.user_snapshot(u1.id).unwrap().last_email_received, Some(t0));
        assert_eq!(fake_store.user_snapshot(u2.id).unwrap().last_email_received, Some(t0));
    }

    #[tokio::test]
    async fn malformed_message_id_is_skipped() {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let metrics = Arc::new(Metrics::new());
        let user = store.upsert_user_by_email("a@x").await.unwrap();

        run_item(&store, &metrics, email("not-a-uuid", Utc::now(), b"hi"), user.id).await;

        assert_eq!(metrics.emails_discovered(), 0);
    }

    #[tokio::test]
    async fn re_offering_same_email_does_not_double_count() {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let metrics = Arc::new(Metrics::new());
        let user = store.upsert_user_by_email("a@x").await.unwrap();
        let id = "33333333-3333-3333-3333-333333333333";
        let t0 = Utc::now();

        for _ in 0..3 {
            run_item(&store, &metrics, email(id, t0, b"same body"), user.id).await;
        }

        assert_eq!(metrics.emails_discovered(), 1);
    }

    #[tokio::test]
    async fn cancelled_worker_does_no_io() {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let metrics = Arc::new(Metrics::new());
        let user = store.upsert_user_by_email("a@x").await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let wait_group = WaitGroup::new();
        let guard = wait_group.guard();
        handle_item(
            email("44444444-4444-4444-4444-444444444444", Utc::now(), b"hi"),
            user.id,
            store.clone(),
            metrics.clone(),
            cancel,
            guard,
        )
        .await;

        assert_eq!(metrics.emails_discovered(), 0);
    }
}
