use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use discovery_types::{Provider, Store, User};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::active_users::PolledItem;
use crate::jitter;

/// Computes `received_after` per the poll contract: the last time a new
/// email was stored for the user, minus a one-second back-off; failing
/// that, the last time a poll completed; failing that, 24 hours ago.
fn received_after(user: &User, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(last_received) = user.last_email_received {
        last_received - chrono::Duration::seconds(1)
    } else if let Some(last_check) = user.last_email_check {
        last_check - chrono::Duration::seconds(1)
    } else {
        now - chrono::Duration::hours(24)
    }
}

/// Cooperative per-user poller. Waits out a deterministic staggered start,
/// then polls at `poll_interval` until cancelled. Every email produced is
/// pushed onto `tx`, blocking if the channel (and thus the rest of the
/// pipeline) is backed up; that block is the intended backpressure.
pub async fn run(
    initial_snapshot: User,
    provider: Arc<dyn Provider>,
    store: Arc<dyn Store>,
    poll_interval: Duration,
    jitter_max: Duration,
    tx: mpsc::Sender<PolledItem>,
    cancel: CancellationToken,
) {
    let delay = jitter::initial_delay(initial_snapshot.id, jitter_max);
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = cancel.cancelled() => return,
    }

    if !poll_once(&initial_snapshot, &provider, &store, &tx, &cancel).await {
        return;
    }

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.tick().await; // interval fires immediately; we already polled above

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !poll_once(&initial_snapshot, &provider, &store, &tx, &cancel).await {
                    return;
                }
            }
            _ = cancel.cancelled() => return,
        }
    }
}

/// Runs one poll cycle. Returns `false` if the output channel is closed
/// (the user was removed) and the poller should stop.
async fn poll_once(
    initial_snapshot: &User,
    provider: &Arc<dyn Provider>,
    store: &Arc<dyn Store>,
    tx: &mpsc::Sender<PolledItem>,
    cancel: &CancellationToken,
) -> bool {
    let user = match store.get_user(initial_snapshot.id).await {
        Ok(Some(user)) => user,
        Ok(None) => initial_snapshot.clone(),
        Err(err) => {
            tracing::warn!(user_id = %initial_snapshot.id, error = %err, "store read failed, falling back to initial snapshot");
            initial_snapshot.clone()
        }
    };

    let now = Utc::now();
    let after = received_after(&user, now);

    let emails = match provider.get_emails(user.id, after).await {
        Ok(emails) => emails,
        Err(err) => {
            tracing::warn!(user_id = %user.id, error = %err, "provider poll failed, will retry next tick");
            return true;
        }
    };

    for email in emails {
        tokio::select! {
            result = tx.send((email, user.id)) => {
                if result.is_err() {
                    return false;
                }
            }
            _ = cancel.cancelled() => return true,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProvider, FakeStore};
    use chrono::Duration as ChronoDuration;
    use discovery_types::ProviderEmail;

    fn user_with(
        last_received: Option<DateTime<Utc>>,
        last_check: Option<DateTime<Utc>>,
    ) -> User {
        User {
            id: uuid::Uuid::new_v4(),
            email: "a@x".into(),
            last_email_check: last_check,
            last_email_received: last_received,
        }
    }

    #[test]
    fn prefers_last_received_minus_one_second() {
        let now = Utc::now();
        let received = now - ChronoDuration::hours(1);
        let user = user_with(Some(received), Some(now));
        assert_eq!(received_after(&user, now), received - ChronoDuration::seconds(1));
    }

    #[test]
    fn falls_back_to_last_check_minus_one_second() {
        let now = Utc::now();
        let checked = now - ChronoDuration::minutes(5);
        let user = user_with(None, Some(checked));
        assert_eq!(received_after(&user, now), checked - ChronoDuration::seconds(1));
    }

    #[test]
    fn falls_back_to_24_hours_ago() {
        let now = Utc::now();
        let user = user_with(None, None);
        assert_eq!(received_after(&user, now), now - ChronoDuration::hours(24));
    }

    #[tokio::test]
    async fn poll_once_forwards_provider_emails_to_the_channel() {
        let store: Arc<dyn Store> = Arc::new(FakeStore::new());
        let user = store.upsert_user_by_email("a@x").await.unwrap();

        let provider = FakeProvider::new();
        provider.push_email(
            user.id,
            ProviderEmail {
                message_id: uuid::Uuid::new_v4().to_string(),
                user_id: user.id,
                from: "sender@example.com".into(),
                to: vec!["a@x".into()],
                subject: "hello".into(),
                snippet: "".into(),
                received_at: Utc::now(),
                body: b"hi".to_vec(),
            },
        );
        let provider: Arc<dyn Provider> = Arc::new(provider);

        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let sent = poll_once(&user, &provider, &store, &tx, &cancel).await;
        assert!(sent);

        let (email, user_id) = rx.try_recv().unwrap();
        assert_eq!(user_id, user.id);
        assert_eq!(email.body, b"hi");
    }
}
