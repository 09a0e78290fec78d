//! In-memory fakes for `Provider` and `Store`, used by this crate's own
//! tests and available to integration tests that want to drive the engine
//! against something other than Postgres.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use discovery_types::{
    Email, EmailInsertOutcome, Provider, ProviderEmail, ProviderError, ProviderUser, Store,
    StoreError, User,
};
use uuid::Uuid;

/// A provider whose user list and per-user email batches are fixed at
/// construction (or mutated directly through the `Mutex`-guarded fields in
/// tests that need to simulate membership changes mid-run).
#[derive(Default)]
pub struct FakeProvider {
    pub users: Mutex<Vec<ProviderUser>>,
    pub emails: Mutex<HashMap<Uuid, Vec<ProviderEmail>>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<ProviderUser>) -> Self {
        Self {
            users: Mutex::new(users),
            emails: Mutex::new(HashMap::new()),
        }
    }

    pub fn push_email(&self, user_id: Uuid, email: ProviderEmail) {
        self.emails.lock().unwrap().entry(user_id).or_default().push(email);
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn get_users(&self, tenant_id: &str) -> Result<Vec<ProviderUser>, ProviderError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn get_emails(
        &self,
        user_id: Uuid,
        received_after: DateTime<Utc>,
    ) -> Result<Vec<ProviderEmail>, ProviderError> {
        let mut emails: Vec<ProviderEmail> = self
            .emails
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|e| e.received_at >= received_after)
            .collect();
        emails.sort_by_key(|e| e.received_at);
        Ok(emails)
    }
}

#[derive(Default)]
struct FakeStoreState {
    users: HashMap<Uuid, User>,
    users_by_email: HashMap<String, Uuid>,
    emails_by_id: HashMap<Uuid, Email>,
    emails_by_fingerprint: HashMap<[u8; 32], Uuid>,
    user_emails: HashSet<(Uuid, Uuid)>,
}

/// A `Store` that keeps everything in a single `Mutex`-guarded map,
/// implementing the same conflict-resolution contract as the Postgres
/// adapter so tests can exercise the real dedup protocol without a
/// database.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeStoreState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn upsert_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(id) = state.users_by_email.get(email) {
            return Ok(state.users[id].clone());
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            last_email_check: None,
            last_email_received: None,
        };
        state.users_by_email.insert(email.to_string(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().unwrap().users.get(&id).cloned())
    }

    async fn get_email_by_fingerprint(
        &self,
        fingerprint: &[u8; 32],
    ) -> Result<Option<Email>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .emails_by_fingerprint
            .get(fingerprint)
            .and_then(|id| state.emails_by_id.get(id))
            .cloned())
    }

    async fn insert_email(
        &self,
        id: Uuid,
        fingerprint: [u8; 32],
        received_at: DateTime<Utc>,
    ) -> Result<EmailInsertOutcome, StoreError> {
        let mut state = self.state.lock().unwrap();

        if let Some(existing_id) = state.emails_by_fingerprint.get(&fingerprint).copied() {
            let email = state.emails_by_id[&existing_id].clone();
            return Ok(EmailInsertOutcome {
                email,
                is_new: false,
            });
        }

        if let Some(existing) = state.emails_by_id.get(&id).cloned() {
            let updated = Email {
                received_at,
                ..existing
            };
            state.emails_by_id.insert(id, updated.clone());
            return Ok(EmailInsertOutcome {
                email: updated,
                is_new: false,
            });
        }

        let email = Email {
            id,
            fingerprint,
            received_at,
        };
        state.emails_by_id.insert(id, email.clone());
        state.emails_by_fingerprint.insert(fingerprint, id);
        Ok(EmailInsertOutcome {
            email,
            is_new: true,
        })
    }

    async fn link_user_email(&self, user_id: Uuid, email_id: Uuid) -> Result<(), StoreError> {
        self.state.lock().unwrap().user_emails.insert((user_id, email_id));
        Ok(())
    }

    async fn update_last_email_check(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.get_mut(&user_id) {
            user.last_email_check = Some(at);
        }
        Ok(())
    }

    async fn update_last_email_received_if_newer(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(user) = state.users.get_mut(&user_id) {
            let should_update = match user.last_email_received {
                Some(stored) => at > stored,
                None => true,
            };
            if should_update {
                user.last_email_received = Some(at);
            }
        }
        Ok(())
    }
}

impl FakeStore {
    pub fn user_email_count(&self) -> usize {
        self.state.lock().unwrap().user_emails.len()
    }

    pub fn email_count(&self) -> usize {
        self.state.lock().unwrap().emails_by_id.len()
    }

    pub fn user_snapshot(&self, user_id: Uuid) -> Option<User> {
        self.state.lock().unwrap().users.get(&user_id).cloned()
    }
}
