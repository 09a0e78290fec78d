use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Email, User};

/// Outcome of attempting to insert a new `Email` row (spec §4.5 step 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailInsertOutcome {
    /// The canonical row for this fingerprint after the insert attempt:
    /// the row that was just created, the row whose `received_at` was just
    /// overwritten on an `id` conflict, or the pre-existing row adopted on
    /// a `fingerprint` conflict.
    pub email: Email,
    /// True only when this call is the one that created the row.
    pub is_new: bool,
}

/// The relational store, consumed by the user tracker and the processor.
/// Assumed to provide pooled connections with transactional
/// single-statement execution and atomic upserts; no cross-statement
/// transactions are required of implementations (spec §5).
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert `email` as a new user if absent; no-op on conflict. Returns
    /// the row either way.
    async fn upsert_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Fetch the freshest snapshot of a user row.
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Look up an `Email` row by its fingerprint.
    async fn get_email_by_fingerprint(
        &self,
        fingerprint: &[u8; 32],
    ) -> Result<Option<Email>, StoreError>;

    /// Attempt to insert `(id, fingerprint, received_at)` following the
    /// conflict policy in spec §4.5 step 3: on an `id` conflict, overwrite
    /// `received_at`; on a `fingerprint` conflict, adopt the existing row's
    /// id as canonical. Implementations resolve both kinds of conflict
    /// themselves and report which outcome occurred.
    async fn insert_email(
        &self,
        id: Uuid,
        fingerprint: [u8; 32],
        received_at: DateTime<Utc>,
    ) -> Result<EmailInsertOutcome, StoreError>;

    /// Link `user_id` to `email_id`; idempotent, no-op on conflict.
    async fn link_user_email(&self, user_id: Uuid, email_id: Uuid) -> Result<(), StoreError>;

    /// Unconditionally set `last_email_check` to `at`.
    async fn update_last_email_check(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Set `last_email_received` to `at` only if it is strictly greater
    /// than the stored value, or the stored value is absent. Must be a
    /// single conditional `UPDATE`, never a read-modify-write.
    async fn update_last_email_received_if_newer(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
