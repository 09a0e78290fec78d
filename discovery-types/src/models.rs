use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant user as known to the store. Identity is the opaque `id`; unique
/// by `email`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// When the most recent poll completed storing a record for this user.
    pub last_email_check: Option<DateTime<Utc>>,
    /// Receive-time of the most recent newly-stored email for this user.
    pub last_email_received: Option<DateTime<Utc>>,
}

/// A user as returned by the provider's `GetUsers` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub tenant_id: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A single message as returned by the provider's `GetEmails` call.
///
/// Transient: only `body` is hashed into a fingerprint before storage, the
/// raw bytes are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEmail {
    pub message_id: String,
    pub user_id: Uuid,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub snippet: String,
    pub received_at: DateTime<Utc>,
    pub body: Vec<u8>,
}

/// A unique message as identified by `fingerprint`, persisted once per
/// distinct body regardless of how many users received it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: Uuid,
    pub fingerprint: [u8; 32],
    pub received_at: DateTime<Utc>,
}

/// Association between a user and a unique email they received. Identity is
/// the pair; there are no further attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEmail {
    pub user_id: Uuid,
    pub email_id: Uuid,
}
