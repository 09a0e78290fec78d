use chrono::{DateTime, Utc};
use diesel::prelude::*;
use discovery_types::{Email, StoreError, User};
use uuid::Uuid;

use crate::schema::{emails, users};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub last_email_check: Option<DateTime<Utc>>,
    pub last_email_received: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            last_email_check: row.last_email_check,
            last_email_received: row.last_email_received,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = emails)]
pub struct EmailRow {
    pub id: Uuid,
    pub fingerprint: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl TryFrom<EmailRow> for Email {
    type Error = StoreError;

    fn try_from(row: EmailRow) -> Result<Self, Self::Error> {
        let fingerprint: [u8; 32] = row.fingerprint.try_into().map_err(|bytes: Vec<u8>| {
            StoreError::Query(format!(
                "stored fingerprint has {} bytes, expected 32",
                bytes.len()
            ))
        })?;

        Ok(Email {
            id: row.id,
            fingerprint,
            received_at: row.received_at,
        })
    }
}
