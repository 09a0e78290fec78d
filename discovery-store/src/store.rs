use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use discovery_types::{Email, EmailInsertOutcome, Store, StoreError, User};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{from_diesel_error, from_pool_error};
use crate::models::{EmailRow, UserRow};
use crate::schema::{emails, user_emails, users};

/// `Store` backed by a pooled, async Postgres connection.
pub struct PostgresStore {
    pool: DbPool,
}

impl PostgresStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(
        &self,
    ) -> Result<diesel_async::pooled_connection::deadpool::Object<diesel_async::AsyncPgConnection>, StoreError>
    {
        self.pool.get().await.map_err(from_pool_error)
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn upsert_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let mut conn = self.conn().await?;

        let inserted = diesel::insert_into(users::table)
            .values((users::id.eq(Uuid::new_v4()), users::email.eq(email)))
            .on_conflict(users::email)
            .do_nothing()
            .get_result::<UserRow>(&mut conn)
            .await
            .optional()
            .map_err(from_diesel_error)?;

        let row = match inserted {
            Some(row) => row,
            None => users::table
                .filter(users::email.eq(email))
                .first::<UserRow>(&mut conn)
                .await
                .map_err(from_diesel_error)?,
        };

        Ok(row.into())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn().await?;

        let row = users::table
            .filter(users::id.eq(id))
            .first::<UserRow>(&mut conn)
            .await
            .optional()
            .map_err(from_diesel_error)?;

        Ok(row.map(Into::into))
    }

    async fn get_email_by_fingerprint(
        &self,
        fingerprint: &[u8; 32],
    ) -> Result<Option<Email>, StoreError> {
        let mut conn = self.conn().await?;

        let row = emails::table
            .filter(emails::fingerprint.eq(fingerprint.to_vec()))
            .first::<EmailRow>(&mut conn)
            .await
            .optional()
            .map_err(from_diesel_error)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn insert_email(
        &self,
        id: Uuid,
        fingerprint: [u8; 32],
        received_at: DateTime<Utc>,
    ) -> Result<EmailInsertOutcome, StoreError> {
        let mut conn = self.conn().await?;

        let insert_result = diesel::insert_into(emails::table)
            .values((
                emails::id.eq(id),
                emails::fingerprint.eq(fingerprint.to_vec()),
                emails::received_at.eq(received_at),
            ))
            .get_result::<EmailRow>(&mut conn)
            .await;

        match insert_result {
            Ok(row) => Ok(EmailInsertOutcome {
                email: row.try_into()?,
                is_new: true,
            }),
            Err(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            )) => {
                let conflicted_on_fingerprint = info
                    .constraint_name()
                    .map(|name| name.contains("fingerprint"))
                    .unwrap_or(false);

                if conflicted_on_fingerprint {
                    // Someone else already stored this body under a
                    // different message id; adopt their row as canonical.
                    let row = emails::table
                        .filter(emails::fingerprint.eq(fingerprint.to_vec()))
                        .first::<EmailRow>(&mut conn)
                        .await
                        .map_err(from_diesel_error)?;
                    Ok(EmailInsertOutcome {
                        email: row.try_into()?,
                        is_new: false,
                    })
                } else {
                    // Same message id seen again; this is the most recent
                    // sighting, so refresh received_at.
                    let row = diesel::update(emails::table.filter(emails::id.eq(id)))
                        .set(emails::received_at.eq(received_at))
                        .get_result::<EmailRow>(&mut conn)
                        .await
                        .map_err(from_diesel_error)?;
                    Ok(EmailInsertOutcome {
                        email: row.try_into()?,
                        is_new: false,
                    })
                }
            }
            Err(e) => Err(from_diesel_error(e)),
        }
    }

    async fn link_user_email(&self, user_id: Uuid, email_id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;

        diesel::insert_into(user_emails::table)
            .values((
                user_emails::user_id.eq(user_id),
                user_emails::email_id.eq(email_id),
            ))
            .on_conflict((user_emails::user_id, user_emails::email_id))
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(from_diesel_error)?;

        Ok(())
    }

    async fn update_last_email_check(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;

        diesel::update(users::table.filter(users::id.eq(user_id)))
            .set(users::last_email_check.eq(at))
            .execute(&mut conn)
            .await
            .map_err(from_diesel_error)?;

        Ok(())
    }

    async fn update_last_email_received_if_newer(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;

        diesel::update(
            users::table.filter(users::id.eq(user_id)).filter(
                users::last_email_received
                    .is_null()
                    .or(users::last_email_received.lt(at)),
            ),
        )
        .set(users::last_email_received.eq(at))
        .execute(&mut conn)
        .await
        .map_err(from_diesel_error)?;

        Ok(())
    }
}
