use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ProviderError;
use crate::models::{ProviderEmail, ProviderUser};

/// The external email provider, consumed by the user tracker and the
/// per-user pollers. Assumed to return lists of users and emails on
/// demand; implementing retries or backoff around a flaky provider is
/// explicitly out of scope for this engine (see spec Non-goals).
#[async_trait]
pub trait Provider: Send + Sync {
    /// The full, current user set for `tenant_id`.
    async fn get_users(&self, tenant_id: &str) -> Result<Vec<ProviderUser>, ProviderError>;

    /// Emails for `user_id` received at or after `received_after`, ordered
    /// ascending by `received_at`.
    async fn get_emails(
        &self,
        user_id: Uuid,
        received_after: DateTime<Utc>,
    ) -> Result<Vec<ProviderEmail>, ProviderError>;
}
