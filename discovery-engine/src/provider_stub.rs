use async_trait::async_trait;
use chrono::{DateTime, Utc};
use discovery_types::{Provider, ProviderEmail, ProviderError, ProviderUser};
use uuid::Uuid;

/// Placeholder `Provider` wired into the binary until a real email
/// provider client is plugged in here. The provider client is an external
/// collaborator this repository assumes rather than implements; every call
/// fails with `ProviderError::Request` so the tracker and pollers log and
/// retry on their normal schedule instead of the binary refusing to start.
pub struct UnconfiguredProvider;

#[async_trait]
impl Provider for UnconfiguredProvider {
    async fn get_users(&self, _tenant_id: &str) -> Result<Vec<ProviderUser>, ProviderError> {
        Err(ProviderError::Request(
            "no provider client configured".into(),
        ))
    }

    async fn get_emails(
        &self,
        _user_id: Uuid,
        _received_after: DateTime<Utc>,
    ) -> Result<Vec<ProviderEmail>, ProviderError> {
        Err(ProviderError::Request(
            "no provider client configured".into(),
        ))
    }
}
