pub use in_memory_subscriptions_repository::InMemorySubscriptionsRepository;
pub use postgres_subscriptions_repository::{
    PostgresSubscriptionsRepository, PostgresSubscriptionsRepositoryConfig,
};

use crate::api::{PushSubscriptionRecord, SubscriptionId};

mod in_memory_subscriptions_repository;
mod postgres_subscriptions_repository;

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionsRepositoryError {
    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait SubscriptionsRepository: Send + Sync {
    /// Registers a push endpoint for the user. An endpoint already known is
    /// re-bound to the caller with fresh keys rather than duplicated.
    async fn upsert_subscription(
        &self,
        user_email: &str,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<PushSubscriptionRecord, SubscriptionsRepositoryError>;

    /// Removes the caller's subscription for the endpoint, if any.
    async fn delete_subscription(
        &self,
        user_email: &str,
        endpoint: &str,
    ) -> Result<(), SubscriptionsRepositoryError>;

    /// All subscriptions belonging to any of the given users.
    async fn subscriptions_for_users(
        &self,
        user_emails: &[String],
    ) -> Result<Vec<PushSubscriptionRecord>, SubscriptionsRepositoryError>;

    /// Bulk-removes subscriptions whose endpoints turned out dead.
    async fn delete_by_ids(
        &self,
        ids: &[SubscriptionId],
    ) -> Result<usize, SubscriptionsRepositoryError>;
}
