use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::api::{PushSubscriptionRecord, SubscriptionId};
use crate::subscriptions_repository::{SubscriptionsRepository, SubscriptionsRepositoryError};

pub struct InMemorySubscriptionsRepository {
    // Keyed by endpoint, which is unique across users.
    subscriptions: parking_lot::RwLock<HashMap<String, PushSubscriptionRecord>>,
    subscription_sequence_generator: AtomicI64,
}

impl Default for InMemorySubscriptionsRepository {
    fn default() -> Self {
        Self {
            subscriptions: Default::default(),
            subscription_sequence_generator: AtomicI64::new(1),
        }
    }
}

#[async_trait::async_trait]
impl SubscriptionsRepository for InMemorySubscriptionsRepository {
    async fn upsert_subscription(
        &self,
        user_email: &str,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<PushSubscriptionRecord, SubscriptionsRepositoryError> {
        let mut locked_subscriptions = self.subscriptions.write();

        let id = match locked_subscriptions.get(endpoint) {
            Some(existing) => existing.id,
            None => self
                .subscription_sequence_generator
                .fetch_add(1, Ordering::Relaxed),
        };
        let record = PushSubscriptionRecord {
            id,
            user_email: user_email.to_string(),
            endpoint: endpoint.to_string(),
            p256dh: p256dh.to_string(),
            auth: auth.to_string(),
        };
        locked_subscriptions.insert(endpoint.to_string(), record.clone());
        Ok(record)
    }

    async fn delete_subscription(
        &self,
        user_email: &str,
        endpoint: &str,
    ) -> Result<(), SubscriptionsRepositoryError> {
        let mut locked_subscriptions = self.subscriptions.write();
        if locked_subscriptions
            .get(endpoint)
            .is_some_and(|record| record.user_email == user_email)
        {
            locked_subscriptions.remove(endpoint);
        }
        Ok(())
    }

    async fn subscriptions_for_users(
        &self,
        user_emails: &[String],
    ) -> Result<Vec<PushSubscriptionRecord>, SubscriptionsRepositoryError> {
        let mut records: Vec<PushSubscriptionRecord> = self
            .subscriptions
            .read()
            .values()
            .filter(|record| user_emails.contains(&record.user_email))
            .cloned()
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    async fn delete_by_ids(
        &self,
        ids: &[SubscriptionId],
    ) -> Result<usize, SubscriptionsRepositoryError> {
        let mut locked_subscriptions = self.subscriptions.write();
        let before = locked_subscriptions.len();
        locked_subscriptions.retain(|_, record| !ids.contains(&record.id));
        Ok(before - locked_subscriptions.len())
    }
}
