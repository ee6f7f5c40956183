use anyhow::Context;
use tokio_postgres::{Client, NoTls, Row, Statement};

use crate::api::{PushSubscriptionRecord, SubscriptionId};
use crate::subscriptions_repository::{SubscriptionsRepository, SubscriptionsRepositoryError};

pub struct PostgresSubscriptionsRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

pub struct PostgresSubscriptionsRepository {
    client: Client,
}

impl PostgresSubscriptionsRepository {
    pub async fn init(config: PostgresSubscriptionsRepositoryConfig) -> anyhow::Result<Self> {
        let connection_str = format!(
            "postgresql://{}:{}@{}",
            config.username, config.password, config.hostname
        );
        tracing::info!("Postgres connection_str: {}", connection_str);
        let (client, connection) = tokio_postgres::connect(&connection_str, NoTls)
            .await
            .context("Failed to start postgres")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("connection error: {}", e);
            }
        });

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS push_subscriptions (
            id              BIGSERIAL PRIMARY KEY,
            user_email      TEXT NOT NULL,
            endpoint        TEXT NOT NULL UNIQUE,
            p256dh          TEXT NOT NULL,
            auth            TEXT NOT NULL,
            updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        ",
            )
            .await
            .context("Failed to setup push_subscriptions table")?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl SubscriptionsRepository for PostgresSubscriptionsRepository {
    async fn upsert_subscription(
        &self,
        user_email: &str,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<PushSubscriptionRecord, SubscriptionsRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare(
                "INSERT INTO push_subscriptions (user_email, endpoint, p256dh, auth)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (endpoint)
                 DO UPDATE SET
                   user_email = EXCLUDED.user_email,
                   p256dh = EXCLUDED.p256dh,
                   auth = EXCLUDED.auth,
                   updated_at = NOW()
                 RETURNING id, user_email, endpoint, p256dh, auth",
            )
            .await?;
        let row = self
            .client
            .query_one(&stmt, &[&user_email, &endpoint, &p256dh, &auth])
            .await?;
        Ok(subscription_from_row(&row)?)
    }

    async fn delete_subscription(
        &self,
        user_email: &str,
        endpoint: &str,
    ) -> Result<(), SubscriptionsRepositoryError> {
        self.client
            .execute(
                "DELETE FROM push_subscriptions WHERE user_email = $1 AND endpoint = $2",
                &[&user_email, &endpoint],
            )
            .await?;
        Ok(())
    }

    async fn subscriptions_for_users(
        &self,
        user_emails: &[String],
    ) -> Result<Vec<PushSubscriptionRecord>, SubscriptionsRepositoryError> {
        let user_emails = user_emails.to_vec();
        let rows = self
            .client
            .query(
                "SELECT id, user_email, endpoint, p256dh, auth
                 FROM push_subscriptions
                 WHERE user_email = ANY($1)
                 ORDER BY id",
                &[&user_emails],
            )
            .await?;
        rows.iter()
            .map(|row| Ok(subscription_from_row(row)?))
            .collect()
    }

    async fn delete_by_ids(
        &self,
        ids: &[SubscriptionId],
    ) -> Result<usize, SubscriptionsRepositoryError> {
        let ids = ids.to_vec();
        let removed = self
            .client
            .execute(
                "DELETE FROM push_subscriptions WHERE id = ANY($1)",
                &[&ids],
            )
            .await?;
        Ok(removed as usize)
    }
}

fn subscription_from_row(row: &Row) -> Result<PushSubscriptionRecord, tokio_postgres::Error> {
    Ok(PushSubscriptionRecord {
        id: row.try_get(0)?,
        user_email: row.try_get(1)?,
        endpoint: row.try_get(2)?,
        p256dh: row.try_get(3)?,
        auth: row.try_get(4)?,
    })
}
