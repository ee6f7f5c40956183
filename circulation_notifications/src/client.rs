use anyhow::{bail, Context};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;

use crate::api::{SubscribeRequest, SweepResponse, UnsubscribeRequest, USER_EMAIL_HEADER};

pub struct CirculationNotificationsClient {
    url: String,
    client: ClientWithMiddleware,
}

impl CirculationNotificationsClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client)
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    /// Calls POST /api/push/subscribe endpoint
    pub async fn subscribe(
        &self,
        user_email: &str,
        request: &SubscribeRequest,
    ) -> anyhow::Result<()> {
        let response = self
            .client
            .post(format!("{}/api/push/subscribe", self.url))
            .header(USER_EMAIL_HEADER, user_email)
            .json(request)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to subscribe {}", error)
        }
    }

    /// Calls POST /api/push/unsubscribe endpoint
    pub async fn unsubscribe(
        &self,
        user_email: &str,
        request: &UnsubscribeRequest,
    ) -> anyhow::Result<()> {
        let response = self
            .client
            .post(format!("{}/api/push/unsubscribe", self.url))
            .header(USER_EMAIL_HEADER, user_email)
            .json(request)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to unsubscribe {}", error)
        }
    }

    /// Calls GET /api/notify/sweep endpoint
    pub async fn trigger_sweep(&self, cron_secret: Option<&str>) -> anyhow::Result<SweepResponse> {
        let mut request = self.client.get(format!("{}/api/notify/sweep", self.url));
        if let Some(secret) = cron_secret {
            request = request.header("x-cron-secret", secret);
        }
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to trigger sweep {}", error)
        }
    }
}
