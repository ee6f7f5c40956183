use anyhow::Context;
use reqwest_middleware::ClientBuilder;
use reqwest_tracing::TracingMiddleware;
use serde::Serialize;

use crate::api::{NotificationPayload, PushSubscriptionRecord, SubscriptionKeys};

#[derive(Debug, thiserror::Error)]
pub enum PushDeliveryError {
    /// The push service no longer knows the endpoint; the subscription
    /// should be dropped.
    #[error("subscription endpoint is gone (status {0})")]
    EndpointGone(u16),

    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Delivery seam of the sweep. The production implementation talks to the
/// push gateway; tests substitute their own.
#[async_trait::async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        subscription: &PushSubscriptionRecord,
        payload: &NotificationPayload,
    ) -> Result<(), PushDeliveryError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewaySendRequest<'a> {
    endpoint: &'a str,
    keys: SubscriptionKeys,
    payload: &'a NotificationPayload,
}

/// Client for the Web Push gateway. The gateway holds the VAPID keypair,
/// encrypts the payload for the endpoint and relays the push service's
/// status back, so dead endpoints surface here as 404/410.
pub struct PushGatewayClient {
    gateway_url: String,
}

impl PushGatewayClient {
    pub fn new(gateway_url: String) -> Self {
        Self { gateway_url }
    }
}

#[async_trait::async_trait]
impl PushTransport for PushGatewayClient {
    async fn deliver(
        &self,
        subscription: &PushSubscriptionRecord,
        payload: &NotificationPayload,
    ) -> Result<(), PushDeliveryError> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")
            .map_err(|err| PushDeliveryError::Failed(format!("{err:#}")))?;
        let client = ClientBuilder::new(reqwest_client)
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();

        let response = client
            .post(format!("{}/send", self.gateway_url))
            .json(&GatewaySendRequest {
                endpoint: &subscription.endpoint,
                keys: SubscriptionKeys {
                    p256dh: subscription.p256dh.clone(),
                    auth: subscription.auth.clone(),
                },
                payload,
            })
            .send()
            .await
            .map_err(|err| PushDeliveryError::Failed(format!("{err:#}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match status.as_u16() {
            status @ (404 | 410) => Err(PushDeliveryError::EndpointGone(status)),
            status => Err(PushDeliveryError::Failed(format!(
                "gateway responded with status {status}"
            ))),
        }
    }
}
