use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

pub type SubscriptionId = i64;

/// Session identity is established upstream; the authenticating proxy
/// forwards the caller's email in this header.
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Browser push encryption keys as handed out by the Push API.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscriptionRecord {
    pub id: SubscriptionId,
    pub user_email: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// What the service worker renders when the message arrives.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub targeted_users: usize,
    pub subscriptions: usize,
    pub sent: usize,
    pub failed: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub ok: bool,
    pub message: String,
    pub targeted_users: usize,
    pub subscriptions: usize,
    pub sent: usize,
    pub failed: usize,
    pub removed: usize,
}

impl SweepResponse {
    pub fn from_summary(summary: SweepSummary) -> Self {
        Self {
            ok: true,
            message: "Daily notifications sent".to_string(),
            targeted_users: summary.targeted_users,
            subscriptions: summary.subscriptions,
            sent: summary.sent,
            failed: summary.failed,
            removed: summary.removed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct OkResponse {
    pub ok: bool,
}
