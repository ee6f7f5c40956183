use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use futures_util::future::join_all;
use itertools::Itertools;

use circulation_loans::api::DueCount;
use circulation_loans::client::CirculationLoansClient;

use crate::api::{NotificationPayload, SweepSummary};
use crate::push_gateway::{PushDeliveryError, PushTransport};
use crate::subscriptions_repository::SubscriptionsRepository;

/// The user base is in Japan, so "today" is always the JST calendar day,
/// regardless of where the process runs.
const JST_OFFSET_HOURS: i32 = 9;

/// Upper bound on in-flight delivery attempts.
pub const DELIVERY_CONCURRENCY: usize = 20;

/// Where the sweep learns who has loans due. Backed by the loan service in
/// production.
#[async_trait::async_trait]
pub trait DueLoanSource: Send + Sync {
    async fn due_counts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DueCount>>;
}

pub struct LoansServiceDueSource {
    client: CirculationLoansClient,
}

impl LoansServiceDueSource {
    pub fn new(loans_service_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: CirculationLoansClient::new(loans_service_url)?,
        })
    }
}

#[async_trait::async_trait]
impl DueLoanSource for LoansServiceDueSource {
    async fn due_counts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DueCount>> {
        self.client.due_counts(start, end).await
    }
}

/// Bounds of the JST calendar day containing `now`, as UTC instants.
pub fn jst_today_range(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let jst = FixedOffset::east_opt(JST_OFFSET_HOURS * 3600).expect("valid offset");
    let midnight = now
        .with_timezone(&jst)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    let start = jst
        .from_local_datetime(&midnight)
        .single()
        .expect("fixed offsets map local times uniquely")
        .with_timezone(&Utc);
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    (start, end)
}

fn due_payload(due_count: i64) -> NotificationPayload {
    NotificationPayload {
        title: "返却期限のお知らせ".to_string(),
        body: format!("今日返す本が{due_count}件あります。"),
        url: "/return".to_string(),
    }
}

/// One sweep over everyone with loans due on the JST day containing `now`.
///
/// Stateless: nothing is checkpointed between runs, so a crashed sweep is
/// simply rerun and re-targets whoever still has due loans. Deliveries go
/// out in sequential batches of [`DELIVERY_CONCURRENCY`] parallel attempts;
/// one failure never stops a batch. Endpoints reported gone (404/410) are
/// removed in a single bulk delete once every batch has finished.
pub async fn run_sweep(
    now: DateTime<Utc>,
    due_loans: &dyn DueLoanSource,
    subscriptions_repository: &dyn SubscriptionsRepository,
    transport: &dyn PushTransport,
) -> anyhow::Result<SweepSummary> {
    let (start, end) = jst_today_range(now);
    let due = due_loans.due_counts(start, end).await?;
    if due.is_empty() {
        return Ok(SweepSummary::default());
    }

    let due_count_by_email: HashMap<&str, i64> = due
        .iter()
        .map(|row| (row.user_email.as_str(), row.due_count))
        .collect();
    let target_emails = due.iter().map(|row| row.user_email.clone()).collect_vec();

    let subscriptions = subscriptions_repository
        .subscriptions_for_users(&target_emails)
        .await?;

    let mut sent = 0;
    let mut failed = 0;
    let mut invalid_ids = Vec::new();
    for batch in subscriptions.chunks(DELIVERY_CONCURRENCY) {
        let attempts = batch.iter().map(|subscription| async {
            let due_count = due_count_by_email
                .get(subscription.user_email.as_str())
                .copied()
                .unwrap_or(0);
            transport
                .deliver(subscription, &due_payload(due_count))
                .await
        });
        let outcomes = join_all(attempts).await;

        for (subscription, outcome) in batch.iter().zip(outcomes) {
            match outcome {
                Ok(()) => sent += 1,
                Err(PushDeliveryError::EndpointGone(status)) => {
                    failed += 1;
                    tracing::info!(
                        "Endpoint of subscription {} is gone (status {})",
                        subscription.id,
                        status
                    );
                    invalid_ids.push(subscription.id);
                }
                Err(PushDeliveryError::Failed(reason)) => {
                    failed += 1;
                    tracing::warn!(
                        "Delivery to subscription {} failed: {}",
                        subscription.id,
                        reason
                    );
                }
            }
        }
    }

    let removed = if invalid_ids.is_empty() {
        0
    } else {
        subscriptions_repository.delete_by_ids(&invalid_ids).await?
    };

    Ok(SweepSummary {
        targeted_users: due.len(),
        subscriptions: subscriptions.len(),
        sent,
        failed,
        removed,
    })
}
