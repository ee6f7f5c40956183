use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;

use crate::api::{
    BookId, DueCount, LoanWithBook, PolicyResponse, PolicyUpdateRequest, PostReviewResponse,
    ReviewsResponse, USER_EMAIL_HEADER,
};

/// How a borrow attempt ended, as reported by the service.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BorrowOutcome {
    Created,
    OutsideLoanWindow,
    AlreadyLoaned,
    BookNotFound,
}

pub struct CirculationLoansClient {
    url: String,
    client: ClientWithMiddleware,
}

impl CirculationLoansClient {
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

    /// Calls POST /api/loans endpoint
    /// Distinguishes the three expected rejections from hard failures
    pub async fn borrow_book(
        &self,
        user_email: &str,
        book_id: BookId,
    ) -> anyhow::Result<BorrowOutcome> {
        let response = self
            .client
            .post(format!("{}/api/loans", self.url))
            .header(USER_EMAIL_HEADER, user_email)
            .json(&serde_json::json!({ "bookId": book_id }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(BorrowOutcome::Created),
            StatusCode::FORBIDDEN => Ok(BorrowOutcome::OutsideLoanWindow),
            StatusCode::CONFLICT => Ok(BorrowOutcome::AlreadyLoaned),
            StatusCode::NOT_FOUND => Ok(BorrowOutcome::BookNotFound),
            _ => {
                let error = response.text().await.unwrap_or_default();
                bail!("Failed to borrow book {}", error)
            }
        }
    }

    /// Calls GET /api/loans endpoint
    /// Returns the caller's active loans with embedded catalog records
    pub async fn my_loans(&self, user_email: &str) -> anyhow::Result<Vec<LoanWithBook>> {
        let response = self
            .client
            .get(format!("{}/api/loans", self.url))
            .header(USER_EMAIL_HEADER, user_email)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to list loans {}", error)
        }
    }

    /// Calls POST /api/loans/return endpoint
    /// Returns true if a loan was closed and false if there was none
    pub async fn return_book(&self, user_email: &str, book_id: BookId) -> anyhow::Result<bool> {
        let response = self
            .client
            .post(format!("{}/api/loans/return", self.url))
            .header(USER_EMAIL_HEADER, user_email)
            .json(&serde_json::json!({ "bookId": book_id }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            Ok(false)
        } else if response.status().is_success() {
            Ok(true)
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to return book {}", error)
        }
    }

    /// Calls GET /api/loans/due endpoint
    pub async fn due_counts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DueCount>> {
        let response = self
            .client
            .get(format!("{}/api/loans/due", self.url))
            .query(&[("start", start.to_rfc3339()), ("end", end.to_rfc3339())])
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to get due counts {}", error)
        }
    }

    /// Calls GET /api/policy endpoint (admin)
    pub async fn get_policy(&self, admin_email: &str) -> anyhow::Result<PolicyResponse> {
        let response = self
            .client
            .get(format!("{}/api/policy", self.url))
            .header(USER_EMAIL_HEADER, admin_email)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to get policy {}", error)
        }
    }

    /// Calls PUT /api/policy endpoint (admin)
    /// Returns true if accepted and false if the update was rejected
    pub async fn put_policy(
        &self,
        admin_email: &str,
        update: &PolicyUpdateRequest,
    ) -> anyhow::Result<bool> {
        let response = self
            .client
            .put(format!("{}/api/policy", self.url))
            .header(USER_EMAIL_HEADER, admin_email)
            .json(update)
            .send()
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            Ok(false)
        } else if response.status().is_success() {
            Ok(true)
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to update policy {}", error)
        }
    }

    /// Calls POST /api/reviews endpoint
    pub async fn post_review(
        &self,
        user_email: &str,
        book_id: BookId,
        rating: i32,
        comment: Option<&str>,
    ) -> anyhow::Result<PostReviewResponse> {
        let response = self
            .client
            .post(format!("{}/api/reviews", self.url))
            .header(USER_EMAIL_HEADER, user_email)
            .json(&serde_json::json!({
                "bookId": book_id,
                "rating": rating,
                "comment": comment,
            }))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to post review {}", error)
        }
    }

    /// Calls GET /api/reviews endpoint
    pub async fn get_reviews(
        &self,
        user_email: &str,
        book_id: BookId,
    ) -> anyhow::Result<ReviewsResponse> {
        let response = self
            .client
            .get(format!("{}/api/reviews", self.url))
            .query(&[("bookId", book_id)])
            .header(USER_EMAIL_HEADER, user_email)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to get reviews {}", error)
        }
    }
}
