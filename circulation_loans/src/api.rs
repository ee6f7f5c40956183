use chrono::{DateTime, Utc};
use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

pub type BookId = i32;
pub type LoanId = i64;
pub type ReviewId = i64;

/// Session identity is established upstream; the authenticating proxy
/// forwards the caller's email in this header.
pub const USER_EMAIL_HEADER: &str = "x-user-email";

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequest {
    pub book_id: BookId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    pub book_id: BookId,
}

/// Catalog record as served by the catalog service.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub id: BookId,
    pub isbn13: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct LoanWithBook {
    pub id: LoanId,
    pub book_id: BookId,
    pub loaned_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub book: Option<BookSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLoanRecord {
    pub id: LoanId,
    pub book_id: BookId,
    pub loaned_at: DateTime<Utc>,
}

/// Per-user count of active loans due inside a window.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct DueCount {
    pub user_email: String,
    pub due_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct DueWindowQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct DueBookEntry {
    pub book_title: String,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct BookStatusResponse {
    pub due_today: Vec<DueBookEntry>,
    pub overdue: Vec<DueBookEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionRuleDto {
    pub start_date: String,
    pub end_date: String,
    pub loan_period_days: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResponse {
    pub friday_only: bool,
    pub loan_period_days: i32,
    /// First exception window echoed flat for the pre-multi-window client.
    pub exception_start_date: String,
    pub exception_end_date: String,
    pub exception_loan_period_days: i32,
    pub exception_rules: Vec<ExceptionRuleDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyUpdateRequest {
    pub friday_only: bool,
    pub loan_period_days: i32,
    /// When absent the flat legacy fields below are consulted instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_rules: Option<Vec<ExceptionRuleDto>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception_loan_period_days: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub book_id: BookId,
    pub rating: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub book_id: BookId,
    pub user_email: String,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A review as listed publicly; the author is withheld.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewComment {
    pub id: ReviewId,
    pub book_id: BookId,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewsQuery {
    pub book_id: BookId,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewsResponse {
    pub user_review: Option<Review>,
    pub comments: Vec<ReviewComment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct PostReviewResponse {
    pub ok: bool,
    pub data: Review,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct ErrorMessage {
    pub message: String,
}
