pub use in_memory_loans_repository::InMemoryLoansRepository;
pub use postgres_loans_repository::{PostgresLoansRepository, PostgresLoansRepositoryConfig};

use chrono::{DateTime, Utc};

use crate::api::{BookId, DueCount, LoanId, Review, ReviewComment};
use crate::policy::{LoanPolicy, PolicyUpdate};

mod in_memory_loans_repository;
mod postgres_loans_repository;

#[derive(Debug, thiserror::Error)]
pub enum LoansRepositoryError {
    #[error("Book {0} is already loaned out")]
    BookAlreadyLoaned(BookId),

    #[error("No active loan of book {0} for this user")]
    ActiveLoanNotFound(BookId),

    #[error("Failed to deserialize record: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ActiveLoan {
    pub id: LoanId,
    pub book_id: BookId,
    pub user_email: String,
    pub loaned_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CreateLoan {
    pub book_id: BookId,
    pub user_email: String,
    pub loaned_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UpsertReview {
    pub book_id: BookId,
    pub user_email: String,
    pub rating: i32,
    pub comment: Option<String>,
}

/// Storage for the loan ledger: the policy singleton, loans and reviews.
#[async_trait::async_trait]
pub trait LoansRepository: Send + Sync {
    /// Current policy with its enabled exception windows. Returns the
    /// built-in defaults when no policy row was ever written; reading never
    /// materializes the row.
    async fn get_policy(&self) -> Result<LoanPolicy, LoansRepositoryError>;

    /// Replaces the whole policy in one atomic unit: scalar fields are
    /// updated, every currently-enabled exception window is disabled (and
    /// retained), and the new windows are inserted enabled. Creates the
    /// singleton row on first write.
    async fn replace_policy(&self, update: PolicyUpdate) -> Result<(), LoansRepositoryError>;

    async fn is_book_loaned(&self, book_id: BookId) -> Result<bool, LoansRepositoryError>;

    /// Inserts a loan. The write itself re-checks the one-active-loan-per-
    /// book invariant, so two concurrent calls for the same book resolve to
    /// one success and one `BookAlreadyLoaned`.
    async fn create_loan(&self, loan: CreateLoan) -> Result<LoanId, LoansRepositoryError>;

    /// Marks the caller's own active loan of the book as returned.
    /// `ActiveLoanNotFound` covers both "never borrowed" and "already
    /// returned", and a loan held by a different user.
    async fn return_loan(
        &self,
        book_id: BookId,
        user_email: &str,
        returned_at: DateTime<Utc>,
    ) -> Result<(), LoansRepositoryError>;

    /// The user's active loans, most recently loaned first.
    async fn active_loans_for_user(
        &self,
        user_email: &str,
    ) -> Result<Vec<ActiveLoan>, LoansRepositoryError>;

    /// Every active loan, most recently loaned first.
    async fn all_active_loans(&self) -> Result<Vec<ActiveLoan>, LoansRepositoryError>;

    /// Per-user counts of active loans due inside `[start, end]`.
    async fn due_counts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DueCount>, LoansRepositoryError>;

    /// One review per (book, user); a second submission overwrites the
    /// first and refreshes its updated-at stamp.
    async fn upsert_review(&self, review: UpsertReview) -> Result<Review, LoansRepositoryError>;

    async fn review_by_user(
        &self,
        book_id: BookId,
        user_email: &str,
    ) -> Result<Option<Review>, LoansRepositoryError>;

    /// Reviews of the book carrying a non-blank comment, newest first.
    async fn comments_for_book(
        &self,
        book_id: BookId,
    ) -> Result<Vec<ReviewComment>, LoansRepositoryError>;
}
