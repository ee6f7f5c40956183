use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use crate::api::{BookId, DueCount, LoanId, Review, ReviewComment, ReviewId};
use crate::loans_repository::{
    ActiveLoan, CreateLoan, LoansRepository, LoansRepositoryError, UpsertReview,
};
use crate::policy::{LoanPolicy, OpenPeriod, PolicyUpdate};

struct StoredOpenPeriod {
    period: OpenPeriod,
    enabled: bool,
}

struct StoredPolicy {
    friday_only: bool,
    loan_period_days: i32,
    // Disabled generations are kept, matching the persistent backend.
    open_periods: Vec<StoredOpenPeriod>,
}

struct StoredLoan {
    id: LoanId,
    book_id: BookId,
    user_email: String,
    loaned_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
}

pub struct InMemoryLoansRepository {
    policy: parking_lot::RwLock<Option<StoredPolicy>>,
    loans: parking_lot::RwLock<Vec<StoredLoan>>,
    reviews: parking_lot::RwLock<HashMap<(BookId, String), Review>>,
    loan_sequence_generator: AtomicI64,
    review_sequence_generator: AtomicI64,
}

impl Default for InMemoryLoansRepository {
    fn default() -> Self {
        Self {
            policy: Default::default(),
            loans: Default::default(),
            reviews: Default::default(),
            loan_sequence_generator: AtomicI64::new(1),
            review_sequence_generator: AtomicI64::new(1),
        }
    }
}

#[async_trait::async_trait]
impl LoansRepository for InMemoryLoansRepository {
    async fn get_policy(&self) -> Result<LoanPolicy, LoansRepositoryError> {
        let locked_policy = self.policy.read();

        Ok(match locked_policy.as_ref() {
            Some(stored) => LoanPolicy {
                friday_only: stored.friday_only,
                loan_period_days: stored.loan_period_days,
                open_periods: stored
                    .open_periods
                    .iter()
                    .filter(|stored_period| stored_period.enabled)
                    .map(|stored_period| stored_period.period.clone())
                    .collect(),
            },
            None => LoanPolicy::default(),
        })
    }

    async fn replace_policy(&self, update: PolicyUpdate) -> Result<(), LoansRepositoryError> {
        let mut locked_policy = self.policy.write();

        let stored = locked_policy.get_or_insert_with(|| StoredPolicy {
            friday_only: update.friday_only,
            loan_period_days: update.loan_period_days,
            open_periods: Vec::new(),
        });
        stored.friday_only = update.friday_only;
        stored.loan_period_days = update.loan_period_days;
        for stored_period in stored.open_periods.iter_mut() {
            stored_period.enabled = false;
        }
        stored
            .open_periods
            .extend(update.open_periods.into_iter().map(|period| StoredOpenPeriod {
                period,
                enabled: true,
            }));
        Ok(())
    }

    async fn is_book_loaned(&self, book_id: BookId) -> Result<bool, LoansRepositoryError> {
        Ok(self
            .loans
            .read()
            .iter()
            .any(|loan| loan.book_id == book_id && loan.returned_at.is_none()))
    }

    async fn create_loan(&self, loan: CreateLoan) -> Result<LoanId, LoansRepositoryError> {
        // The check and the insert happen under one write lock, so two
        // concurrent borrows of the same book cannot both pass.
        let mut locked_loans = self.loans.write();

        if locked_loans
            .iter()
            .any(|existing| existing.book_id == loan.book_id && existing.returned_at.is_none())
        {
            return Err(LoansRepositoryError::BookAlreadyLoaned(loan.book_id));
        }

        let id = self.loan_sequence_generator.fetch_add(1, Ordering::Relaxed);
        locked_loans.push(StoredLoan {
            id,
            book_id: loan.book_id,
            user_email: loan.user_email,
            loaned_at: loan.loaned_at,
            due_at: loan.due_at,
            returned_at: None,
        });
        Ok(id)
    }

    async fn return_loan(
        &self,
        book_id: BookId,
        user_email: &str,
        returned_at: DateTime<Utc>,
    ) -> Result<(), LoansRepositoryError> {
        let mut locked_loans = self.loans.write();

        match locked_loans.iter_mut().find(|loan| {
            loan.book_id == book_id && loan.user_email == user_email && loan.returned_at.is_none()
        }) {
            Some(loan) => {
                loan.returned_at = Some(returned_at);
                Ok(())
            }
            None => Err(LoansRepositoryError::ActiveLoanNotFound(book_id)),
        }
    }

    async fn active_loans_for_user(
        &self,
        user_email: &str,
    ) -> Result<Vec<ActiveLoan>, LoansRepositoryError> {
        let mut loans: Vec<ActiveLoan> = self
            .loans
            .read()
            .iter()
            .filter(|loan| loan.user_email == user_email && loan.returned_at.is_none())
            .map(to_active_loan)
            .collect();
        loans.sort_by(|a, b| b.loaned_at.cmp(&a.loaned_at));
        Ok(loans)
    }

    async fn all_active_loans(&self) -> Result<Vec<ActiveLoan>, LoansRepositoryError> {
        let mut loans: Vec<ActiveLoan> = self
            .loans
            .read()
            .iter()
            .filter(|loan| loan.returned_at.is_none())
            .map(to_active_loan)
            .collect();
        loans.sort_by(|a, b| b.loaned_at.cmp(&a.loaned_at));
        Ok(loans)
    }

    async fn due_counts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DueCount>, LoansRepositoryError> {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for loan in self.loans.read().iter() {
            if loan.returned_at.is_none() && loan.due_at >= start && loan.due_at <= end {
                *counts.entry(loan.user_email.clone()).or_default() += 1;
            }
        }
        let mut counts: Vec<DueCount> = counts
            .into_iter()
            .map(|(user_email, due_count)| DueCount {
                user_email,
                due_count,
            })
            .collect();
        counts.sort_by(|a, b| a.user_email.cmp(&b.user_email));
        Ok(counts)
    }

    async fn upsert_review(&self, review: UpsertReview) -> Result<Review, LoansRepositoryError> {
        let now = Utc::now();
        let mut locked_reviews = self.reviews.write();

        let saved = match locked_reviews.entry((review.book_id, review.user_email.clone())) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                existing.rating = review.rating;
                existing.comment = review.comment;
                existing.updated_at = now;
                existing.clone()
            }
            Entry::Vacant(vacant) => {
                let id: ReviewId = self.review_sequence_generator.fetch_add(1, Ordering::Relaxed);
                vacant
                    .insert(Review {
                        id,
                        book_id: review.book_id,
                        user_email: review.user_email,
                        rating: review.rating,
                        comment: review.comment,
                        created_at: now,
                        updated_at: now,
                    })
                    .clone()
            }
        };
        Ok(saved)
    }

    async fn review_by_user(
        &self,
        book_id: BookId,
        user_email: &str,
    ) -> Result<Option<Review>, LoansRepositoryError> {
        Ok(self
            .reviews
            .read()
            .get(&(book_id, user_email.to_string()))
            .cloned())
    }

    async fn comments_for_book(
        &self,
        book_id: BookId,
    ) -> Result<Vec<ReviewComment>, LoansRepositoryError> {
        let mut comments: Vec<ReviewComment> = self
            .reviews
            .read()
            .values()
            .filter(|review| {
                review.book_id == book_id
                    && review
                        .comment
                        .as_deref()
                        .is_some_and(|comment| !comment.trim().is_empty())
            })
            .map(|review| ReviewComment {
                id: review.id,
                book_id: review.book_id,
                rating: review.rating,
                comment: review.comment.clone(),
                created_at: review.created_at,
                updated_at: review.updated_at,
            })
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }
}

fn to_active_loan(loan: &StoredLoan) -> ActiveLoan {
    ActiveLoan {
        id: loan.id,
        book_id: loan.book_id,
        user_email: loan.user_email.clone(),
        loaned_at: loan.loaned_at,
        due_at: loan.due_at,
    }
}

#[cfg(test)]
mod tests_in_memory_loans_repository {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::policy::OpenPeriod;

    fn at(text: &str) -> DateTime<Utc> {
        text.parse().expect("valid RFC3339 timestamp")
    }

    fn loan_of(book_id: BookId, user_email: &str, loaned_at: DateTime<Utc>) -> CreateLoan {
        CreateLoan {
            book_id,
            user_email: user_email.to_string(),
            loaned_at,
            due_at: loaned_at + Duration::days(2),
        }
    }

    #[tokio::test]
    /// Lifecycle of a single loan
    /// 1. Book starts not loaned
    /// 2. Borrow succeeds, book reads as loaned
    /// 3. A second borrow is rejected
    /// 4. Return by a different user is rejected
    /// 5. Return by the borrower succeeds, book reads as free
    /// 6. A second return is rejected (already returned)
    async fn test_loan_lifecycle() {
        let repository = InMemoryLoansRepository::default();
        let book_id = 1;
        let loaned_at = at("2026-02-20T10:00:00Z");

        assert!(!repository.is_book_loaned(book_id).await.unwrap());

        repository
            .create_loan(loan_of(book_id, "alice@example.com", loaned_at))
            .await
            .unwrap();
        assert!(repository.is_book_loaned(book_id).await.unwrap());

        let conflict = repository
            .create_loan(loan_of(book_id, "bob@example.com", loaned_at))
            .await;
        assert!(matches!(
            conflict,
            Err(LoansRepositoryError::BookAlreadyLoaned(..))
        ));

        let wrong_user = repository
            .return_loan(book_id, "bob@example.com", at("2026-02-21T10:00:00Z"))
            .await;
        assert!(matches!(
            wrong_user,
            Err(LoansRepositoryError::ActiveLoanNotFound(..))
        ));

        repository
            .return_loan(book_id, "alice@example.com", at("2026-02-21T10:00:00Z"))
            .await
            .unwrap();
        assert!(!repository.is_book_loaned(book_id).await.unwrap());

        let double_return = repository
            .return_loan(book_id, "alice@example.com", at("2026-02-21T11:00:00Z"))
            .await;
        assert!(matches!(
            double_return,
            Err(LoansRepositoryError::ActiveLoanNotFound(..))
        ));

        // The book is free again afterwards.
        repository
            .create_loan(loan_of(book_id, "bob@example.com", loaned_at))
            .await
            .unwrap();
    }

    #[tokio::test]
    /// Fires concurrent borrows of the same book and expects exactly one
    /// of them to win.
    async fn test_concurrent_borrows_yield_one_active_loan() {
        let repository = Arc::new(InMemoryLoansRepository::default());
        let book_id = 7;
        let loaned_at = at("2026-02-20T10:00:00Z");

        let attempts = (0..16).map(|i| {
            let repository = repository.clone();
            tokio::spawn(async move {
                repository
                    .create_loan(loan_of(book_id, &format!("user{i}@example.com"), loaned_at))
                    .await
            })
        });

        let mut successes = 0;
        let mut conflicts = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => successes += 1,
                Err(LoansRepositoryError::BookAlreadyLoaned(..)) => conflicts += 1,
                Err(other) => panic!("unexpected error {other}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 15);

        let active = repository.all_active_loans().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].book_id, book_id);
    }

    #[tokio::test]
    /// Active loan listings are scoped and ordered newest first; returned
    /// loans drop out.
    async fn test_active_loan_listings() {
        let repository = InMemoryLoansRepository::default();
        repository
            .create_loan(loan_of(1, "alice@example.com", at("2026-02-20T10:00:00Z")))
            .await
            .unwrap();
        repository
            .create_loan(loan_of(2, "alice@example.com", at("2026-02-20T11:00:00Z")))
            .await
            .unwrap();
        repository
            .create_loan(loan_of(3, "bob@example.com", at("2026-02-20T12:00:00Z")))
            .await
            .unwrap();

        let alice_loans = repository
            .active_loans_for_user("alice@example.com")
            .await
            .unwrap();
        assert_eq!(
            alice_loans
                .iter()
                .map(|loan| loan.book_id)
                .collect::<Vec<_>>(),
            vec![2, 1]
        );

        repository
            .return_loan(2, "alice@example.com", at("2026-02-21T10:00:00Z"))
            .await
            .unwrap();
        let alice_loans = repository
            .active_loans_for_user("alice@example.com")
            .await
            .unwrap();
        assert_eq!(alice_loans.len(), 1);

        let all_loans = repository.all_active_loans().await.unwrap();
        assert_eq!(all_loans.len(), 2);
    }

    #[tokio::test]
    /// Due counts group active loans per user inside the window only.
    async fn test_due_counts() {
        let repository = InMemoryLoansRepository::default();
        let due_day = at("2026-02-22T00:00:00Z");

        for (book_id, email, due_at) in [
            (1, "alice@example.com", due_day + Duration::hours(9)),
            (2, "alice@example.com", due_day + Duration::hours(12)),
            (3, "bob@example.com", due_day + Duration::hours(15)),
            (4, "bob@example.com", due_day + Duration::days(3)),
        ] {
            repository
                .create_loan(CreateLoan {
                    book_id,
                    user_email: email.to_string(),
                    loaned_at: at("2026-02-20T10:00:00Z"),
                    due_at,
                })
                .await
                .unwrap();
        }
        // Returned loans never count.
        repository
            .create_loan(CreateLoan {
                book_id: 5,
                user_email: "carol@example.com".to_string(),
                loaned_at: at("2026-02-20T10:00:00Z"),
                due_at: due_day + Duration::hours(10),
            })
            .await
            .unwrap();
        repository
            .return_loan(5, "carol@example.com", at("2026-02-21T10:00:00Z"))
            .await
            .unwrap();

        let counts = repository
            .due_counts(due_day, due_day + Duration::days(1) - Duration::milliseconds(1))
            .await
            .unwrap();
        assert_eq!(
            counts,
            vec![
                DueCount {
                    user_email: "alice@example.com".to_string(),
                    due_count: 2
                },
                DueCount {
                    user_email: "bob@example.com".to_string(),
                    due_count: 1
                },
            ]
        );
    }

    #[tokio::test]
    /// A second review by the same user overwrites the first in place.
    async fn test_review_upsert() {
        let repository = InMemoryLoansRepository::default();

        let first = repository
            .upsert_review(UpsertReview {
                book_id: 1,
                user_email: "alice@example.com".to_string(),
                rating: 4,
                comment: None,
            })
            .await
            .unwrap();

        let second = repository
            .upsert_review(UpsertReview {
                book_id: 1,
                user_email: "alice@example.com".to_string(),
                rating: 2,
                comment: Some("x".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.rating, 2);
        assert_eq!(second.comment.as_deref(), Some("x"));
        assert_eq!(second.created_at, first.created_at);

        let stored = repository
            .review_by_user(1, "alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.rating, 2);

        // Still a single comment for the book.
        let comments = repository.comments_for_book(1).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].rating, 2);
    }

    #[tokio::test]
    /// Blank comments stay out of the public comment list.
    async fn test_blank_comments_are_filtered() {
        let repository = InMemoryLoansRepository::default();
        for (email, comment) in [
            ("alice@example.com", Some("great read".to_string())),
            ("bob@example.com", Some("   ".to_string())),
            ("carol@example.com", None),
        ] {
            repository
                .upsert_review(UpsertReview {
                    book_id: 1,
                    user_email: email.to_string(),
                    rating: 5,
                    comment,
                })
                .await
                .unwrap();
        }

        let comments = repository.comments_for_book(1).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].comment.as_deref(), Some("great read"));
    }

    #[tokio::test]
    /// Replacing the policy retires every previously enabled window.
    async fn test_policy_replace_round_trip() {
        let repository = InMemoryLoansRepository::default();

        // No row yet: defaults, and reading does not create one.
        let policy = repository.get_policy().await.unwrap();
        assert_eq!(policy, LoanPolicy::default());

        let window = OpenPeriod {
            start_at: at("2026-03-01T00:00:00Z"),
            end_at: at("2026-03-10T23:59:59.999Z"),
            loan_period_days: 14,
        };
        repository
            .replace_policy(PolicyUpdate {
                friday_only: true,
                loan_period_days: 3,
                open_periods: vec![window.clone()],
            })
            .await
            .unwrap();

        let policy = repository.get_policy().await.unwrap();
        assert_eq!(policy.loan_period_days, 3);
        assert_eq!(policy.open_periods, vec![window]);

        repository
            .replace_policy(PolicyUpdate {
                friday_only: false,
                loan_period_days: 5,
                open_periods: vec![],
            })
            .await
            .unwrap();

        let policy = repository.get_policy().await.unwrap();
        assert!(!policy.friday_only);
        assert_eq!(policy.loan_period_days, 5);
        assert_eq!(policy.open_periods, vec![]);
    }
}
