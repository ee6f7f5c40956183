use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row, Statement};

use crate::api::{BookId, DueCount, LoanId, Review, ReviewComment};
use crate::loans_repository::{
    ActiveLoan, CreateLoan, LoansRepository, LoansRepositoryError, UpsertReview,
};
use crate::policy::{LoanPolicy, OpenPeriod, PolicyUpdate};

pub struct PostgresLoansRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

pub struct PostgresLoansRepository {
    // The policy replace runs as a real transaction, which needs exclusive
    // access to the connection, hence the mutex around the single client.
    client: tokio::sync::Mutex<Client>,
}

impl PostgresLoansRepository {
    pub async fn init(config: PostgresLoansRepositoryConfig) -> anyhow::Result<Self> {
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
        CREATE TABLE IF NOT EXISTS loan_settings (
            id                  SERIAL PRIMARY KEY,
            friday_only         BOOLEAN NOT NULL,
            loan_period_days    INTEGER NOT NULL,
            created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        ",
            )
            .await
            .context("Failed to setup loan_settings table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS loan_open_periods (
            id                  SERIAL PRIMARY KEY,
            loan_settings_id    INTEGER NOT NULL REFERENCES loan_settings (id),
            start_at            TIMESTAMPTZ NOT NULL,
            end_at              TIMESTAMPTZ NOT NULL,
            loan_period_days    INTEGER NOT NULL,
            enabled             BOOLEAN NOT NULL DEFAULT TRUE,
            updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        ",
            )
            .await
            .context("Failed to setup loan_open_periods table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS loans (
            id                  BIGSERIAL PRIMARY KEY,
            book_id             INTEGER NOT NULL,
            user_email          TEXT NOT NULL,
            loaned_at           TIMESTAMPTZ NOT NULL,
            due_at              TIMESTAMPTZ NOT NULL,
            returned_at         TIMESTAMPTZ
            );
        CREATE UNIQUE INDEX IF NOT EXISTS loans_one_active_per_book
            ON loans (book_id)
            WHERE returned_at IS NULL
        ",
            )
            .await
            .context("Failed to setup loans table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS book_reviews (
            id                  BIGSERIAL PRIMARY KEY,
            book_id             INTEGER NOT NULL,
            user_email          TEXT NOT NULL,
            rating              INTEGER NOT NULL,
            comment             TEXT,
            created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (book_id, user_email)
            )
        ",
            )
            .await
            .context("Failed to setup book_reviews table")?;

        Ok(Self {
            client: tokio::sync::Mutex::new(client),
        })
    }
}

#[async_trait::async_trait]
impl LoansRepository for PostgresLoansRepository {
    async fn get_policy(&self) -> Result<LoanPolicy, LoansRepositoryError> {
        let client = self.client.lock().await;

        let settings = client
            .query_opt(
                "SELECT id, friday_only, loan_period_days
                 FROM loan_settings
                 ORDER BY created_at ASC
                 LIMIT 1",
                &[],
            )
            .await?;

        let Some(settings) = settings else {
            return Ok(LoanPolicy::default());
        };
        let settings_id: i32 = settings.try_get(0)?;

        let period_rows = client
            .query(
                "SELECT start_at, end_at, loan_period_days
                 FROM loan_open_periods
                 WHERE loan_settings_id = $1
                   AND enabled
                 ORDER BY start_at ASC",
                &[&settings_id],
            )
            .await?;

        let open_periods = period_rows
            .iter()
            .map(|row| {
                Ok(OpenPeriod {
                    start_at: row.try_get(0)?,
                    end_at: row.try_get(1)?,
                    loan_period_days: row.try_get(2)?,
                })
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()?;

        Ok(LoanPolicy {
            friday_only: settings.try_get(1)?,
            loan_period_days: settings.try_get(2)?,
            open_periods,
        })
    }

    async fn replace_policy(&self, update: PolicyUpdate) -> Result<(), LoansRepositoryError> {
        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;

        let existing = transaction
            .query_opt(
                "SELECT id FROM loan_settings ORDER BY created_at ASC LIMIT 1",
                &[],
            )
            .await?;
        let settings_id: i32 = match existing {
            Some(row) => {
                let id: i32 = row.try_get(0)?;
                transaction
                    .execute(
                        "UPDATE loan_settings
                         SET friday_only = $1,
                             loan_period_days = $2,
                             updated_at = NOW()
                         WHERE id = $3",
                        &[&update.friday_only, &update.loan_period_days, &id],
                    )
                    .await?;
                id
            }
            None => {
                let row = transaction
                    .query_one(
                        "INSERT INTO loan_settings (friday_only, loan_period_days)
                         VALUES ($1, $2)
                         RETURNING id",
                        &[&update.friday_only, &update.loan_period_days],
                    )
                    .await?;
                row.try_get(0)?
            }
        };

        transaction
            .execute(
                "UPDATE loan_open_periods
                 SET enabled = FALSE,
                     updated_at = NOW()
                 WHERE loan_settings_id = $1
                   AND enabled",
                &[&settings_id],
            )
            .await?;

        for period in &update.open_periods {
            transaction
                .execute(
                    "INSERT INTO loan_open_periods
                        (loan_settings_id, start_at, end_at, loan_period_days)
                     VALUES ($1, $2, $3, $4)",
                    &[
                        &settings_id,
                        &period.start_at,
                        &period.end_at,
                        &period.loan_period_days,
                    ],
                )
                .await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    async fn is_book_loaned(&self, book_id: BookId) -> Result<bool, LoansRepositoryError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT id FROM loans WHERE book_id = $1 AND returned_at IS NULL LIMIT 1",
                &[&book_id],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn create_loan(&self, loan: CreateLoan) -> Result<LoanId, LoansRepositoryError> {
        let client = self.client.lock().await;
        let stmt: Statement = client
            .prepare(
                "INSERT INTO loans (book_id, user_email, loaned_at, due_at)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id",
            )
            .await?;

        let rows = client
            .query(
                &stmt,
                &[&loan.book_id, &loan.user_email, &loan.loaned_at, &loan.due_at],
            )
            .await;

        match rows {
            Ok(rows) => {
                let id: LoanId = rows
                    .first()
                    .ok_or_else(|| LoansRepositoryError::Other("Id not returned".to_string()))?
                    .try_get(0)?;
                Ok(id)
            }
            Err(err)
                if err
                    .as_db_error()
                    // Unique violation on the active-loan partial index
                    .map(|db_err| db_err.code() == &SqlState::from_code("23505"))
                    .unwrap_or_default() =>
            {
                Err(LoansRepositoryError::BookAlreadyLoaned(loan.book_id))
            }
            Err(other_err) => Err(other_err.into()),
        }
    }

    async fn return_loan(
        &self,
        book_id: BookId,
        user_email: &str,
        returned_at: DateTime<Utc>,
    ) -> Result<(), LoansRepositoryError> {
        let client = self.client.lock().await;
        let updated = client
            .execute(
                "UPDATE loans
                 SET returned_at = $1
                 WHERE book_id = $2
                   AND user_email = $3
                   AND returned_at IS NULL",
                &[&returned_at, &book_id, &user_email],
            )
            .await?;

        if updated == 0 {
            Err(LoansRepositoryError::ActiveLoanNotFound(book_id))
        } else {
            Ok(())
        }
    }

    async fn active_loans_for_user(
        &self,
        user_email: &str,
    ) -> Result<Vec<ActiveLoan>, LoansRepositoryError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT id, book_id, user_email, loaned_at, due_at
                 FROM loans
                 WHERE user_email = $1
                   AND returned_at IS NULL
                 ORDER BY loaned_at DESC",
                &[&user_email],
            )
            .await?;
        rows.iter().map(active_loan_from_row).collect()
    }

    async fn all_active_loans(&self) -> Result<Vec<ActiveLoan>, LoansRepositoryError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT id, book_id, user_email, loaned_at, due_at
                 FROM loans
                 WHERE returned_at IS NULL
                 ORDER BY loaned_at DESC",
                &[],
            )
            .await?;
        rows.iter().map(active_loan_from_row).collect()
    }

    async fn due_counts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DueCount>, LoansRepositoryError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT user_email, COUNT(*)
                 FROM loans
                 WHERE returned_at IS NULL
                   AND due_at >= $1
                   AND due_at <= $2
                 GROUP BY user_email
                 ORDER BY user_email",
                &[&start, &end],
            )
            .await?;
        rows.iter()
            .map(|row| {
                Ok(DueCount {
                    user_email: row.try_get(0)?,
                    due_count: row.try_get(1)?,
                })
            })
            .collect()
    }

    async fn upsert_review(&self, review: UpsertReview) -> Result<Review, LoansRepositoryError> {
        let client = self.client.lock().await;
        let row = client
            .query_one(
                "INSERT INTO book_reviews (book_id, user_email, rating, comment)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (book_id, user_email)
                 DO UPDATE SET
                   rating = EXCLUDED.rating,
                   comment = EXCLUDED.comment,
                   updated_at = NOW()
                 RETURNING id, book_id, user_email, rating, comment, created_at, updated_at",
                &[
                    &review.book_id,
                    &review.user_email,
                    &review.rating,
                    &review.comment,
                ],
            )
            .await?;
        review_from_row(&row)
    }

    async fn review_by_user(
        &self,
        book_id: BookId,
        user_email: &str,
    ) -> Result<Option<Review>, LoansRepositoryError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT id, book_id, user_email, rating, comment, created_at, updated_at
                 FROM book_reviews
                 WHERE book_id = $1
                   AND user_email = $2
                 LIMIT 1",
                &[&book_id, &user_email],
            )
            .await?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn comments_for_book(
        &self,
        book_id: BookId,
    ) -> Result<Vec<ReviewComment>, LoansRepositoryError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT id, book_id, rating, comment, created_at, updated_at
                 FROM book_reviews
                 WHERE book_id = $1
                   AND comment IS NOT NULL
                   AND BTRIM(comment) <> ''
                 ORDER BY created_at DESC",
                &[&book_id],
            )
            .await?;
        rows.iter()
            .map(|row| {
                Ok(ReviewComment {
                    id: row.try_get(0)?,
                    book_id: row.try_get(1)?,
                    rating: row.try_get(2)?,
                    comment: row.try_get(3)?,
                    created_at: row.try_get(4)?,
                    updated_at: row.try_get(5)?,
                })
            })
            .collect()
    }
}

fn active_loan_from_row(row: &Row) -> Result<ActiveLoan, LoansRepositoryError> {
    Ok(ActiveLoan {
        id: row.try_get(0)?,
        book_id: row.try_get(1)?,
        user_email: row.try_get(2)?,
        loaned_at: row.try_get(3)?,
        due_at: row.try_get(4)?,
    })
}

fn review_from_row(row: &Row) -> Result<Review, LoansRepositoryError> {
    Ok(Review {
        id: row.try_get(0)?,
        book_id: row.try_get(1)?,
        user_email: row.try_get(2)?,
        rating: row.try_get(3)?,
        comment: row.try_get(4)?,
        created_at: row.try_get(5)?,
        updated_at: row.try_get(6)?,
    })
}
