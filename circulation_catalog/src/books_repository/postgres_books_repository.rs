use anyhow::Context;
use serde_json::json;
use tokio_postgres::{Client, NoTls, Row, Statement};

use crate::api::{BookDetails, BookId, BookRecord, PendingBook};
use crate::books_repository::{BooksRepository, BooksRepositoryError};

pub struct PostgresBooksRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

pub struct PostgresBooksRepository {
    // The registration commit runs as a transaction, which needs exclusive
    // access to the connection, hence the mutex around the single client.
    client: tokio::sync::Mutex<Client>,
}

impl PostgresBooksRepository {
    pub async fn init(config: PostgresBooksRepositoryConfig) -> anyhow::Result<Self> {
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
        CREATE TABLE IF NOT EXISTS books (
            id              SERIAL PRIMARY KEY,
            isbn13          TEXT NOT NULL UNIQUE,
            params          JSONB NOT NULL,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        ",
            )
            .await
            .context("Failed to setup books table")?;

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS pending_books (
            id              SERIAL PRIMARY KEY,
            isbn13          TEXT NOT NULL UNIQUE,
            params          JSONB NOT NULL,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        ",
            )
            .await
            .context("Failed to setup pending_books table")?;

        Ok(Self {
            client: tokio::sync::Mutex::new(client),
        })
    }
}

#[async_trait::async_trait]
impl BooksRepository for PostgresBooksRepository {
    async fn get_book(&self, book_id: BookId) -> Result<BookRecord, BooksRepositoryError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT id, isbn13, params, created_at FROM books WHERE id = ($1)",
                &[&book_id],
            )
            .await?;

        row.as_ref()
            .map(book_from_row)
            .transpose()?
            .ok_or(BooksRepositoryError::NotFound(book_id))
    }

    async fn get_book_by_isbn(
        &self,
        isbn13: &str,
    ) -> Result<Option<BookRecord>, BooksRepositoryError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT id, isbn13, params, created_at
                 FROM books
                 WHERE isbn13 = $1
                 LIMIT 1",
                &[&isbn13],
            )
            .await?;
        row.as_ref().map(book_from_row).transpose()
    }

    async fn list_books(&self) -> Result<Vec<BookRecord>, BooksRepositoryError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT id, isbn13, params, created_at
                 FROM books
                 ORDER BY created_at DESC",
                &[],
            )
            .await?;
        rows.iter().map(book_from_row).collect()
    }

    async fn stage_book(
        &self,
        isbn13: String,
        details: BookDetails,
    ) -> Result<PendingBook, BooksRepositoryError> {
        let client = self.client.lock().await;
        let stmt: Statement = client
            .prepare(
                "INSERT INTO pending_books (isbn13, params)
                 VALUES ($1, $2)
                 ON CONFLICT (isbn13)
                 DO UPDATE SET params = EXCLUDED.params
                 RETURNING id, isbn13, params, created_at",
            )
            .await?;
        let row = client.query_one(&stmt, &[&isbn13, &json!(details)]).await?;
        pending_from_row(&row)
    }

    async fn list_pending(&self) -> Result<Vec<PendingBook>, BooksRepositoryError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT id, isbn13, params, created_at
                 FROM pending_books
                 ORDER BY created_at DESC",
                &[],
            )
            .await?;
        rows.iter().map(pending_from_row).collect()
    }

    async fn commit_pending(&self) -> Result<usize, BooksRepositoryError> {
        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;

        let moved = transaction
            .execute(
                "INSERT INTO books (isbn13, params)
                 SELECT isbn13, params FROM pending_books
                 ON CONFLICT (isbn13)
                 DO UPDATE SET params = EXCLUDED.params",
                &[],
            )
            .await?;
        transaction.execute("DELETE FROM pending_books", &[]).await?;

        transaction.commit().await?;
        Ok(moved as usize)
    }
}

fn book_from_row(row: &Row) -> Result<BookRecord, BooksRepositoryError> {
    let params: serde_json::Value = row.try_get(2)?;
    let details: BookDetails = serde_json::from_value(params)?;
    Ok(BookRecord::from_details(
        row.try_get(0)?,
        row.try_get(1)?,
        details,
        row.try_get(3)?,
    ))
}

fn pending_from_row(row: &Row) -> Result<PendingBook, BooksRepositoryError> {
    let params: serde_json::Value = row.try_get(2)?;
    let details: BookDetails = serde_json::from_value(params)?;
    Ok(PendingBook {
        id: row.try_get(0)?,
        isbn13: row.try_get(1)?,
        google_book_id: details.google_book_id,
        title: details.title,
        authors: details.authors,
        description: details.description,
        thumbnail: details.thumbnail,
        created_at: row.try_get(3)?,
    })
}
