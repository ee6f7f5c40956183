pub use in_memory_books_repository::InMemoryBooksRepository;
pub use postgres_books_repository::{PostgresBooksRepository, PostgresBooksRepositoryConfig};

use crate::api::{BookDetails, BookId, BookRecord, PendingBook};

mod in_memory_books_repository;
mod postgres_books_repository;

#[derive(Debug, thiserror::Error)]
pub enum BooksRepositoryError {
    #[error("Book {0} not found")]
    NotFound(BookId),

    #[error("Failed to deserialize book: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait BooksRepository: Send + Sync {
    /// Retrieves a catalog entry by id
    async fn get_book(&self, book_id: BookId) -> Result<BookRecord, BooksRepositoryError>;

    /// Retrieves a catalog entry by its ISBN-13, None when unregistered
    async fn get_book_by_isbn(
        &self,
        isbn13: &str,
    ) -> Result<Option<BookRecord>, BooksRepositoryError>;

    /// Lists the whole catalog, newest registrations first
    async fn list_books(&self) -> Result<Vec<BookRecord>, BooksRepositoryError>;

    /// Stages a title for registration, replacing any staged entry with the
    /// same ISBN
    async fn stage_book(
        &self,
        isbn13: String,
        details: BookDetails,
    ) -> Result<PendingBook, BooksRepositoryError>;

    /// Lists staged titles, newest first
    async fn list_pending(&self) -> Result<Vec<PendingBook>, BooksRepositoryError>;

    /// Moves every staged title into the catalog (upsert by ISBN) and
    /// clears the staging area, all in one atomic unit. Returns how many
    /// titles were moved.
    async fn commit_pending(&self) -> Result<usize, BooksRepositoryError>;
}
