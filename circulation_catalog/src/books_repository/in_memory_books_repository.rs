use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use chrono::Utc;

use crate::api::{BookDetails, BookId, BookRecord, PendingBook};
use crate::books_repository::{BooksRepository, BooksRepositoryError};

pub struct InMemoryBooksRepository {
    // Keyed by ISBN to get the same upsert semantics as the unique column.
    books: parking_lot::RwLock<HashMap<String, BookRecord>>,
    pending: parking_lot::RwLock<HashMap<String, PendingBook>>,
    book_sequence_generator: AtomicI32,
}

impl Default for InMemoryBooksRepository {
    fn default() -> Self {
        Self {
            books: Default::default(),
            pending: Default::default(),
            book_sequence_generator: AtomicI32::new(1),
        }
    }
}

#[async_trait::async_trait]
impl BooksRepository for InMemoryBooksRepository {
    async fn get_book(&self, book_id: BookId) -> Result<BookRecord, BooksRepositoryError> {
        self.books
            .read()
            .values()
            .find(|book| book.id == book_id)
            .cloned()
            .ok_or(BooksRepositoryError::NotFound(book_id))
    }

    async fn get_book_by_isbn(
        &self,
        isbn13: &str,
    ) -> Result<Option<BookRecord>, BooksRepositoryError> {
        Ok(self.books.read().get(isbn13).cloned())
    }

    async fn list_books(&self) -> Result<Vec<BookRecord>, BooksRepositoryError> {
        let mut books: Vec<BookRecord> = self.books.read().values().cloned().collect();
        books.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(books)
    }

    async fn stage_book(
        &self,
        isbn13: String,
        details: BookDetails,
    ) -> Result<PendingBook, BooksRepositoryError> {
        let mut locked_pending = self.pending.write();

        let id = match locked_pending.get(&isbn13) {
            Some(existing) => existing.id,
            None => self.book_sequence_generator.fetch_add(1, Ordering::Relaxed),
        };
        let staged = PendingBook {
            id,
            isbn13: isbn13.clone(),
            google_book_id: details.google_book_id,
            title: details.title,
            authors: details.authors,
            description: details.description,
            thumbnail: details.thumbnail,
            created_at: Utc::now(),
        };
        locked_pending.insert(isbn13, staged.clone());
        Ok(staged)
    }

    async fn list_pending(&self) -> Result<Vec<PendingBook>, BooksRepositoryError> {
        let mut pending: Vec<PendingBook> = self.pending.read().values().cloned().collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pending)
    }

    async fn commit_pending(&self) -> Result<usize, BooksRepositoryError> {
        // Both locks held for the whole move keeps the commit atomic.
        let mut locked_pending = self.pending.write();
        let mut locked_books = self.books.write();

        let registered = locked_pending.len();
        for (isbn13, staged) in locked_pending.drain() {
            let id = match locked_books.get(&isbn13) {
                Some(existing) => existing.id,
                None => self.book_sequence_generator.fetch_add(1, Ordering::Relaxed),
            };
            let created_at = locked_books
                .get(&isbn13)
                .map(|existing| existing.created_at)
                .unwrap_or_else(Utc::now);
            locked_books.insert(
                isbn13.clone(),
                BookRecord {
                    id,
                    isbn13,
                    google_book_id: staged.google_book_id,
                    title: staged.title,
                    authors: staged.authors,
                    description: staged.description,
                    thumbnail: staged.thumbnail,
                    created_at,
                },
            );
        }
        Ok(registered)
    }
}
