use anyhow::{bail, Context};
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;

use crate::api::{
    BookId, BookRecord, PendingBook, RegistrationResult, StageBookRequest, USER_EMAIL_HEADER,
};

pub struct CirculationCatalogClient {
    url: String,
    client: ClientWithMiddleware,
}

impl CirculationCatalogClient {
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

    /// Calls GET /api/book/{book_id} endpoint
    /// Returns the record if the book is registered, None if not
    pub async fn get_book(&self, book_id: BookId) -> anyhow::Result<Option<BookRecord>> {
        let response = self
            .client
            .get(format!("{}/api/book/{}", self.url, book_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to get book {}", error)
        }
    }

    /// Calls GET /api/catalog/{isbn13} endpoint
    /// Returns the record if the ISBN is registered, None if not
    pub async fn lookup_by_isbn(
        &self,
        user_email: &str,
        isbn13: &str,
    ) -> anyhow::Result<Option<BookRecord>> {
        let response = self
            .client
            .get(format!("{}/api/catalog/{}", self.url, isbn13))
            .header(USER_EMAIL_HEADER, user_email)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to look up ISBN {}", error)
        }
    }

    /// Calls GET /api/books endpoint
    pub async fn list_books(&self, user_email: &str) -> anyhow::Result<Vec<BookRecord>> {
        let response = self
            .client
            .get(format!("{}/api/books", self.url))
            .header(USER_EMAIL_HEADER, user_email)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to list books {}", error)
        }
    }

    /// Calls POST /api/admin/pending-books endpoint (admin)
    pub async fn stage_book(
        &self,
        admin_email: &str,
        request: &StageBookRequest,
    ) -> anyhow::Result<PendingBook> {
        let response = self
            .client
            .post(format!("{}/api/admin/pending-books", self.url))
            .header(USER_EMAIL_HEADER, admin_email)
            .json(request)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to stage book {}", error)
        }
    }

    /// Calls POST /api/admin/book-registration endpoint (admin)
    /// Returns how many staged titles were registered
    pub async fn commit_registration(&self, admin_email: &str) -> anyhow::Result<usize> {
        let response = self
            .client
            .post(format!("{}/api/admin/book-registration", self.url))
            .header(USER_EMAIL_HEADER, admin_email)
            .send()
            .await?;
        if response.status().is_success() {
            let result: RegistrationResult = response.json().await?;
            Ok(result.registered)
        } else {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to commit registration {}", error)
        }
    }
}
