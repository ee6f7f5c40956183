use anyhow::Context;
use reqwest_middleware::ClientBuilder;
use reqwest_tracing::TracingMiddleware;

use crate::api::{BookId, BookSummary};

/// Resolves book ids against the catalog service. A loan may only ever be
/// created for a registered book, so every borrow goes through this check.
pub struct CatalogBookChecker {
    catalog_service_url: String,
}

impl CatalogBookChecker {
    pub fn new(catalog_service_url: String) -> Self {
        Self {
            catalog_service_url,
        }
    }

    /// `Ok(None)` means the catalog does not know the book; transport and
    /// server failures surface as errors.
    pub async fn fetch_book(&self, book_id: BookId) -> anyhow::Result<Option<BookSummary>> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client)
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();

        let response = client
            .get(&format!(
                "{}/api/book/{}",
                self.catalog_service_url, book_id
            ))
            .send()
            .await
            .context("Failed to get book by id")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("Catalog lookup failed with status {}", response.status());
        }
        let book = response
            .json()
            .await
            .context("Failed to deserialize book")?;
        Ok(Some(book))
    }
}
