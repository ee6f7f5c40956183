use chrono::{DateTime, Utc};
use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

pub type BookId = i32;

/// Session identity is established upstream; the authenticating proxy
/// forwards the caller's email in this header.
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// The mutable part of a catalog entry, stored as one JSONB document.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct BookDetails {
    #[serde(default)]
    pub google_book_id: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub id: BookId,
    pub isbn13: String,
    #[serde(default)]
    pub google_book_id: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BookRecord {
    pub fn from_details(
        id: BookId,
        isbn13: String,
        details: BookDetails,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            isbn13,
            google_book_id: details.google_book_id,
            title: details.title,
            authors: details.authors,
            description: details.description,
            thumbnail: details.thumbnail,
            created_at,
        }
    }

    pub fn details(&self) -> BookDetails {
        BookDetails {
            google_book_id: self.google_book_id.clone(),
            title: self.title.clone(),
            authors: self.authors.clone(),
            description: self.description.clone(),
            thumbnail: self.thumbnail.clone(),
        }
    }
}

/// A title staged by an admin, waiting for the registration commit.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct PendingBook {
    pub id: BookId,
    pub isbn13: String,
    #[serde(default)]
    pub google_book_id: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct StageBookRequest {
    pub isbn13: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub google_book_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResult {
    pub registered: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct ErrorMessage {
    pub message: String,
}
