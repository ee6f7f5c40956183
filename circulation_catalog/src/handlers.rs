use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{Error, HttpRequest, HttpResponse};
use paperclip::actix::{
    api_v2_operation,
    web::{self},
};

use crate::api::{BookDetails, BookId, ErrorMessage, RegistrationResult, StageBookRequest};
use crate::auth::{self, AdminList};
use crate::books_repository::{BooksRepository, BooksRepositoryError};
use crate::isbn;

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().finish())
}

#[api_v2_operation]
pub async fn lookup_by_isbn(
    req: HttpRequest,
    books_repository: Data<Arc<dyn BooksRepository>>,
    isbn13: web::Path<String>,
) -> Result<HttpResponse, Error> {
    if let Err(response) = auth::session_user(&req) {
        return Ok(response);
    }
    let isbn13 = isbn13.into_inner();
    if !isbn::is_valid_isbn13(&isbn13) {
        return Ok(HttpResponse::BadRequest().json(ErrorMessage {
            message: "isbn13 must be a 13-digit bookland number".to_string(),
        }));
    }

    Ok(match books_repository.get_book_by_isbn(&isbn13).await {
        Ok(Some(book)) => HttpResponse::Ok().json(book),
        Ok(None) => HttpResponse::NotFound().body("This book is not registered"),
        Err(err) => {
            tracing::error!("ISBN lookup failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn get_book(
    books_repository: Data<Arc<dyn BooksRepository>>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    Ok(
        match books_repository.get_book(book_id.into_inner()).await {
            Ok(book) => HttpResponse::Ok().json(book),
            Err(BooksRepositoryError::NotFound(_)) => HttpResponse::NotFound().finish(),
            Err(err) => {
                tracing::error!("Get book failed {}", err);
                HttpResponse::InternalServerError().finish()
            }
        },
    )
}

#[api_v2_operation]
pub async fn get_all_books(
    req: HttpRequest,
    books_repository: Data<Arc<dyn BooksRepository>>,
) -> Result<HttpResponse, Error> {
    if let Err(response) = auth::session_user(&req) {
        return Ok(response);
    }
    Ok(match books_repository.list_books().await {
        Ok(books) => HttpResponse::Ok().json(books),
        Err(err) => {
            tracing::error!("Get all books failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn get_pending_books(
    req: HttpRequest,
    books_repository: Data<Arc<dyn BooksRepository>>,
    admins: Data<AdminList>,
) -> Result<HttpResponse, Error> {
    if let Err(response) = auth::require_admin(&req, &admins) {
        return Ok(response);
    }
    Ok(match books_repository.list_pending().await {
        Ok(pending) => HttpResponse::Ok().json(pending),
        Err(err) => {
            tracing::error!("List pending books failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn stage_book(
    req: HttpRequest,
    books_repository: Data<Arc<dyn BooksRepository>>,
    admins: Data<AdminList>,
    body: web::Json<StageBookRequest>,
) -> Result<HttpResponse, Error> {
    if let Err(response) = auth::require_admin(&req, &admins) {
        return Ok(response);
    }
    let body = body.into_inner();
    if !isbn::is_valid_isbn13(&body.isbn13) {
        return Ok(HttpResponse::BadRequest().json(ErrorMessage {
            message: "isbn13 must be a 13-digit bookland number".to_string(),
        }));
    }
    if body.title.is_empty() {
        return Ok(HttpResponse::BadRequest().json(ErrorMessage {
            message: "title must not be empty".to_string(),
        }));
    }

    let details = BookDetails {
        google_book_id: body.google_book_id,
        title: body.title,
        authors: body.authors,
        description: body.description,
        thumbnail: body.thumbnail,
    };
    Ok(
        match books_repository.stage_book(body.isbn13, details).await {
            Ok(staged) => HttpResponse::Ok().json(staged),
            Err(err) => {
                tracing::error!("Stage book failed {}", err);
                HttpResponse::InternalServerError().finish()
            }
        },
    )
}

#[api_v2_operation]
pub async fn commit_registration(
    req: HttpRequest,
    books_repository: Data<Arc<dyn BooksRepository>>,
    admins: Data<AdminList>,
) -> Result<HttpResponse, Error> {
    if let Err(response) = auth::require_admin(&req, &admins) {
        return Ok(response);
    }
    Ok(match books_repository.commit_pending().await {
        Ok(registered) => HttpResponse::Ok().json(RegistrationResult { registered }),
        Err(err) => {
            tracing::error!("Registration commit failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}
