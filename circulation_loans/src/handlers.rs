use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{Error, HttpRequest, HttpResponse};
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use paperclip::actix::{
    api_v2_operation,
    web::{self},
};

use crate::api::{
    ActiveLoanRecord, BookStatusResponse, BorrowRequest, DueBookEntry, DueWindowQuery,
    ErrorMessage, ExceptionRuleDto, LoanWithBook, OkResponse, PolicyResponse, PolicyUpdateRequest,
    PostReviewResponse, ReturnRequest, ReviewRequest, ReviewsQuery, ReviewsResponse,
};
use crate::auth::{self, AdminList};
use crate::book_lookup::CatalogBookChecker;
use crate::eligibility::{self, LoanDenial, LoanRules};
use crate::loans_repository::{CreateLoan, LoansRepository, LoansRepositoryError, UpsertReview};
use crate::policy::{self, DEFAULT_LOAN_PERIOD_DAYS};

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().finish())
}

#[api_v2_operation]
pub async fn get_policy(
    req: HttpRequest,
    loans_repository: Data<Arc<dyn LoansRepository>>,
    admins: Data<AdminList>,
) -> Result<HttpResponse, Error> {
    if let Err(response) = auth::require_admin(&req, &admins) {
        return Ok(response);
    }

    Ok(match loans_repository.get_policy().await {
        Ok(policy) => {
            let exception_rules: Vec<ExceptionRuleDto> = policy
                .open_periods
                .iter()
                .map(|period| ExceptionRuleDto {
                    start_date: policy::format_day(period.start_at),
                    end_date: policy::format_day(period.end_at),
                    loan_period_days: period.loan_period_days,
                })
                .collect();
            let first_rule = exception_rules.first();
            HttpResponse::Ok().json(PolicyResponse {
                friday_only: policy.friday_only,
                loan_period_days: policy.loan_period_days,
                exception_start_date: first_rule
                    .map(|rule| rule.start_date.clone())
                    .unwrap_or_default(),
                exception_end_date: first_rule
                    .map(|rule| rule.end_date.clone())
                    .unwrap_or_default(),
                exception_loan_period_days: first_rule
                    .map(|rule| rule.loan_period_days)
                    .unwrap_or(DEFAULT_LOAN_PERIOD_DAYS),
                exception_rules,
            })
        }
        Err(err) => {
            tracing::error!("Get policy failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn put_policy(
    req: HttpRequest,
    loans_repository: Data<Arc<dyn LoansRepository>>,
    admins: Data<AdminList>,
    body: web::Json<PolicyUpdateRequest>,
) -> Result<HttpResponse, Error> {
    if let Err(response) = auth::require_admin(&req, &admins) {
        return Ok(response);
    }

    let update = match policy::validate_update(&body, Utc::now()) {
        Ok(update) => update,
        Err(err) => {
            return Ok(HttpResponse::BadRequest().json(ErrorMessage {
                message: err.to_string(),
            }))
        }
    };

    Ok(match loans_repository.replace_policy(update).await {
        Ok(()) => HttpResponse::Ok().json(OkResponse { ok: true }),
        Err(err) => {
            tracing::error!("Replace policy failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn borrow_book(
    req: HttpRequest,
    loans_repository: Data<Arc<dyn LoansRepository>>,
    book_checker: Data<CatalogBookChecker>,
    rules: Data<LoanRules>,
    body: web::Json<BorrowRequest>,
) -> Result<HttpResponse, Error> {
    let user_email = match auth::session_user(&req) {
        Ok(email) => email,
        Err(response) => return Ok(response),
    };
    let book_id = body.book_id;
    let now = Utc::now();

    match book_checker.fetch_book(book_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Ok(HttpResponse::NotFound().body("Book not found")),
        Err(err) => {
            tracing::error!("Catalog lookup for borrow failed {:#}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    }

    // Policy and ledger state are read fresh on every attempt; nothing is
    // cached across requests.
    let loan_policy = match loans_repository.get_policy().await {
        Ok(loan_policy) => loan_policy,
        Err(err) => {
            tracing::error!("Get policy for borrow failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };
    let actively_loaned = match loans_repository.is_book_loaned(book_id).await {
        Ok(actively_loaned) => actively_loaned,
        Err(err) => {
            tracing::error!("Active loan check failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    let grant = match eligibility::decide(now, &loan_policy, rules.weekday_offset, actively_loaned)
    {
        Ok(grant) => grant,
        Err(LoanDenial::OutsideLoanWindow) => {
            return Ok(HttpResponse::Forbidden().body("Loans may only start on Fridays"))
        }
        Err(LoanDenial::AlreadyLoaned) => {
            return Ok(HttpResponse::Conflict().body("The book is already loaned out"))
        }
    };

    // The insert re-checks the invariant, so losing a race here still
    // resolves to a conflict rather than a duplicate active loan.
    Ok(match loans_repository
        .create_loan(CreateLoan {
            book_id,
            user_email,
            loaned_at: now,
            due_at: grant.due_at,
        })
        .await
    {
        Ok(_) => HttpResponse::Ok().body("Loan created"),
        Err(LoansRepositoryError::BookAlreadyLoaned(_)) => {
            HttpResponse::Conflict().body("The book is already loaned out")
        }
        Err(err) => {
            tracing::error!("Borrow failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn my_loans(
    req: HttpRequest,
    loans_repository: Data<Arc<dyn LoansRepository>>,
    book_checker: Data<CatalogBookChecker>,
) -> Result<HttpResponse, Error> {
    let user_email = match auth::session_user(&req) {
        Ok(email) => email,
        Err(response) => return Ok(response),
    };

    let loans = match loans_repository.active_loans_for_user(&user_email).await {
        Ok(loans) => loans,
        Err(err) => {
            tracing::error!("List loans failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    let mut loans_with_books = Vec::with_capacity(loans.len());
    for loan in loans {
        let book = match book_checker.fetch_book(loan.book_id).await {
            Ok(book) => {
                if book.is_none() {
                    tracing::warn!("Book {} missing from catalog", loan.book_id);
                }
                book
            }
            Err(err) => {
                tracing::warn!("Failed to get details for book {} {:#}", loan.book_id, err);
                None
            }
        };
        loans_with_books.push(LoanWithBook {
            id: loan.id,
            book_id: loan.book_id,
            loaned_at: loan.loaned_at,
            due_at: loan.due_at,
            book,
        });
    }

    Ok(HttpResponse::Ok().json(loans_with_books))
}

#[api_v2_operation]
pub async fn return_book(
    req: HttpRequest,
    loans_repository: Data<Arc<dyn LoansRepository>>,
    body: web::Json<ReturnRequest>,
) -> Result<HttpResponse, Error> {
    let user_email = match auth::session_user(&req) {
        Ok(email) => email,
        Err(response) => return Ok(response),
    };

    Ok(match loans_repository
        .return_loan(body.book_id, &user_email, Utc::now())
        .await
    {
        Ok(()) => HttpResponse::Ok().json(OkResponse { ok: true }),
        // Covers "already returned", "never borrowed" and "borrowed by
        // someone else" alike; the caller only ever sees their own loans.
        Err(LoansRepositoryError::ActiveLoanNotFound(_)) => {
            HttpResponse::NotFound().body("No active loan to return")
        }
        Err(err) => {
            tracing::error!("Return failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn everyone_borrowed(
    req: HttpRequest,
    loans_repository: Data<Arc<dyn LoansRepository>>,
) -> Result<HttpResponse, Error> {
    if let Err(response) = auth::session_user(&req) {
        return Ok(response);
    }

    Ok(match loans_repository.all_active_loans().await {
        Ok(loans) => HttpResponse::Ok().json(
            loans
                .into_iter()
                .map(|loan| ActiveLoanRecord {
                    id: loan.id,
                    book_id: loan.book_id,
                    loaned_at: loan.loaned_at,
                })
                .collect::<Vec<_>>(),
        ),
        Err(err) => {
            tracing::error!("List active loans failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn book_status(
    req: HttpRequest,
    loans_repository: Data<Arc<dyn LoansRepository>>,
    book_checker: Data<CatalogBookChecker>,
    rules: Data<LoanRules>,
) -> Result<HttpResponse, Error> {
    let user_email = match auth::session_user(&req) {
        Ok(email) => email,
        Err(response) => return Ok(response),
    };

    let loans = match loans_repository.active_loans_for_user(&user_email).await {
        Ok(loans) => loans,
        Err(err) => {
            tracing::error!("List loans for status failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    let (today_start, today_end) = local_day_range(Utc::now(), rules.weekday_offset);
    let mut due_today = Vec::new();
    let mut overdue = Vec::new();
    for loan in loans {
        if loan.due_at > today_end {
            continue;
        }
        let book_title = match book_checker.fetch_book(loan.book_id).await {
            Ok(Some(book)) => book.title,
            Ok(None) => {
                tracing::warn!("Book {} missing from catalog", loan.book_id);
                continue;
            }
            Err(err) => {
                tracing::warn!("Failed to get details for book {} {:#}", loan.book_id, err);
                continue;
            }
        };
        let entry = DueBookEntry {
            book_title,
            due_date: loan.due_at,
        };
        if loan.due_at < today_start {
            overdue.push(entry);
        } else {
            due_today.push(entry);
        }
    }
    due_today.sort_by(|a, b| a.due_date.cmp(&b.due_date));
    overdue.sort_by(|a, b| a.due_date.cmp(&b.due_date));

    Ok(HttpResponse::Ok().json(BookStatusResponse { due_today, overdue }))
}

#[api_v2_operation]
pub async fn due_counts(
    loans_repository: Data<Arc<dyn LoansRepository>>,
    window: web::Query<DueWindowQuery>,
) -> Result<HttpResponse, Error> {
    Ok(
        match loans_repository.due_counts(window.start, window.end).await {
            Ok(counts) => HttpResponse::Ok().json(counts),
            Err(err) => {
                tracing::error!("Due counts failed {}", err);
                HttpResponse::InternalServerError().finish()
            }
        },
    )
}

#[api_v2_operation]
pub async fn post_review(
    req: HttpRequest,
    loans_repository: Data<Arc<dyn LoansRepository>>,
    book_checker: Data<CatalogBookChecker>,
    body: web::Json<ReviewRequest>,
) -> Result<HttpResponse, Error> {
    let user_email = match auth::session_user(&req) {
        Ok(email) => email,
        Err(response) => return Ok(response),
    };

    if !(1..=5).contains(&body.rating) {
        return Ok(HttpResponse::BadRequest().json(ErrorMessage {
            message: "rating must be an integer between 1 and 5".to_string(),
        }));
    }

    match book_checker.fetch_book(body.book_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Ok(HttpResponse::NotFound().body("Book not found")),
        Err(err) => {
            tracing::error!("Catalog lookup for review failed {:#}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    }

    Ok(match loans_repository
        .upsert_review(UpsertReview {
            book_id: body.book_id,
            user_email,
            rating: body.rating,
            comment: body.comment.clone(),
        })
        .await
    {
        Ok(saved) => HttpResponse::Ok().json(PostReviewResponse {
            ok: true,
            data: saved,
        }),
        Err(err) => {
            tracing::error!("Save review failed {}", err);
            HttpResponse::InternalServerError().finish()
        }
    })
}

#[api_v2_operation]
pub async fn get_reviews(
    req: HttpRequest,
    loans_repository: Data<Arc<dyn LoansRepository>>,
    query: web::Query<ReviewsQuery>,
) -> Result<HttpResponse, Error> {
    let user_email = match auth::session_user(&req) {
        Ok(email) => email,
        Err(response) => return Ok(response),
    };

    let user_review = match loans_repository
        .review_by_user(query.book_id, &user_email)
        .await
    {
        Ok(user_review) => user_review,
        Err(err) => {
            tracing::error!("Get user review failed {}", err);
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };
    Ok(
        match loans_repository.comments_for_book(query.book_id).await {
            Ok(comments) => HttpResponse::Ok().json(ReviewsResponse {
                user_review,
                comments,
            }),
            Err(err) => {
                tracing::error!("Get comments failed {}", err);
                HttpResponse::InternalServerError().finish()
            }
        },
    )
}

/// Bounds of the calendar day containing `now` in the given fixed offset,
/// as UTC instants.
fn local_day_range(now: DateTime<Utc>, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = now
        .with_timezone(&offset)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    let start = offset
        .from_local_datetime(&midnight)
        .single()
        .expect("fixed offsets map local times uniquely")
        .with_timezone(&Utc);
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    (start, end)
}
