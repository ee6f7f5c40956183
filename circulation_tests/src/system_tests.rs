use circulation_catalog::api::StageBookRequest;
use circulation_catalog::client::CirculationCatalogClient;
use circulation_loans::api::PolicyUpdateRequest;
use circulation_loans::client::{BorrowOutcome, CirculationLoansClient};
use circulation_notifications::api::{SubscribeRequest, SubscriptionKeys, UnsubscribeRequest};
use circulation_notifications::client::CirculationNotificationsClient;

const ADMIN_EMAIL: &str = "admin@example.com";

fn catalog_url() -> String {
    std::env::var("CATALOG_SERVICE_URL").unwrap_or("http://127.0.0.1:8080".to_string())
}

fn loans_url() -> String {
    std::env::var("LOANS_SERVICE_URL").unwrap_or("http://127.0.0.1:8081".to_string())
}

fn notifications_url() -> String {
    std::env::var("NOTIFICATIONS_SERVICE_URL").unwrap_or("http://127.0.0.1:8082".to_string())
}

fn random_isbn13() -> String {
    let digits: u64 = rand::random::<u64>() % 10_000_000_000;
    format!("978{digits:010}")
}

fn random_email(prefix: &str) -> String {
    format!("{prefix}{}@example.com", rand::random::<u32>())
}

async fn register_book(
    catalog_client: &CirculationCatalogClient,
    isbn13: &str,
    title: &str,
) -> i32 {
    catalog_client
        .stage_book(
            ADMIN_EMAIL,
            &StageBookRequest {
                isbn13: isbn13.to_string(),
                title: title.to_string(),
                authors: vec!["Author1".to_string()],
                google_book_id: None,
                description: None,
                thumbnail: None,
            },
        )
        .await
        .expect("Failed to stage book");
    catalog_client
        .commit_registration(ADMIN_EMAIL)
        .await
        .expect("Failed to commit registration");
    catalog_client
        .lookup_by_isbn(ADMIN_EMAIL, isbn13)
        .await
        .expect("Failed to look up book")
        .expect("Book not registered")
        .id
}

#[tokio::test]
/// Simple test for the catalog registration pipeline
/// Stages a book
/// Commits the registration
/// Looks the book up by ISBN and by id
/// Checks it shows up in the full listing
async fn circulation_catalog_e2e_test() {
    let catalog_client =
        CirculationCatalogClient::new(&catalog_url()).expect("Failed to create client");

    let isbn13 = random_isbn13();
    let book_id = register_book(&catalog_client, &isbn13, "title1").await;

    let by_id = catalog_client
        .get_book(book_id)
        .await
        .expect("Failed to get book")
        .expect("Book not found");
    assert_eq!(by_id.isbn13, isbn13);
    assert_eq!(by_id.title, "title1");

    let books = catalog_client
        .list_books(ADMIN_EMAIL)
        .await
        .expect("Failed to list books");
    assert!(books.iter().any(|book| book.id == book_id));
}

#[tokio::test]
/// Simple test for the borrow/return flow
/// Opens the loan window (fridayOnly off)
/// Registers a book
/// Borrows it, sees it in the active list
/// Second borrow by another user conflicts
/// Returns it; a second return reports nothing to return
/// Leaves a review and reads it back, overwritten by a second one
async fn circulation_loans_e2e_test() {
    let catalog_client =
        CirculationCatalogClient::new(&catalog_url()).expect("Failed to create client");
    let loans_client = CirculationLoansClient::new(&loans_url()).expect("Failed to create client");

    let accepted = loans_client
        .put_policy(
            ADMIN_EMAIL,
            &PolicyUpdateRequest {
                friday_only: false,
                loan_period_days: 2,
                exception_rules: Some(vec![]),
                exception_start_date: None,
                exception_end_date: None,
                exception_loan_period_days: None,
            },
        )
        .await
        .expect("Failed to update policy");
    assert!(accepted);

    let policy = loans_client
        .get_policy(ADMIN_EMAIL)
        .await
        .expect("Failed to get policy");
    assert!(!policy.friday_only);

    let book_id = register_book(&catalog_client, &random_isbn13(), "loanable").await;
    let borrower = random_email("borrower");
    let rival = random_email("rival");

    // BORROW
    let outcome = loans_client
        .borrow_book(&borrower, book_id)
        .await
        .expect("Failed to borrow");
    assert_eq!(outcome, BorrowOutcome::Created);

    // BORROW AGAIN - conflicts for any caller
    let outcome = loans_client
        .borrow_book(&rival, book_id)
        .await
        .expect("Failed to borrow");
    assert_eq!(outcome, BorrowOutcome::AlreadyLoaned);

    let loans = loans_client
        .my_loans(&borrower)
        .await
        .expect("Failed to list loans");
    assert!(loans.iter().any(|loan| loan.book_id == book_id));
    let loan = loans
        .iter()
        .find(|loan| loan.book_id == book_id)
        .expect("loan listed");
    assert_eq!(
        (loan.due_at - loan.loaned_at).num_milliseconds(),
        2 * 24 * 60 * 60 * 1000
    );

    // RETURN by someone else finds nothing
    let returned = loans_client
        .return_book(&rival, book_id)
        .await
        .expect("Failed to return");
    assert!(!returned);

    // RETURN
    let returned = loans_client
        .return_book(&borrower, book_id)
        .await
        .expect("Failed to return");
    assert!(returned);

    // RETURN AGAIN - nothing left to return
    let returned = loans_client
        .return_book(&borrower, book_id)
        .await
        .expect("Failed to return");
    assert!(!returned);

    // REVIEW, then overwrite it
    loans_client
        .post_review(&borrower, book_id, 4, None)
        .await
        .expect("Failed to post review");
    let saved = loans_client
        .post_review(&borrower, book_id, 2, Some("x"))
        .await
        .expect("Failed to post review");
    assert_eq!(saved.data.rating, 2);

    let reviews = loans_client
        .get_reviews(&borrower, book_id)
        .await
        .expect("Failed to get reviews");
    let own = reviews.user_review.expect("own review present");
    assert_eq!(own.rating, 2);
    assert_eq!(own.comment.as_deref(), Some("x"));
    assert_eq!(reviews.comments.len(), 1);
}

#[tokio::test]
/// Fires concurrent borrows of one book and expects exactly one winner.
async fn concurrent_borrow_e2e_test() {
    let catalog_client =
        CirculationCatalogClient::new(&catalog_url()).expect("Failed to create client");
    let loans_client = CirculationLoansClient::new(&loans_url()).expect("Failed to create client");

    let accepted = loans_client
        .put_policy(
            ADMIN_EMAIL,
            &PolicyUpdateRequest {
                friday_only: false,
                loan_period_days: 2,
                exception_rules: Some(vec![]),
                exception_start_date: None,
                exception_end_date: None,
                exception_loan_period_days: None,
            },
        )
        .await
        .expect("Failed to update policy");
    assert!(accepted);

    let book_id = register_book(&catalog_client, &random_isbn13(), "contested").await;

    let mut attempts = Vec::new();
    for i in 0..8 {
        let loans_client =
            CirculationLoansClient::new(&loans_url()).expect("Failed to create client");
        attempts.push(tokio::spawn(async move {
            loans_client
                .borrow_book(&format!("racer{i}@example.com"), book_id)
                .await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for attempt in attempts {
        match attempt
            .await
            .expect("borrow task panicked")
            .expect("borrow request failed")
        {
            BorrowOutcome::Created => created += 1,
            BorrowOutcome::AlreadyLoaned => conflicts += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test]
/// Subscribe, trigger a sweep, unsubscribe. The sweep summary shape is
/// asserted; whether anything is actually due depends on ledger state.
async fn circulation_notifications_e2e_test() {
    let notifications_client = CirculationNotificationsClient::new(&notifications_url())
        .expect("Failed to create client");

    let user_email = random_email("subscriber");
    let endpoint = format!("https://push.example.com/{}", rand::random::<u64>());

    notifications_client
        .subscribe(
            &user_email,
            &SubscribeRequest {
                endpoint: endpoint.clone(),
                keys: SubscriptionKeys {
                    p256dh: "p256dh-key".to_string(),
                    auth: "auth-secret".to_string(),
                },
            },
        )
        .await
        .expect("Failed to subscribe");

    let sweep = notifications_client
        .trigger_sweep(std::env::var("CRON_SECRET").ok().as_deref())
        .await
        .expect("Failed to trigger sweep");
    assert!(sweep.ok);
    assert!(sweep.sent + sweep.failed <= sweep.subscriptions);

    notifications_client
        .unsubscribe(&user_email, &UnsubscribeRequest { endpoint })
        .await
        .expect("Failed to unsubscribe");
}
