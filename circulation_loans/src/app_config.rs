use paperclip::actix::web;

use crate::handlers;

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(
            web::scope("/api")
                .service(
                    web::resource("/policy")
                        .route(web::get().to(handlers::get_policy))
                        .route(web::put().to(handlers::put_policy)),
                )
                .service(
                    web::scope("/loans")
                        .service(
                            web::resource("")
                                .route(web::post().to(handlers::borrow_book))
                                .route(web::get().to(handlers::my_loans)),
                        )
                        .service(
                            web::resource("/return").route(web::post().to(handlers::return_book)),
                        )
                        .service(
                            web::resource("/active")
                                .route(web::get().to(handlers::everyone_borrowed)),
                        )
                        .service(
                            web::resource("/status").route(web::get().to(handlers::book_status)),
                        )
                        .service(web::resource("/due").route(web::get().to(handlers::due_counts))),
                )
                .service(
                    web::resource("/reviews")
                        .route(web::post().to(handlers::post_review))
                        .route(web::get().to(handlers::get_reviews)),
                ),
        );
}
