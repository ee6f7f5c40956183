use paperclip::actix::web;

use crate::handlers;

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(
            web::scope("/api")
                .service(web::resource("/books").route(web::get().to(handlers::get_all_books)))
                .service(
                    web::resource("/book/{book_id}").route(web::get().to(handlers::get_book)),
                )
                .service(
                    web::resource("/catalog/{isbn13}")
                        .route(web::get().to(handlers::lookup_by_isbn)),
                )
                .service(
                    web::scope("/admin")
                        .service(
                            web::resource("/pending-books")
                                .route(web::get().to(handlers::get_pending_books))
                                .route(web::post().to(handlers::stage_book)),
                        )
                        .service(
                            web::resource("/book-registration")
                                .route(web::post().to(handlers::commit_registration)),
                        ),
                ),
        );
}
