use paperclip::actix::web;

use crate::handlers;

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/push")
                        .service(
                            web::resource("/subscribe").route(web::post().to(handlers::subscribe)),
                        )
                        .service(
                            web::resource("/unsubscribe")
                                .route(web::post().to(handlers::unsubscribe)),
                        ),
                )
                .service(
                    web::resource("/notify/sweep").route(web::get().to(handlers::run_sweep)),
                ),
        );
}
