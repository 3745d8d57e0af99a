use paperclip::actix::web;

use crate::handlers;

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        .service(
                            web::resource("/signup").route(web::post().to(handlers::signup)),
                        )
                        .service(web::resource("/login").route(web::post().to(handlers::login))),
                )
                .service(
                    web::resource("/books")
                        .route(web::post().to(handlers::add_book))
                        .route(web::get().to(handlers::get_books)),
                )
                .service(
                    web::resource("/books/{book_id}").route(web::get().to(handlers::get_book)),
                )
                .service(
                    web::resource("/books/{book_id}/reviews")
                        .route(web::post().to(handlers::add_review)),
                )
                .service(
                    web::resource("/reviews/{review_id}")
                        .route(web::put().to(handlers::update_review))
                        .route(web::delete().to(handlers::delete_review)),
                )
                .service(web::resource("/search").route(web::get().to(handlers::search_books))),
        );
}
