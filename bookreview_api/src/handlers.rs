use std::sync::Arc;

use actix_web::web::{block, Data};
use actix_web::{Error, HttpResponse};
use paperclip::actix::{
    api_v2_operation,
    web::{self},
};

use crate::api::{
    BookDetailsResponse, BookId, BookListQuery, BookListResponse, BookResponse, LoginRequest,
    MessageResponse, NewBook, NewReview, ReviewId, ReviewPageQuery, ReviewPatch, ReviewResponse,
    SearchQuery, SearchResponse, SignupRequest, TokenResponse,
};
use crate::bearer_auth::AuthenticatedUser;
use crate::books_repository::{BookFilter, BooksRepository, BooksRepositoryError};
use crate::credentials::{self, HashingCost};
use crate::paging;
use crate::session_tokens::TokenService;
use crate::users_repository::{NewUser, UsersRepository, UsersRepositoryError};

fn message_response(message: &str) -> MessageResponse {
    MessageResponse {
        message: message.to_string(),
    }
}

fn server_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(message_response("Server error"))
}

#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().finish())
}

#[api_v2_operation]
pub async fn signup(
    users_repository: Data<Arc<dyn UsersRepository>>,
    hashing_cost: Data<HashingCost>,
    body: web::Json<SignupRequest>,
) -> Result<HttpResponse, Error> {
    let SignupRequest {
        username,
        email,
        password,
    } = body.into_inner();
    let username = username.trim().to_string();
    let email = email.trim().to_string();

    if username.is_empty() || email.is_empty() || password.is_empty() {
        return Ok(HttpResponse::BadRequest()
            .json(message_response("Username, email, and password are required.")));
    }

    // One-query pre-check; the store's unique constraints remain the
    // actual guarantee against concurrent signups.
    match users_repository.identity_taken(&username, &email).await {
        Ok(true) => {
            return Ok(HttpResponse::BadRequest()
                .json(message_response("Username or email already exists")))
        }
        Ok(false) => {}
        Err(err) => {
            tracing::error!("Signup identity check failed {}", err);
            return Ok(server_error());
        }
    }

    // bcrypt is deliberately slow, keep it off the request-serving threads
    let cost = hashing_cost.0;
    let password_hash = match block(move || credentials::hash_password(&password, cost)).await {
        Ok(Ok(password_hash)) => password_hash,
        Ok(Err(err)) => {
            tracing::error!("Password hashing failed {}", err);
            return Ok(server_error());
        }
        Err(err) => {
            tracing::error!("Password hashing was cancelled {}", err);
            return Ok(server_error());
        }
    };

    Ok(
        match users_repository
            .add_user(NewUser {
                username,
                email,
                password_hash,
            })
            .await
        {
            Ok(_) => HttpResponse::Created()
                .json(message_response("User registered successfully")),
            Err(UsersRepositoryError::DuplicateIdentity) => HttpResponse::BadRequest()
                .json(message_response("Username or email already exists")),
            Err(err) => {
                tracing::error!("Signup failed {}", err);
                server_error()
            }
        },
    )
}

#[api_v2_operation]
pub async fn login(
    users_repository: Data<Arc<dyn UsersRepository>>,
    token_service: Data<TokenService>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, Error> {
    let LoginRequest { username, password } = body.into_inner();

    // Unknown username and wrong password produce the identical response
    // so usernames cannot be enumerated.
    let invalid_credentials =
        || HttpResponse::BadRequest().json(message_response("Invalid credentials"));

    let user = match users_repository.find_by_username(&username).await {
        Ok(Some(user)) => user,
        Ok(None) => return Ok(invalid_credentials()),
        Err(err) => {
            tracing::error!("Login lookup failed {}", err);
            return Ok(server_error());
        }
    };

    let password_hash = user.password_hash.clone();
    let verified = match block(move || credentials::verify_password(&password, &password_hash)).await
    {
        Ok(Ok(verified)) => verified,
        Ok(Err(err)) => {
            tracing::error!("Password verification failed {}", err);
            return Ok(server_error());
        }
        Err(err) => {
            tracing::error!("Password verification was cancelled {}", err);
            return Ok(server_error());
        }
    };

    if !verified {
        return Ok(invalid_credentials());
    }

    Ok(match token_service.issue(user.id, &user.username) {
        Ok(token) => HttpResponse::Ok().json(TokenResponse { token }),
        Err(err) => {
            tracing::error!("Token issuance failed {}", err);
            server_error()
        }
    })
}

#[api_v2_operation]
pub async fn add_book(
    books_repository: Data<Arc<dyn BooksRepository>>,
    _user: AuthenticatedUser,
    body: web::Json<NewBook>,
) -> Result<HttpResponse, Error> {
    let details = NewBook {
        title: body.title.trim().to_string(),
        author: body.author.trim().to_string(),
        genre: body.genre.trim().to_string(),
    };

    if details.title.is_empty() || details.author.is_empty() || details.genre.is_empty() {
        return Ok(HttpResponse::BadRequest()
            .json(message_response("Title, author, and genre are required.")));
    }

    Ok(match books_repository.add_book(details).await {
        Ok(book) => HttpResponse::Created().json(BookResponse {
            message: "Book added".to_string(),
            book,
        }),
        Err(err) => {
            tracing::error!("Add book failed {}", err);
            server_error()
        }
    })
}

#[api_v2_operation]
pub async fn get_books(
    books_repository: Data<Arc<dyn BooksRepository>>,
    query: web::Query<BookListQuery>,
) -> Result<HttpResponse, Error> {
    let query = query.into_inner();
    let page = paging::clamp_page(query.page);
    let limit = paging::clamp_limit(query.limit, paging::DEFAULT_BOOKS_PAGE_SIZE);
    let filter = BookFilter {
        author: query.author,
        genre: query.genre,
    };

    Ok(
        match books_repository
            .list_books(filter, paging::skip(page, limit), limit)
            .await
        {
            Ok((books, total_books)) => HttpResponse::Ok().json(BookListResponse {
                page,
                total_pages: paging::total_pages(total_books, limit),
                total_books,
                books,
            }),
            Err(err) => {
                tracing::error!("List books failed {}", err);
                server_error()
            }
        },
    )
}

#[api_v2_operation]
pub async fn get_book(
    books_repository: Data<Arc<dyn BooksRepository>>,
    book_id: web::Path<BookId>,
    query: web::Query<ReviewPageQuery>,
) -> Result<HttpResponse, Error> {
    let book_id = book_id.into_inner();
    let page = paging::clamp_page(query.page);
    let limit = paging::clamp_limit(query.limit, paging::DEFAULT_REVIEWS_PAGE_SIZE);

    let book = match books_repository.get_book(book_id).await {
        Ok(book) => book,
        Err(BooksRepositoryError::BookNotFound(_)) => {
            return Ok(HttpResponse::NotFound().json(message_response("Book not found")))
        }
        Err(err) => {
            tracing::error!("Get book failed {}", err);
            return Ok(server_error());
        }
    };

    // The average covers every review; pagination slices the full
    // insertion-ordered sequence.
    Ok(match books_repository.get_reviews(book_id).await {
        Ok(reviews) => {
            let ratings: Vec<i32> = reviews.iter().map(|review| review.rating).collect();
            let total_reviews = reviews.len() as i64;

            HttpResponse::Ok().json(BookDetailsResponse {
                book,
                average_rating: paging::average_rating(&ratings),
                reviews: paging::slice_page(&reviews, page, limit),
                page,
                total_pages: paging::total_pages(total_reviews, limit),
                total_reviews,
            })
        }
        Err(err) => {
            tracing::error!("Get reviews failed {}", err);
            server_error()
        }
    })
}

#[api_v2_operation]
pub async fn add_review(
    books_repository: Data<Arc<dyn BooksRepository>>,
    user: AuthenticatedUser,
    book_id: web::Path<BookId>,
    body: web::Json<NewReview>,
) -> Result<HttpResponse, Error> {
    let review = body.into_inner();
    if !(1..=5).contains(&review.rating) {
        return Ok(HttpResponse::BadRequest()
            .json(message_response("Rating must be between 1 and 5")));
    }

    Ok(
        match books_repository
            .add_review(book_id.into_inner(), user.user_id, review)
            .await
        {
            Ok(review) => HttpResponse::Created().json(ReviewResponse {
                message: "Review added".to_string(),
                review,
            }),
            Err(BooksRepositoryError::BookNotFound(_)) => {
                HttpResponse::NotFound().json(message_response("Book not found"))
            }
            Err(BooksRepositoryError::DuplicateReview { .. }) => HttpResponse::BadRequest()
                .json(message_response("You have already reviewed this book")),
            Err(err) => {
                tracing::error!("Add review failed {}", err);
                server_error()
            }
        },
    )
}

#[api_v2_operation]
pub async fn update_review(
    books_repository: Data<Arc<dyn BooksRepository>>,
    user: AuthenticatedUser,
    review_id: web::Path<ReviewId>,
    body: web::Json<ReviewPatch>,
) -> Result<HttpResponse, Error> {
    let patch = body.into_inner();
    if let Some(rating) = patch.rating {
        if !(1..=5).contains(&rating) {
            return Ok(HttpResponse::BadRequest()
                .json(message_response("Rating must be between 1 and 5")));
        }
    }

    Ok(
        match books_repository
            .update_review(review_id.into_inner(), user.user_id, patch)
            .await
        {
            Ok(review) => HttpResponse::Ok().json(ReviewResponse {
                message: "Review updated".to_string(),
                review,
            }),
            Err(BooksRepositoryError::ReviewNotFound(_)) => {
                HttpResponse::NotFound().json(message_response("Review not found"))
            }
            Err(BooksRepositoryError::NotOwner(_)) => HttpResponse::Forbidden()
                .json(message_response("Not authorized to update this review")),
            Err(err) => {
                tracing::error!("Update review failed {}", err);
                server_error()
            }
        },
    )
}

#[api_v2_operation]
pub async fn delete_review(
    books_repository: Data<Arc<dyn BooksRepository>>,
    user: AuthenticatedUser,
    review_id: web::Path<ReviewId>,
) -> Result<HttpResponse, Error> {
    Ok(
        match books_repository
            .delete_review(review_id.into_inner(), user.user_id)
            .await
        {
            Ok(()) => HttpResponse::Ok().json(message_response("Review deleted")),
            Err(BooksRepositoryError::ReviewNotFound(_)) => {
                HttpResponse::NotFound().json(message_response("Review not found"))
            }
            Err(BooksRepositoryError::NotOwner(_)) => HttpResponse::Forbidden()
                .json(message_response("Not authorized to delete this review")),
            Err(err) => {
                tracing::error!("Delete review failed {}", err);
                server_error()
            }
        },
    )
}

#[api_v2_operation]
pub async fn search_books(
    books_repository: Data<Arc<dyn BooksRepository>>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, Error> {
    let q = query
        .into_inner()
        .q
        .map(|q| q.trim().to_string())
        .unwrap_or_default();
    if q.is_empty() {
        return Ok(
            HttpResponse::BadRequest().json(message_response("Search query is required"))
        );
    }

    Ok(
        match books_repository
            .search_books(&q, paging::SEARCH_RESULTS_CAP)
            .await
        {
            Ok(results) => HttpResponse::Ok().json(SearchResponse { results }),
            Err(err) => {
                tracing::error!("Search books failed {}", err);
                server_error()
            }
        },
    )
}
