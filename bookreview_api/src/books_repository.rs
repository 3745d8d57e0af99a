pub use in_memory_books_repository::InMemoryBooksRepository;
pub use postgres_books_repository::{PostgresBooksRepository, PostgresBooksRepositoryConfig};

use crate::api::{Book, BookId, NewBook, NewReview, Review, ReviewId, ReviewPatch, UserId};

mod in_memory_books_repository;
mod postgres_books_repository;

#[derive(Debug, thiserror::Error)]
pub enum BooksRepositoryError {
    #[error("Book {0} not found")]
    BookNotFound(BookId),

    #[error("Review {0} not found")]
    ReviewNotFound(ReviewId),

    #[error("User {user_id} already reviewed book {book_id}")]
    DuplicateReview { book_id: BookId, user_id: UserId },

    #[error("Review {0} belongs to a different user")]
    NotOwner(ReviewId),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Database operation timed out")]
    Timeout,

    #[error("Other error {0}")]
    Other(String),
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BookFilter {
    pub author: Option<String>,
    pub genre: Option<String>,
}

/// Book catalog plus the review ledger built on top of it. Reviews are
/// first-class records keyed by a globally unique id with a reference to
/// their parent book, so update/delete address a review directly.
#[async_trait::async_trait]
pub trait BooksRepository: Send + Sync {
    /// Adds a book to the catalog, returns the stored record with its id.
    async fn add_book(&self, details: NewBook) -> Result<Book, BooksRepositoryError>;

    /// Retrieves one book by id.
    async fn get_book(&self, book_id: BookId) -> Result<Book, BooksRepositoryError>;

    /// One page of the catalog in insertion order together with the total
    /// count under the same filter. Filters are case-insensitive substring
    /// matches on author and genre.
    async fn list_books(
        &self,
        filter: BookFilter,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Book>, i64), BooksRepositoryError>;

    /// Case-insensitive substring match against title or author, capped at
    /// `cap` results.
    async fn search_books(&self, query: &str, cap: i64) -> Result<Vec<Book>, BooksRepositoryError>;

    /// Appends a review, enforcing at most one review per (book, user).
    async fn add_review(
        &self,
        book_id: BookId,
        user_id: UserId,
        review: NewReview,
    ) -> Result<Review, BooksRepositoryError>;

    /// Updates the caller's review; fields left out of the patch keep their
    /// previous value. ReviewNotFound when the id exists nowhere, NotOwner
    /// when it belongs to someone else.
    async fn update_review(
        &self,
        review_id: ReviewId,
        user_id: UserId,
        patch: ReviewPatch,
    ) -> Result<Review, BooksRepositoryError>;

    /// Removes the caller's review under the same NotFound/NotOwner rules.
    async fn delete_review(
        &self,
        review_id: ReviewId,
        user_id: UserId,
    ) -> Result<(), BooksRepositoryError>;

    /// The full review sequence of a book in insertion order; pagination and
    /// rating aggregation happen over this sequence in the handler.
    async fn get_reviews(&self, book_id: BookId) -> Result<Vec<Review>, BooksRepositoryError>;
}
