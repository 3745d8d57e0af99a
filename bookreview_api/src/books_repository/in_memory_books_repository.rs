use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::UNIX_EPOCH;

use crate::api::{Book, BookId, NewBook, NewReview, Review, ReviewId, ReviewPatch, UserId};
use crate::books_repository::{BookFilter, BooksRepository, BooksRepositoryError};

struct StoredReview {
    book_id: BookId,
    review: Review,
}

pub struct InMemoryBooksRepository {
    book_sequence_generator: AtomicI32,
    review_sequence_generator: AtomicI32,
    books: parking_lot::RwLock<HashMap<BookId, Book>>,
    // Insertion-ordered; review ids are assigned monotonically.
    reviews: parking_lot::RwLock<Vec<StoredReview>>,
}

impl Default for InMemoryBooksRepository {
    fn default() -> Self {
        Self {
            book_sequence_generator: AtomicI32::new(1),
            review_sequence_generator: AtomicI32::new(1),
            books: Default::default(),
            reviews: Default::default(),
        }
    }
}

fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl InMemoryBooksRepository {
    fn books_sorted_by_id(&self) -> Vec<Book> {
        let mut books: Vec<Book> = self.books.read().values().cloned().collect();
        books.sort_by_key(|book| book.id);
        books
    }
}

#[async_trait::async_trait]
impl BooksRepository for InMemoryBooksRepository {
    async fn add_book(&self, details: NewBook) -> Result<Book, BooksRepositoryError> {
        let id = self.book_sequence_generator.fetch_add(1, Ordering::Relaxed);
        let book = Book {
            id,
            title: details.title,
            author: details.author,
            genre: details.genre,
            created_at: unix_timestamp(),
        };
        self.books.write().insert(id, book.clone());
        Ok(book)
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book, BooksRepositoryError> {
        self.books
            .read()
            .get(&book_id)
            .cloned()
            .ok_or(BooksRepositoryError::BookNotFound(book_id))
    }

    async fn list_books(
        &self,
        filter: BookFilter,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Book>, i64), BooksRepositoryError> {
        let filtered: Vec<Book> = self
            .books_sorted_by_id()
            .into_iter()
            .filter(|book| {
                filter
                    .author
                    .as_deref()
                    .map(|author| contains_ignore_case(&book.author, author))
                    .unwrap_or(true)
                    && filter
                        .genre
                        .as_deref()
                        .map(|genre| contains_ignore_case(&book.genre, genre))
                        .unwrap_or(true)
            })
            .collect();

        let total = filtered.len() as i64;
        let page = filtered
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn search_books(&self, query: &str, cap: i64) -> Result<Vec<Book>, BooksRepositoryError> {
        Ok(self
            .books_sorted_by_id()
            .into_iter()
            .filter(|book| {
                contains_ignore_case(&book.title, query)
                    || contains_ignore_case(&book.author, query)
            })
            .take(cap.max(0) as usize)
            .collect())
    }

    async fn add_review(
        &self,
        book_id: BookId,
        user_id: UserId,
        review: NewReview,
    ) -> Result<Review, BooksRepositoryError> {
        if !self.books.read().contains_key(&book_id) {
            return Err(BooksRepositoryError::BookNotFound(book_id));
        }

        // Duplicate check and insert happen under one write lock.
        let mut locked_reviews = self.reviews.write();
        if locked_reviews
            .iter()
            .any(|stored| stored.book_id == book_id && stored.review.user_id == user_id)
        {
            return Err(BooksRepositoryError::DuplicateReview { book_id, user_id });
        }

        let id = self
            .review_sequence_generator
            .fetch_add(1, Ordering::Relaxed);
        let review = Review {
            id,
            user_id,
            rating: review.rating,
            comment: review.comment,
            created_at: unix_timestamp(),
        };
        locked_reviews.push(StoredReview {
            book_id,
            review: review.clone(),
        });
        Ok(review)
    }

    async fn update_review(
        &self,
        review_id: ReviewId,
        user_id: UserId,
        patch: ReviewPatch,
    ) -> Result<Review, BooksRepositoryError> {
        let mut locked_reviews = self.reviews.write();
        let stored = locked_reviews
            .iter_mut()
            .find(|stored| stored.review.id == review_id)
            .ok_or(BooksRepositoryError::ReviewNotFound(review_id))?;

        if stored.review.user_id != user_id {
            return Err(BooksRepositoryError::NotOwner(review_id));
        }

        if let Some(rating) = patch.rating {
            stored.review.rating = rating;
        }
        if let Some(comment) = patch.comment {
            stored.review.comment = Some(comment);
        }
        Ok(stored.review.clone())
    }

    async fn delete_review(
        &self,
        review_id: ReviewId,
        user_id: UserId,
    ) -> Result<(), BooksRepositoryError> {
        let mut locked_reviews = self.reviews.write();
        let position = locked_reviews
            .iter()
            .position(|stored| stored.review.id == review_id)
            .ok_or(BooksRepositoryError::ReviewNotFound(review_id))?;

        if locked_reviews[position].review.user_id != user_id {
            return Err(BooksRepositoryError::NotOwner(review_id));
        }

        locked_reviews.remove(position);
        Ok(())
    }

    async fn get_reviews(&self, book_id: BookId) -> Result<Vec<Review>, BooksRepositoryError> {
        Ok(self
            .reviews
            .read()
            .iter()
            .filter(|stored| stored.book_id == book_id)
            .map(|stored| stored.review.clone())
            .collect())
    }
}

#[cfg(test)]
mod in_memory_books_repository_tests {
    use super::*;

    fn dune() -> NewBook {
        NewBook {
            title: "Dune".to_string(),
            author: "Herbert".to_string(),
            genre: "SciFi".to_string(),
        }
    }

    #[tokio::test]
    /// Catalog coverage in one case:
    /// 1. Gets a missing book to see NotFound
    /// 2. Adds books and gets one back
    /// 3. Lists with pagination and case-insensitive filters
    /// 4. Searches by title and author substrings
    async fn test_catalog_add_list_and_search() {
        let repo = InMemoryBooksRepository::default();

        let missing = repo.get_book(20000).await;
        assert!(matches!(missing, Err(BooksRepositoryError::BookNotFound(..))));

        let dune_book = repo.add_book(dune()).await.unwrap();
        let other = repo
            .add_book(NewBook {
                title: "Emma".to_string(),
                author: "Austen".to_string(),
                genre: "Classic".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(repo.get_book(dune_book.id).await.unwrap(), dune_book);

        let (all_books, total) = repo.list_books(BookFilter::default(), 0, 10).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(all_books, vec![dune_book.clone(), other.clone()]);

        // Second page of size 1 in insertion order
        let (second_page, total) = repo.list_books(BookFilter::default(), 1, 1).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(second_page, vec![other.clone()]);

        // Case-insensitive substring filter on author
        let (filtered, total) = repo
            .list_books(
                BookFilter {
                    author: Some("herb".to_string()),
                    genre: None,
                },
                0,
                10,
            )
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(filtered, vec![dune_book.clone()]);

        // Filter that matches nothing
        let (empty, total) = repo
            .list_books(
                BookFilter {
                    author: Some("herb".to_string()),
                    genre: Some("classic".to_string()),
                },
                0,
                10,
            )
            .await
            .unwrap();
        assert_eq!(total, 0);
        assert!(empty.is_empty());

        assert_eq!(
            repo.search_books("dun", 20).await.unwrap(),
            vec![dune_book.clone()]
        );
        assert_eq!(
            repo.search_books("AUSTEN", 20).await.unwrap(),
            vec![other.clone()]
        );
        assert_eq!(repo.search_books("nothing", 20).await.unwrap(), vec![]);
        // Cap applies after matching
        assert_eq!(repo.search_books("e", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    /// Review ledger coverage in one case:
    /// 1. Rejects a review for a missing book
    /// 2. Adds a review, rejects the same user's second review
    /// 3. Keeps the first review intact after the rejected duplicate
    /// 4. Allows a different user to review the same book
    async fn test_review_uniqueness_per_user_and_book() {
        let repo = InMemoryBooksRepository::default();

        let no_book = repo
            .add_review(
                999,
                1,
                NewReview {
                    rating: 5,
                    comment: None,
                },
            )
            .await;
        assert!(matches!(no_book, Err(BooksRepositoryError::BookNotFound(..))));

        let book = repo.add_book(dune()).await.unwrap();

        let first = repo
            .add_review(
                book.id,
                1,
                NewReview {
                    rating: 5,
                    comment: Some("great".to_string()),
                },
            )
            .await
            .unwrap();

        let duplicate = repo
            .add_review(
                book.id,
                1,
                NewReview {
                    rating: 3,
                    comment: Some("meh".to_string()),
                },
            )
            .await;
        assert!(matches!(
            duplicate,
            Err(BooksRepositoryError::DuplicateReview { .. })
        ));

        // The rejected duplicate left the original review untouched
        let reviews = repo.get_reviews(book.id).await.unwrap();
        assert_eq!(reviews, vec![first.clone()]);
        assert_eq!(reviews[0].rating, 5);

        let second_user = repo
            .add_review(
                book.id,
                2,
                NewReview {
                    rating: 3,
                    comment: None,
                },
            )
            .await
            .unwrap();

        let reviews = repo.get_reviews(book.id).await.unwrap();
        assert_eq!(reviews, vec![first, second_user]);
    }

    #[tokio::test]
    /// Update/delete ownership rules in one case:
    /// 1. Updates a missing review to see ReviewNotFound
    /// 2. A non-owner update fails and changes nothing
    /// 3. The owner patches the rating only, the comment survives
    /// 4. A non-owner delete fails, the owner's delete removes the review
    async fn test_update_and_delete_enforce_ownership() {
        let repo = InMemoryBooksRepository::default();
        let book = repo.add_book(dune()).await.unwrap();

        let missing = repo.update_review(999, 1, ReviewPatch::default()).await;
        assert!(matches!(
            missing,
            Err(BooksRepositoryError::ReviewNotFound(..))
        ));

        let review = repo
            .add_review(
                book.id,
                1,
                NewReview {
                    rating: 5,
                    comment: Some("great".to_string()),
                },
            )
            .await
            .unwrap();

        let foreign_update = repo
            .update_review(
                review.id,
                2,
                ReviewPatch {
                    rating: Some(4),
                    comment: None,
                },
            )
            .await;
        assert!(matches!(
            foreign_update,
            Err(BooksRepositoryError::NotOwner(..))
        ));
        assert_eq!(repo.get_reviews(book.id).await.unwrap(), vec![review.clone()]);

        let updated = repo
            .update_review(
                review.id,
                1,
                ReviewPatch {
                    rating: Some(4),
                    comment: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.rating, 4);
        assert_eq!(updated.comment, Some("great".to_string()));

        let foreign_delete = repo.delete_review(review.id, 2).await;
        assert!(matches!(
            foreign_delete,
            Err(BooksRepositoryError::NotOwner(..))
        ));

        repo.delete_review(review.id, 1).await.unwrap();
        assert_eq!(repo.get_reviews(book.id).await.unwrap(), vec![]);

        let delete_again = repo.delete_review(review.id, 1).await;
        assert!(matches!(
            delete_again,
            Err(BooksRepositoryError::ReviewNotFound(..))
        ));
    }

    #[tokio::test]
    /// Reviews come back in insertion order regardless of rating.
    async fn test_reviews_keep_insertion_order() {
        let repo = InMemoryBooksRepository::default();
        let book = repo.add_book(dune()).await.unwrap();

        for (user_id, rating) in [(1, 3), (2, 5), (3, 1), (4, 4)] {
            repo.add_review(
                book.id,
                user_id,
                NewReview {
                    rating,
                    comment: None,
                },
            )
            .await
            .unwrap();
        }

        let ratings: Vec<i32> = repo
            .get_reviews(book.id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.rating)
            .collect();
        assert_eq!(ratings, vec![3, 5, 1, 4]);
    }
}
