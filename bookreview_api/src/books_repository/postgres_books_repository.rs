use std::time::{Duration, UNIX_EPOCH};

use anyhow::Context;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Statement};

use crate::api::{Book, BookId, NewBook, NewReview, Review, ReviewId, ReviewPatch, UserId};
use crate::books_repository::{BookFilter, BooksRepository, BooksRepositoryError};

/// Upper bound on a single store operation; a hung database surfaces as a
/// Timeout error instead of a hanging request.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

pub struct PostgresBooksRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

pub struct PostgresBooksRepository {
    client: Client,
}

impl PostgresBooksRepository {
    pub async fn init(config: PostgresBooksRepositoryConfig) -> anyhow::Result<Self> {
        let connection_str = format!(
            "postgresql://{}:{}@{}",
            config.username, config.password, config.hostname
        );
        tracing::info!("Postgres connection_str: {}", connection_str);
        let (client, connection) = tokio_postgres::connect(&connection_str, NoTls)
            .await
            .context("Failed to start postgres")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("connection error: {}", e);
            }
        });

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS books (
            id              SERIAL PRIMARY KEY,
            title           TEXT NOT NULL,
            author          TEXT NOT NULL,
            genre           TEXT NOT NULL,
            created_at      BIGINT NOT NULL
            )
        ",
            )
            .await
            .context("Failed to setup books table")?;

        // The composite unique index is the real one-review-per-user
        // guarantee; application-level checks are only an optimization.
        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS reviews (
            id              SERIAL PRIMARY KEY,
            book_id         INTEGER NOT NULL REFERENCES books (id),
            user_id         INTEGER NOT NULL,
            rating          INTEGER NOT NULL,
            comment         TEXT,
            created_at      BIGINT NOT NULL,
            UNIQUE (book_id, user_id)
            )
        ",
            )
            .await
            .context("Failed to setup reviews table")?;

        Ok(Self { client })
    }
}

fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn like_pattern(filter: Option<&str>) -> String {
    match filter {
        Some(filter) => format!("%{}%", escape_like(filter)),
        None => "%".to_string(),
    }
}

// `%` and `_` are wildcards inside an ILIKE pattern; escape them so user
// input matches literally, like the in-memory substring check.
fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn book_from_row(row: &tokio_postgres::Row) -> Result<Book, BooksRepositoryError> {
    Ok(Book {
        id: row.try_get(0)?,
        title: row.try_get(1)?,
        author: row.try_get(2)?,
        genre: row.try_get(3)?,
        created_at: row.try_get(4)?,
    })
}

fn review_from_row(row: &tokio_postgres::Row) -> Result<Review, BooksRepositoryError> {
    Ok(Review {
        id: row.try_get(0)?,
        user_id: row.try_get(1)?,
        rating: row.try_get(2)?,
        comment: row.try_get(3)?,
        created_at: row.try_get(4)?,
    })
}

fn has_sql_state(err: &tokio_postgres::Error, code: &str) -> bool {
    err.as_db_error()
        .map(|db_err| db_err.code() == &SqlState::from_code(code))
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl BooksRepository for PostgresBooksRepository {
    async fn add_book(&self, details: NewBook) -> Result<Book, BooksRepositoryError> {
        tokio::time::timeout(OPERATION_TIMEOUT, async {
            let stmt: Statement = self
                .client
                .prepare(
                    "INSERT INTO books (title, author, genre, created_at) \
                     VALUES ($1, $2, $3, $4) RETURNING id",
                )
                .await?;

            let created_at = unix_timestamp();
            let rows = self
                .client
                .query(
                    &stmt,
                    &[&details.title, &details.author, &details.genre, &created_at],
                )
                .await?;

            let id: BookId = rows
                .first()
                .ok_or_else(|| BooksRepositoryError::Other("Id not returned".to_string()))?
                .try_get(0)?;

            Ok(Book {
                id,
                title: details.title,
                author: details.author,
                genre: details.genre,
                created_at,
            })
        })
        .await
        .map_err(|_| BooksRepositoryError::Timeout)?
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book, BooksRepositoryError> {
        tokio::time::timeout(OPERATION_TIMEOUT, async {
            let stmt: Statement = self
                .client
                .prepare(
                    "SELECT id, title, author, genre, created_at FROM books WHERE id = ($1)",
                )
                .await?;

            let rows = self.client.query(&stmt, &[&book_id]).await?;

            rows.first()
                .ok_or(BooksRepositoryError::BookNotFound(book_id))
                .and_then(book_from_row)
        })
        .await
        .map_err(|_| BooksRepositoryError::Timeout)?
    }

    async fn list_books(
        &self,
        filter: BookFilter,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Book>, i64), BooksRepositoryError> {
        tokio::time::timeout(OPERATION_TIMEOUT, async {
            let author_pattern = like_pattern(filter.author.as_deref());
            let genre_pattern = like_pattern(filter.genre.as_deref());

            let stmt: Statement = self
                .client
                .prepare(
                    "SELECT id, title, author, genre, created_at FROM books \
                     WHERE author ILIKE $1 AND genre ILIKE $2 \
                     ORDER BY id OFFSET $3 LIMIT $4",
                )
                .await?;

            let rows = self
                .client
                .query(&stmt, &[&author_pattern, &genre_pattern, &skip, &limit])
                .await?;

            let books = rows
                .iter()
                .map(book_from_row)
                .collect::<Result<Vec<_>, _>>()?;

            let count_stmt: Statement = self
                .client
                .prepare("SELECT COUNT(*) FROM books WHERE author ILIKE $1 AND genre ILIKE $2")
                .await?;

            let count_rows = self
                .client
                .query(&count_stmt, &[&author_pattern, &genre_pattern])
                .await?;

            let total: i64 = count_rows
                .first()
                .ok_or_else(|| BooksRepositoryError::Other("Count not returned".to_string()))?
                .try_get(0)?;

            Ok((books, total))
        })
        .await
        .map_err(|_| BooksRepositoryError::Timeout)?
    }

    async fn search_books(&self, query: &str, cap: i64) -> Result<Vec<Book>, BooksRepositoryError> {
        tokio::time::timeout(OPERATION_TIMEOUT, async {
            let pattern = like_pattern(Some(query));

            let stmt: Statement = self
                .client
                .prepare(
                    "SELECT id, title, author, genre, created_at FROM books \
                     WHERE title ILIKE $1 OR author ILIKE $1 \
                     ORDER BY id LIMIT $2",
                )
                .await?;

            let rows = self.client.query(&stmt, &[&pattern, &cap]).await?;
            rows.iter().map(book_from_row).collect()
        })
        .await
        .map_err(|_| BooksRepositoryError::Timeout)?
    }

    async fn add_review(
        &self,
        book_id: BookId,
        user_id: UserId,
        review: NewReview,
    ) -> Result<Review, BooksRepositoryError> {
        tokio::time::timeout(OPERATION_TIMEOUT, async {
            let stmt: Statement = self
                .client
                .prepare(
                    "INSERT INTO reviews (book_id, user_id, rating, comment, created_at) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING id",
                )
                .await?;

            let created_at = unix_timestamp();
            let rows = self
                .client
                .query(
                    &stmt,
                    &[&book_id, &user_id, &review.rating, &review.comment, &created_at],
                )
                .await;

            match rows {
                Ok(rows) => {
                    let id: ReviewId = rows
                        .first()
                        .ok_or_else(|| {
                            BooksRepositoryError::Other("Id not returned".to_string())
                        })?
                        .try_get(0)?;
                    Ok(Review {
                        id,
                        user_id,
                        rating: review.rating,
                        comment: review.comment,
                        created_at,
                    })
                }
                // Unique constraint violation on (book_id, user_id)
                Err(err) if has_sql_state(&err, "23505") => {
                    Err(BooksRepositoryError::DuplicateReview { book_id, user_id })
                }
                // Foreign key violation means the parent book does not exist
                Err(err) if has_sql_state(&err, "23503") => {
                    Err(BooksRepositoryError::BookNotFound(book_id))
                }
                Err(other_err) => Err(other_err.into()),
            }
        })
        .await
        .map_err(|_| BooksRepositoryError::Timeout)?
    }

    async fn update_review(
        &self,
        review_id: ReviewId,
        user_id: UserId,
        patch: ReviewPatch,
    ) -> Result<Review, BooksRepositoryError> {
        tokio::time::timeout(OPERATION_TIMEOUT, async {
            self.check_review_owner(review_id, user_id).await?;

            let stmt: Statement = self
                .client
                .prepare(
                    "UPDATE reviews SET \
                     rating = COALESCE($2, rating), \
                     comment = COALESCE($3, comment) \
                     WHERE id = $1 AND user_id = $4 \
                     RETURNING id, user_id, rating, comment, created_at",
                )
                .await?;

            let rows = self
                .client
                .query(&stmt, &[&review_id, &patch.rating, &patch.comment, &user_id])
                .await?;

            rows.first()
                // The review disappeared between the owner check and the
                // update; report it the same way as a plain miss.
                .ok_or(BooksRepositoryError::ReviewNotFound(review_id))
                .and_then(review_from_row)
        })
        .await
        .map_err(|_| BooksRepositoryError::Timeout)?
    }

    async fn delete_review(
        &self,
        review_id: ReviewId,
        user_id: UserId,
    ) -> Result<(), BooksRepositoryError> {
        tokio::time::timeout(OPERATION_TIMEOUT, async {
            self.check_review_owner(review_id, user_id).await?;

            let stmt: Statement = self
                .client
                .prepare("DELETE FROM reviews WHERE id = $1 AND user_id = $2 RETURNING id")
                .await?;

            let rows = self.client.query(&stmt, &[&review_id, &user_id]).await?;
            if rows.is_empty() {
                Err(BooksRepositoryError::ReviewNotFound(review_id))
            } else {
                Ok(())
            }
        })
        .await
        .map_err(|_| BooksRepositoryError::Timeout)?
    }

    async fn get_reviews(&self, book_id: BookId) -> Result<Vec<Review>, BooksRepositoryError> {
        tokio::time::timeout(OPERATION_TIMEOUT, async {
            let stmt: Statement = self
                .client
                .prepare(
                    "SELECT id, user_id, rating, comment, created_at FROM reviews \
                     WHERE book_id = $1 ORDER BY id",
                )
                .await?;

            let rows = self.client.query(&stmt, &[&book_id]).await?;
            rows.iter().map(review_from_row).collect()
        })
        .await
        .map_err(|_| BooksRepositoryError::Timeout)?
    }
}

impl PostgresBooksRepository {
    async fn check_review_owner(
        &self,
        review_id: ReviewId,
        user_id: UserId,
    ) -> Result<(), BooksRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT user_id FROM reviews WHERE id = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&review_id]).await?;
        let owner: UserId = rows
            .first()
            .ok_or(BooksRepositoryError::ReviewNotFound(review_id))?
            .try_get(0)?;

        if owner != user_id {
            return Err(BooksRepositoryError::NotOwner(review_id));
        }
        Ok(())
    }
}
