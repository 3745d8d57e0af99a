use anyhow::{bail, Context};
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_tracing::TracingMiddleware;

use crate::api::{
    Book, BookDetailsResponse, BookId, BookListResponse, LoginRequest, NewBook, NewReview, Review,
    ReviewId, ReviewPatch, ReviewResponse, SearchResponse, SignupRequest, TokenResponse,
};

pub struct BookReviewClient {
    url: String,
    client: ClientWithMiddleware,
}

impl BookReviewClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client)
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    fn with_bearer(builder: RequestBuilder, token: &str) -> RequestBuilder {
        builder.header("Authorization", format!("Bearer {token}"))
    }

    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> anyhow::Result<()> {
        let response = self
            .client
            .post(format!("{}/api/auth/signup", self.url))
            .json(&SignupRequest {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to sign up {}", error)
        }
        Ok(())
    }

    pub async fn login(&self, username: &str, password: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .post(format!("{}/api/auth/login", self.url))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to log in {}", error)
        }

        let body: TokenResponse = response.json().await?;
        Ok(body.token)
    }

    pub async fn add_book(&self, token: &str, details: NewBook) -> anyhow::Result<Book> {
        let response = Self::with_bearer(
            self.client.post(format!("{}/api/books", self.url)),
            token,
        )
        .json(&details)
        .send()
        .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to add book {}", error)
        }

        let body: crate::api::BookResponse = response.json().await?;
        Ok(body.book)
    }

    pub async fn list_books(
        &self,
        page: Option<i64>,
        limit: Option<i64>,
        author: Option<&str>,
        genre: Option<&str>,
    ) -> anyhow::Result<BookListResponse> {
        let mut query: Vec<(&str, String)> = vec![];
        if let Some(page) = page {
            query.push(("page", page.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(author) = author {
            query.push(("author", author.to_string()));
        }
        if let Some(genre) = genre {
            query.push(("genre", genre.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/api/books", self.url))
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to list books {}", error)
        }

        Ok(response.json().await?)
    }

    pub async fn get_book(
        &self,
        book_id: BookId,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> anyhow::Result<Option<BookDetailsResponse>> {
        let mut query: Vec<(&str, String)> = vec![];
        if let Some(page) = page {
            query.push(("page", page.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/api/books/{}", self.url, book_id))
            .query(&query)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to get book {}", error)
        }

        Ok(Some(response.json().await?))
    }

    pub async fn add_review(
        &self,
        token: &str,
        book_id: BookId,
        review: NewReview,
    ) -> anyhow::Result<Review> {
        let response = Self::with_bearer(
            self.client
                .post(format!("{}/api/books/{}/reviews", self.url, book_id)),
            token,
        )
        .json(&review)
        .send()
        .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to add review {}", error)
        }

        let body: ReviewResponse = response.json().await?;
        Ok(body.review)
    }

    pub async fn update_review(
        &self,
        token: &str,
        review_id: ReviewId,
        patch: ReviewPatch,
    ) -> anyhow::Result<Review> {
        let response = Self::with_bearer(
            self.client
                .put(format!("{}/api/reviews/{}", self.url, review_id)),
            token,
        )
        .json(&patch)
        .send()
        .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to update review {}", error)
        }

        let body: ReviewResponse = response.json().await?;
        Ok(body.review)
    }

    pub async fn delete_review(&self, token: &str, review_id: ReviewId) -> anyhow::Result<()> {
        let response = Self::with_bearer(
            self.client
                .delete(format!("{}/api/reviews/{}", self.url, review_id)),
            token,
        )
        .send()
        .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to delete review {}", error)
        }
        Ok(())
    }

    pub async fn search(&self, query: &str) -> anyhow::Result<Vec<Book>> {
        let response = self
            .client
            .get(format!("{}/api/search", self.url))
            .query(&[("q", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            bail!("Failed to search books {}", error)
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.results)
    }
}
