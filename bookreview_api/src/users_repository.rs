pub use in_memory_users_repository::InMemoryUsersRepository;
pub use postgres_users_repository::{PostgresUsersRepository, PostgresUsersRepositoryConfig};

use crate::api::UserId;

mod in_memory_users_repository;
mod postgres_users_repository;

#[derive(Debug, thiserror::Error)]
pub enum UsersRepositoryError {
    #[error("Username or email already exists")]
    DuplicateIdentity,

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Database operation timed out")]
    Timeout,

    #[error("Other error {0}")]
    Other(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Stored user record. The password hash never leaves the repository and
/// credentials layers; wire responses are built without it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: i64,
}

#[async_trait::async_trait]
pub trait UsersRepository: Send + Sync {
    /// Adds a user, failing with DuplicateIdentity when the username or the
    /// email is already taken. Uniqueness is enforced by the backend itself,
    /// not by a prior lookup.
    async fn add_user(&self, user: NewUser) -> Result<UserId, UsersRepositoryError>;

    /// Single-query existence check for signup; an optimization only, the
    /// add_user constraint remains the guarantee.
    async fn identity_taken(
        &self,
        username: &str,
        email: &str,
    ) -> Result<bool, UsersRepositoryError>;

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, UsersRepositoryError>;
}
