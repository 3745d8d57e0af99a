use std::time::{Duration, UNIX_EPOCH};

use anyhow::Context;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Statement};

use crate::api::UserId;
use crate::users_repository::{NewUser, UserRecord, UsersRepository, UsersRepositoryError};

/// Upper bound on a single store operation; a hung database surfaces as a
/// Timeout error instead of a hanging request.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

pub struct PostgresUsersRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

pub struct PostgresUsersRepository {
    client: Client,
}

impl PostgresUsersRepository {
    pub async fn init(config: PostgresUsersRepositoryConfig) -> anyhow::Result<Self> {
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
        CREATE TABLE IF NOT EXISTS users (
            id              SERIAL PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            email           TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            created_at      BIGINT NOT NULL
            )
        ",
            )
            .await
            .context("Failed to setup users table")?;

        Ok(Self { client })
    }
}

fn record_from_row(row: &tokio_postgres::Row) -> Result<UserRecord, UsersRepositoryError> {
    Ok(UserRecord {
        id: row.try_get(0)?,
        username: row.try_get(1)?,
        email: row.try_get(2)?,
        password_hash: row.try_get(3)?,
        created_at: row.try_get(4)?,
    })
}

#[async_trait::async_trait]
impl UsersRepository for PostgresUsersRepository {
    async fn add_user(&self, user: NewUser) -> Result<UserId, UsersRepositoryError> {
        tokio::time::timeout(OPERATION_TIMEOUT, async {
            let stmt: Statement = self
                .client
                .prepare(
                    "INSERT INTO users (username, email, password_hash, created_at) \
                     VALUES ($1, $2, $3, $4) RETURNING id",
                )
                .await?;

            let created_at = std::time::SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs() as i64;

            let rows = self
                .client
                .query(
                    &stmt,
                    &[&user.username, &user.email, &user.password_hash, &created_at],
                )
                .await;

            match rows {
                Ok(rows) => {
                    let user_id: UserId = rows
                        .first()
                        .ok_or_else(|| UsersRepositoryError::Other("Id not returned".to_string()))?
                        .try_get(0)?;
                    Ok(user_id)
                }
                Err(err)
                    if err
                        .as_db_error()
                        // This is unique constraint validation error
                        .map(|db_err| db_err.code() == &SqlState::from_code("23505"))
                        .unwrap_or_default() =>
                {
                    Err(UsersRepositoryError::DuplicateIdentity)
                }
                Err(other_err) => Err(other_err.into()),
            }
        })
        .await
        .map_err(|_| UsersRepositoryError::Timeout)?
    }

    async fn identity_taken(
        &self,
        username: &str,
        email: &str,
    ) -> Result<bool, UsersRepositoryError> {
        tokio::time::timeout(OPERATION_TIMEOUT, async {
            let stmt: Statement = self
                .client
                .prepare("SELECT 1 FROM users WHERE username = $1 OR email = $2 LIMIT 1")
                .await?;

            let rows = self.client.query(&stmt, &[&username, &email]).await?;
            Ok(!rows.is_empty())
        })
        .await
        .map_err(|_| UsersRepositoryError::Timeout)?
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, UsersRepositoryError> {
        tokio::time::timeout(OPERATION_TIMEOUT, async {
            let stmt: Statement = self
                .client
                .prepare(
                    "SELECT id, username, email, password_hash, created_at \
                     FROM users WHERE username = $1",
                )
                .await?;

            let rows = self.client.query(&stmt, &[&username]).await?;
            rows.first().map(record_from_row).transpose()
        })
        .await
        .map_err(|_| UsersRepositoryError::Timeout)?
    }
}

#[cfg(test)]
mod postgres_users_repository_tests {
    use serial_test::file_serial;
    use testcontainers::core::IntoContainerPort;
    use testcontainers::runners::AsyncRunner;
    use testcontainers::{ContainerAsync, GenericImage, ImageExt};

    use super::*;

    async fn start_postgres_container_and_init_repo(
    ) -> (ContainerAsync<GenericImage>, PostgresUsersRepository) {
        let _pg_container = GenericImage::new("postgres", "latest")
            .with_mapped_port(5432, 5432.tcp())
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .start()
            .await
            .expect("Failed to start postgres");

        for _ in 0..10 {
            if let Ok(repo) = PostgresUsersRepository::init(PostgresUsersRepositoryConfig {
                hostname: "127.0.0.1".to_string(),
                username: "postgres".to_string(),
                password: "postgres".to_string(),
            })
            .await
            {
                return (_pg_container, repo);
            }
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        }
        panic!("Failed to setup postgres container")
    }

    #[tokio::test]
    #[file_serial(key, path => "../.pgtestslock")]
    /// Covers signup-side user management in one case to avoid restarting
    /// the container:
    /// 1. Looks up a missing user
    /// 2. Adds a user and finds it by username
    /// 3. Rejects a second user reusing the username or the email
    async fn test_add_user_and_uniqueness() {
        let (_container, repository) = start_postgres_container_and_init_repo().await;

        assert_eq!(repository.find_by_username("alice").await.unwrap(), None);
        assert!(!repository
            .identity_taken("alice", "a@x.com")
            .await
            .unwrap());

        let user = NewUser {
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            password_hash: "$2b$04$fakefakefakefakefakefakefakefakefakefakefakefakefake"
                .to_string(),
        };

        let user_id = repository.add_user(user.clone()).await.unwrap();

        let stored = repository
            .find_by_username("alice")
            .await
            .unwrap()
            .expect("User not found");
        assert_eq!(stored.id, user_id);
        assert_eq!(stored.email, "a@x.com");
        assert_eq!(stored.password_hash, user.password_hash);

        assert!(repository.identity_taken("alice", "b@x.com").await.unwrap());
        assert!(repository.identity_taken("bob", "a@x.com").await.unwrap());

        let same_username = repository
            .add_user(NewUser {
                email: "b@x.com".to_string(),
                ..user.clone()
            })
            .await;
        assert!(matches!(
            same_username,
            Err(UsersRepositoryError::DuplicateIdentity)
        ));

        let same_email = repository
            .add_user(NewUser {
                username: "bob".to_string(),
                ..user
            })
            .await;
        assert!(matches!(
            same_email,
            Err(UsersRepositoryError::DuplicateIdentity)
        ));
    }
}
