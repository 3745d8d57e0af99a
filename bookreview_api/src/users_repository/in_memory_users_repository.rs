use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::UNIX_EPOCH;

use crate::api::UserId;
use crate::users_repository::{NewUser, UserRecord, UsersRepository, UsersRepositoryError};

pub struct InMemoryUsersRepository {
    user_sequence_generator: AtomicI32,
    users: parking_lot::RwLock<HashMap<UserId, UserRecord>>,
}

impl Default for InMemoryUsersRepository {
    fn default() -> Self {
        Self {
            user_sequence_generator: AtomicI32::new(1),
            users: Default::default(),
        }
    }
}

#[async_trait::async_trait]
impl UsersRepository for InMemoryUsersRepository {
    async fn add_user(&self, user: NewUser) -> Result<UserId, UsersRepositoryError> {
        // The uniqueness check and the insert happen under one write lock.
        let mut locked_users = self.users.write();

        if locked_users
            .values()
            .any(|existing| existing.username == user.username || existing.email == user.email)
        {
            return Err(UsersRepositoryError::DuplicateIdentity);
        }

        let id = self.user_sequence_generator.fetch_add(1, Ordering::Relaxed);
        locked_users.insert(
            id,
            UserRecord {
                id,
                username: user.username,
                email: user.email,
                password_hash: user.password_hash,
                created_at: std::time::SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap()
                    .as_secs() as i64,
            },
        );
        Ok(id)
    }

    async fn identity_taken(
        &self,
        username: &str,
        email: &str,
    ) -> Result<bool, UsersRepositoryError> {
        Ok(self
            .users
            .read()
            .values()
            .any(|existing| existing.username == username || existing.email == email))
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, UsersRepositoryError> {
        Ok(self
            .users
            .read()
            .values()
            .find(|existing| existing.username == username)
            .cloned())
    }
}

#[cfg(test)]
mod in_memory_users_repository_tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "$2b$04$fakefakefakefakefakefakefakefakefakefakefakefakefake"
                .to_string(),
        }
    }

    #[tokio::test]
    /// Covers signup-side user management in one case:
    /// 1. Looks up a missing user
    /// 2. Adds a user and finds it by username
    /// 3. Rejects a second user reusing the username
    /// 4. Rejects a third user reusing the email
    async fn test_add_user_and_uniqueness() {
        let repository = InMemoryUsersRepository::default();

        assert_eq!(repository.find_by_username("alice").await.unwrap(), None);
        assert!(!repository
            .identity_taken("alice", "a@x.com")
            .await
            .unwrap());

        let user_id = repository
            .add_user(new_user("alice", "a@x.com"))
            .await
            .unwrap();

        let stored = repository
            .find_by_username("alice")
            .await
            .unwrap()
            .expect("User not found");
        assert_eq!(stored.id, user_id);
        assert_eq!(stored.email, "a@x.com");

        assert!(repository.identity_taken("alice", "b@x.com").await.unwrap());
        assert!(repository.identity_taken("bob", "a@x.com").await.unwrap());
        assert!(!repository.identity_taken("bob", "b@x.com").await.unwrap());

        let same_username = repository.add_user(new_user("alice", "b@x.com")).await;
        assert!(matches!(
            same_username,
            Err(UsersRepositoryError::DuplicateIdentity)
        ));

        let same_email = repository.add_user(new_user("bob", "a@x.com")).await;
        assert!(matches!(
            same_email,
            Err(UsersRepositoryError::DuplicateIdentity)
        ));
    }
}
