//! Password hashing and verification.
//!
//! Digests are bcrypt strings, so the salt and cost travel inside the digest
//! and verification needs no side storage. Hashing is deliberately slow;
//! handlers call these through the blocking pool.

pub const DEFAULT_COST: u32 = 10;

/// Work factor handed to handlers through app data so deployments can tune it.
#[derive(Debug, Clone, Copy)]
pub struct HashingCost(pub u32);

impl Default for HashingCost {
    fn default() -> Self {
        Self(DEFAULT_COST)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("Failed to hash password: {0}")]
    Hashing(bcrypt::BcryptError),

    #[error("Invalid digest format: {0}")]
    InvalidDigestFormat(bcrypt::BcryptError),
}

pub fn hash_password(password: &str, cost: u32) -> Result<String, CredentialsError> {
    bcrypt::hash(password, cost).map_err(CredentialsError::Hashing)
}

/// Returns false on mismatch; errors only when the digest itself cannot be
/// parsed as a bcrypt string.
pub fn verify_password(password: &str, digest: &str) -> Result<bool, CredentialsError> {
    bcrypt::verify(password, digest).map_err(CredentialsError::InvalidDigestFormat)
}
