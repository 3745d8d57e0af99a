//! Stateless session tokens.
//!
//! A token is an HS256 JWT carrying the user id and username, valid for one
//! hour from issuance. Validity is decided entirely by the signature and the
//! expiry claim; there is no revocation list and no refresh mechanism.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::api::UserId;

pub const TOKEN_VALIDITY_SECONDS: i64 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Claims {
    pub sub: UserId,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Access denied. No token provided.")]
    Missing,

    #[error("Invalid token.")]
    Malformed,

    #[error("Token expired.")]
    Expired,

    #[error("Failed to issue token: {0}")]
    Issue(#[from] jsonwebtoken::errors::Error),
}

impl actix_web::ResponseError for TokenError {
    fn status_code(&self) -> StatusCode {
        match self {
            TokenError::Missing | TokenError::Malformed | TokenError::Expired => {
                StatusCode::UNAUTHORIZED
            }
            TokenError::Issue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "message": self.to_string() }))
    }
}

#[derive(Clone)]
pub struct TokenService {
    secret: String,
    validity_seconds: i64,
}

impl TokenService {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            validity_seconds: TOKEN_VALIDITY_SECONDS,
        }
    }

    /// Overrides the validity window, used by tests to produce expired tokens.
    pub fn with_validity(mut self, validity_seconds: i64) -> Self {
        self.validity_seconds = validity_seconds;
        self
    }

    pub fn issue(&self, user_id: UserId, username: &str) -> Result<String, TokenError> {
        let issued_at = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            iat: issued_at,
            exp: issued_at + self.validity_seconds,
        };

        Ok(jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        // No leeway so the validity window is exactly one hour.
        validation.leeway = 0;

        jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        })
    }
}

#[cfg(test)]
mod session_tokens_tests {
    use super::*;

    #[test]
    fn test_issue_then_verify_recovers_the_identity() {
        let service = TokenService::new("test-secret");

        let token = service.issue(42, "alice").unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(claims.sub, 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp, claims.iat + TOKEN_VALIDITY_SECONDS);
    }

    #[test]
    fn test_expired_token_is_rejected_as_expired() {
        let service = TokenService::new("test-secret").with_validity(-10);

        let token = service.issue(42, "alice").unwrap();
        let result = service.verify(&token);

        assert!(matches!(result, Err(TokenError::Expired)));
    }

    #[test]
    fn test_tampered_signature_is_rejected_as_malformed() {
        let service = TokenService::new("test-secret");
        let token = service.issue(42, "alice").unwrap();

        // Flip one character inside the signature segment.
        let signature_start = token.rfind('.').unwrap() + 1;
        let mut tampered: Vec<char> = token.chars().collect();
        tampered[signature_start] = if tampered[signature_start] == 'A' {
            'B'
        } else {
            'A'
        };
        let tampered: String = tampered.into_iter().collect();

        assert!(matches!(
            service.verify(&tampered),
            Err(TokenError::Malformed)
        ));
    }

    #[test]
    fn test_token_signed_with_different_secret_is_rejected() {
        let token = TokenService::new("secret-one").issue(1, "bob").unwrap();

        let result = TokenService::new("secret-two").verify(&token);
        assert!(matches!(result, Err(TokenError::Malformed)));
    }

    #[test]
    fn test_garbage_token_is_rejected_as_malformed() {
        let service = TokenService::new("test-secret");
        assert!(matches!(
            service.verify("not.a.token"),
            Err(TokenError::Malformed)
        ));
    }
}
