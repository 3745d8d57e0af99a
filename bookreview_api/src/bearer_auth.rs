//! Bearer-token extractor guarding the mutation routes.

use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::web::Data;
use actix_web::{FromRequest, HttpRequest};
use paperclip::actix::Apiv2Security;

use crate::api::UserId;
use crate::session_tokens::{TokenError, TokenService};

/// The identity asserted by a valid `Authorization: Bearer <token>` header.
/// Handlers that take this as an argument are only reachable with a token
/// that verified against the configured signing secret.
#[derive(Debug, Clone, Apiv2Security)]
#[openapi(
    apiKey,
    alias = "Bearer token",
    in = "header",
    name = "Authorization",
    description = "Use format: Bearer <token>"
)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub username: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = TokenError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, TokenError> {
    let token_service = req.app_data::<Data<TokenService>>().ok_or_else(|| {
        tracing::error!("TokenService is not registered in app data");
        TokenError::Malformed
    })?;

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(TokenError::Missing)?;

    let claims = token_service.verify(token)?;

    Ok(AuthenticatedUser {
        user_id: claims.sub,
        username: claims.username,
    })
}

#[cfg(test)]
mod bearer_auth_tests {
    use actix_web::test::TestRequest;
    use actix_web::web::Data;

    use super::*;

    fn request_with_header(token_service: TokenService, header: Option<&str>) -> HttpRequest {
        let mut request = TestRequest::default().app_data(Data::new(token_service));
        if let Some(header) = header {
            request = request.insert_header((AUTHORIZATION, header));
        }
        request.to_http_request()
    }

    #[test]
    fn test_valid_bearer_token_yields_the_user() {
        let service = TokenService::new("test-secret");
        let token = service.issue(7, "alice").unwrap();

        let req = request_with_header(service, Some(&format!("Bearer {token}")));
        let user = authenticate(&req).unwrap();

        assert_eq!(user.user_id, 7);
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn test_missing_header_is_distinguished_from_invalid_token() {
        let service = TokenService::new("test-secret");

        let no_header = request_with_header(service.clone(), None);
        assert!(matches!(authenticate(&no_header), Err(TokenError::Missing)));

        let wrong_scheme = request_with_header(service.clone(), Some("Basic abc"));
        assert!(matches!(
            authenticate(&wrong_scheme),
            Err(TokenError::Missing)
        ));

        let bad_token = request_with_header(service, Some("Bearer garbage"));
        assert!(matches!(
            authenticate(&bad_token),
            Err(TokenError::Malformed)
        ));
    }
}
