use axum::{
    async_trait,
    extract::FromRequestParts,
    headers::{authorization::Bearer, Authorization},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
    RequestPartsExt, TypedHeader,
};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use super::jwt::{validate_token, JwtError};

/// Authenticated user information
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    /// Verified email from the identity provider, when it has one
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    error: String,
}

fn auth_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(AuthErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn unauthorized(message: &str) -> Response {
    auth_error(StatusCode::UNAUTHORIZED, message)
}

// A missing secret is our misconfiguration, not the caller's fault.
fn token_rejection(err: JwtError) -> Response {
    let message = match err {
        JwtError::MissingSecret => "Authentication is not configured",
        JwtError::InvalidToken => "Invalid token. Please login again",
    };
    auth_error(StatusCode::from(err), message)
}

/// Authentication middleware to protect routes
pub async fn auth_middleware<B>(req: Request<B>, next: Next<B>) -> Result<Response, Response> {
    let (mut parts, body) = req.into_parts();

    let TypedHeader(Authorization(bearer)) = parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await
        .map_err(|e| {
            error!("Authorization header extraction failed: {:?}", e);
            unauthorized("Missing or invalid Authorization header. Please provide a Bearer token")
        })?;

    let claims = validate_token(bearer.token()).map_err(|e| {
        error!("Token validation failed: {}", e);
        token_rejection(e)
    })?;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|e| {
        error!("User ID parsing failed: {:?}", e);
        unauthorized("Invalid user identifier in token")
    })?;

    info!("User authenticated: {}", user_id);

    parts.extensions.insert(AuthUser {
        user_id,
        email: claims.email,
    });

    let req = Request::from_parts(parts, body);
    Ok(next.run(req).await)
}

/// Extractor for authenticated user
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| unauthorized("Authentication required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{generate_token, TEST_SECRET};
    use axum::{body::Body, middleware::from_fn, routing::get, Router};
    use tower::ServiceExt;

    async fn whoami(user: AuthUser) -> String {
        format!("{}|{}", user.user_id, user.email.unwrap_or_default())
    }

    fn app() -> Router {
        Router::new().route("/me", get(whoami).route_layer(from_fn(auth_middleware)))
    }

    fn request(token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/me");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_header_is_rejected() {
        let response = app().oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected() {
        std::env::set_var("JWT_SECRET", TEST_SECRET);
        let response = app().oneshot(request(Some("garbage"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        std::env::set_var("JWT_SECRET", TEST_SECRET);
        let token = generate_token(&Uuid::new_v4(), Some("a@b.example"));

        let response = app().oneshot(request(Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_missing_secret_is_a_server_error() {
        assert_eq!(
            token_rejection(JwtError::MissingSecret).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            token_rejection(JwtError::InvalidToken).status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
