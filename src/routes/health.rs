use axum::{
    extract::State, http::StatusCode, middleware::from_fn, response::IntoResponse, routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;
use utoipa::ToSchema;

use crate::auth::middleware::{auth_middleware, AuthUser};

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    status: String,
    /// Whether the notification queue tables answer; only on the protected check
    #[schema(example = "ok")]
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<String>,
    #[schema(example = "notification service is running")]
    message: String,
}

/// Liveness of the notification service
///
/// Answers without touching Postgres, SMTP or Redis, so schedulers and load
/// balancers can poll it cheaply.
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    ),
    tag = "health"
)]
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            database: None,
            message: "notification service is running".to_string(),
        }),
    )
}

/// Readiness of the event queue
///
/// Requires a bearer token. Probes the `notification_events` table the
/// processor drains; a failing probe still answers 200 with `database: "error"`.
#[utoipa::path(
    get,
    path = "/api/health/protected",
    responses(
        (status = 200, description = "Service is up; database state reported", body = HealthResponse),
        (status = 401, description = "Unauthorized - Invalid or missing token")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "health"
)]
pub async fn protected_health_check(
    user: AuthUser,
    State(pool): State<PgPool>,
) -> impl IntoResponse {
    let database = match sqlx::query("SELECT 1 FROM notification_events LIMIT 1")
        .fetch_optional(&pool)
        .await
    {
        Ok(_) => "ok",
        Err(e) => {
            warn!("Queue probe failed: {}", e);
            "error"
        }
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            database: Some(database.to_string()),
            message: format!("notification service is running; caller {}", user.user_id),
        }),
    )
}

pub fn routes(pool: PgPool) -> Router {
    Router::new().route("/api/health", get(health_check)).route(
        "/api/health/protected",
        get(protected_health_check)
            .route_layer(from_fn(auth_middleware))
            .with_state(pool),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, HttpBody},
        http::Request,
    };
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/qalam_unused")
            .unwrap()
    }

    #[tokio::test]
    async fn test_public_health_check() {
        let response = routes(lazy_pool())
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body();
        let mut bytes = Vec::new();
        while let Some(chunk) = body.data().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json.get("database").is_none());
    }

    #[tokio::test]
    async fn test_queue_probe_requires_token() {
        let response = routes(lazy_pool())
            .oneshot(
                Request::builder()
                    .uri("/api/health/protected")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
