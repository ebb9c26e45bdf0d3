use crate::auth::middleware::auth_middleware;
use crate::review::controller::approve_article;
use crate::review::service::ReviewService;
use axum::{middleware, routing::post, Router};
use std::sync::Arc;

/// Create a router for editorial review routes
pub fn routes(review_service: Arc<ReviewService>) -> Router {
    Router::new()
        .route(
            "/api/articles/:id/approve",
            post(approve_article).route_layer(middleware::from_fn(auth_middleware)),
        )
        .layer(axum::extract::Extension(review_service))
}
