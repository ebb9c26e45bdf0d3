use crate::auth::middleware::AuthUser;
use crate::review::model::{ApproveArticleRequest, ReviewError, ReviewErrorResponse};
use crate::review::service::ReviewService;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

// Helper function to convert ReviewError to HTTP response
fn review_error_to_response(err: ReviewError) -> (StatusCode, Json<ReviewErrorResponse>) {
    let (status, error_message, code) = match err {
        ReviewError::DatabaseError(e) => {
            error!("Database error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "approve_failed",
                "DB_ERROR",
            )
        }
        ReviewError::NotFound => (
            StatusCode::NOT_FOUND,
            "article_not_found",
            "NOT_FOUND",
        ),
        ReviewError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", "FORBIDDEN"),
        ReviewError::InvalidStatusTransition(_) => (
            StatusCode::BAD_REQUEST,
            "invalid_status_transition",
            "INVALID_STATUS_TRANSITION",
        ),
        ReviewError::InternalError(e) => {
            error!("Internal error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "unexpected_error",
                "INTERNAL_SERVER_ERROR",
            )
        }
    };

    (
        status,
        Json(ReviewErrorResponse {
            error: error_message.to_string(),
            code: code.to_string(),
        }),
    )
}

/// Approve an article
///
/// Publishes the article, queues a notification for every follower who asked
/// for one and runs the notification processor straight away. Reviewers only.
#[utoipa::path(
    post,
    path = "/api/articles/{id}/approve",
    tag = "reviews",
    params(
        ("id" = i64, Path, description = "The ID of the article to approve")
    ),
    request_body = ApproveArticleRequest,
    responses(
        (status = 200, description = "Article published", body = ApproveArticleResponse),
        (status = 400, description = "Article cannot be approved from its current status", body = ReviewErrorResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not a reviewer", body = ReviewErrorResponse),
        (status = 404, description = "Article not found", body = ReviewErrorResponse),
        (status = 500, description = "Internal server error", body = ReviewErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn approve_article(
    Path(article_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    Extension(review_service): Extension<Arc<ReviewService>>,
    body: Option<Json<ApproveArticleRequest>>,
) -> impl IntoResponse {
    info!("Approval of article {} requested by {}", article_id, user.user_id);
    let request = body.map(|Json(request)| request).unwrap_or_default();

    match review_service
        .approve(
            user.user_id,
            user.email.as_deref(),
            article_id,
            request.review_notes,
        )
        .await
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => review_error_to_response(e).into_response(),
    }
}
