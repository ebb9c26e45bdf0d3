use crate::auth::middleware::AuthUser;
use crate::notification::model::{
    EnqueueEventRequest, EnqueueEventResponse, NotificationError, NotificationErrorResponse,
    NotificationSettings,
};
use crate::routes::notifications::NotificationState;
use axum::{
    extract::{Extension, Query},
    headers::{authorization::Bearer, Authorization},
    http::StatusCode,
    response::IntoResponse,
    Json, TypedHeader,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};

/// Query parameters of the scheduled trigger
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct CronQueryParams {
    /// For schedulers that cannot set headers
    secret: Option<String>,
}

fn error_response(
    status: StatusCode,
    error: &str,
    code: &str,
) -> (StatusCode, Json<NotificationErrorResponse>) {
    (
        status,
        Json(NotificationErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

// Helper function to convert NotificationError to HTTP response
pub fn notification_error_to_response(
    err: NotificationError,
) -> (StatusCode, Json<NotificationErrorResponse>) {
    match err {
        NotificationError::FailedToFetchEvents(source) => {
            error!("Processor could not fetch events: {}", source);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed_to_fetch_events",
                "FETCH_FAILED",
            )
        }
        NotificationError::ValidationError(message) => {
            error_response(StatusCode::BAD_REQUEST, &message, "VALIDATION_ERROR")
        }
        NotificationError::Unauthorized => {
            error_response(StatusCode::UNAUTHORIZED, "unauthorized", "UNAUTHORIZED")
        }
        NotificationError::DatabaseError(e) => {
            error!("Database error: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error",
                "DB_ERROR",
            )
        }
        other => {
            error!("Unhandled notification error: {}", other);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "unhandled_error",
                "INTERNAL_ERROR",
            )
        }
    }
}

async fn run_processor(state: &NotificationState) -> impl IntoResponse {
    match state.processor.process_pending_events().await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => notification_error_to_response(e).into_response(),
    }
}

/// Scheduled notification run
///
/// Called by the scheduler with the shared secret, either as a bearer token
/// or as the `secret` query parameter.
#[utoipa::path(
    get,
    path = "/api/cron/notification-events",
    tag = "notifications",
    params(
        ("secret" = Option<String>, Query, description = "Shared secret, when not sent as a bearer token")
    ),
    responses(
        (status = 200, description = "Batch processed", body = ProcessSummary),
        (status = 401, description = "Wrong or missing secret", body = NotificationErrorResponse),
        (status = 500, description = "Secret not configured or batch fetch failed", body = NotificationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn run_scheduled_processing(
    Extension(state): Extension<Arc<NotificationState>>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Query(params): Query<CronQueryParams>,
) -> impl IntoResponse {
    let Some(expected) = state.cron_secret.as_deref() else {
        error!("NOTIFICATION_CRON_SECRET is not set; refusing scheduled run");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "cron_secret_not_set",
            "CRON_SECRET_NOT_SET",
        )
        .into_response();
    };

    let provided = bearer
        .as_ref()
        .map(|TypedHeader(Authorization(bearer))| bearer.token())
        .or(params.secret.as_deref());

    if !provided.map_or(false, |provided| secrets_match(provided, expected)) {
        warn!("Rejected scheduled notification run with a bad secret");
        return notification_error_to_response(NotificationError::Unauthorized).into_response();
    }

    info!("Scheduled notification run started");
    run_processor(&state).await.into_response()
}

/// Compares the whole secret regardless of where the first mismatch is.
fn secrets_match(provided: &str, expected: &str) -> bool {
    let (provided, expected) = (provided.as_bytes(), expected.as_bytes());
    let mut diff = u8::from(provided.len() != expected.len());
    for (a, b) in provided.iter().zip(expected) {
        diff |= a ^ b;
    }
    std::hint::black_box(diff) == 0
}

/// Process pending notification events
///
/// Manual trigger for signed-in users; runs the same batch as the scheduler.
#[utoipa::path(
    post,
    path = "/api/notification-events/process",
    tag = "notifications",
    responses(
        (status = 200, description = "Batch processed", body = ProcessSummary),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Batch fetch failed", body = NotificationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn process_pending(
    Extension(user): Extension<AuthUser>,
    Extension(state): Extension<Arc<NotificationState>>,
) -> impl IntoResponse {
    info!("Notification run requested by {}", user.user_id);
    run_processor(&state).await
}

/// Queue a notification event
///
/// The caller is recorded as the actor. Accepts `follow`, `like` and
/// `comment`; notifying yourself is accepted but queues nothing.
#[utoipa::path(
    post,
    path = "/api/notification-events",
    tag = "notifications",
    request_body = EnqueueEventRequest,
    responses(
        (status = 201, description = "Event queued", body = EnqueueEventResponse),
        (status = 200, description = "Nothing to queue", body = EnqueueEventResponse),
        (status = 400, description = "Invalid event", body = NotificationErrorResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn enqueue_event(
    Extension(user): Extension<AuthUser>,
    Extension(state): Extension<Arc<NotificationState>>,
    Json(request): Json<EnqueueEventRequest>,
) -> impl IntoResponse {
    match state.producer.enqueue_activity(user.user_id, request).await {
        Ok(Some(id)) => (
            StatusCode::CREATED,
            Json(EnqueueEventResponse {
                event_id: Some(id),
                queued: true,
            }),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::OK,
            Json(EnqueueEventResponse {
                event_id: None,
                queued: false,
            }),
        )
            .into_response(),
        Err(e) => notification_error_to_response(e).into_response(),
    }
}

/// Get notification settings
///
/// Returns the caller's settings, creating the default row on first visit.
#[utoipa::path(
    get,
    path = "/api/settings/notifications",
    tag = "notifications",
    responses(
        (status = 200, description = "Current settings", body = NotificationSettings),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error", body = NotificationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_notification_settings(
    Extension(user): Extension<AuthUser>,
    Extension(state): Extension<Arc<NotificationState>>,
) -> Result<Json<NotificationSettings>, (StatusCode, Json<NotificationErrorResponse>)> {
    state
        .preferences
        .load_or_seed(user.user_id)
        .await
        .map(Json)
        .map_err(notification_error_to_response)
}

/// Update notification settings
#[utoipa::path(
    put,
    path = "/api/settings/notifications",
    tag = "notifications",
    request_body = NotificationSettings,
    responses(
        (status = 200, description = "Settings saved", body = NotificationSettings),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error", body = NotificationErrorResponse)
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_notification_settings(
    Extension(user): Extension<AuthUser>,
    Extension(state): Extension<Arc<NotificationState>>,
    Json(settings): Json<NotificationSettings>,
) -> Result<Json<NotificationSettings>, (StatusCode, Json<NotificationErrorResponse>)> {
    state
        .preferences
        .save(user.user_id, settings)
        .await
        .map(Json)
        .map_err(notification_error_to_response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_failure_maps_to_its_own_code() {
        let (status, Json(body)) = notification_error_to_response(
            NotificationError::FailedToFetchEvents(Box::new(NotificationError::InternalError(
                "down".to_string(),
            ))),
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "failed_to_fetch_events");
    }

    #[test]
    fn test_other_errors_are_unhandled() {
        let (status, Json(body)) =
            notification_error_to_response(NotificationError::Timeout("notification settings"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "unhandled_error");
        assert_eq!(body.code, "INTERNAL_ERROR");
    }

    #[test]
    fn test_validation_errors_are_bad_requests() {
        let (status, Json(body)) = notification_error_to_response(
            NotificationError::ValidationError("payload.article_slug is required".to_string()),
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "VALIDATION_ERROR");
        assert_eq!(body.error, "payload.article_slug is required");
    }

    #[test]
    fn test_secret_comparison() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3creT", "s3cret"));
        assert!(!secrets_match("s3c", "s3cret"));
        assert!(!secrets_match("s3crets", "s3cret"));
        assert!(!secrets_match("", "s3cret"));
    }
}
