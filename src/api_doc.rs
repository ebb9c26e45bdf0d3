use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Security scheme configuration for OpenAPI
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        // Identity-provider access tokens, and the scheduler's shared secret
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

/// API documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Qalam Notifier API",
        version = "0.1.0",
        description = "Notification event pipeline of the Qalam writing platform"
    ),
    paths(
        crate::routes::health::health_check,
        crate::routes::health::protected_health_check,
        crate::notification::controller::run_scheduled_processing,
        crate::notification::controller::process_pending,
        crate::notification::controller::enqueue_event,
        crate::notification::controller::get_notification_settings,
        crate::notification::controller::update_notification_settings,
        crate::review::controller::approve_article
    ),
    components(
        schemas(
            crate::routes::health::HealthResponse,
            crate::notification::model::NotificationSettings,
            crate::notification::model::ProcessSummary,
            crate::notification::model::FailedEvent,
            crate::notification::model::EnqueueEventRequest,
            crate::notification::model::EnqueueEventResponse,
            crate::notification::model::NotificationErrorResponse,
            crate::review::model::ApproveArticleRequest,
            crate::review::model::ApproveArticleResponse,
            crate::review::model::ReviewErrorResponse,
            crate::schema_ext::UuidWrapper
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "notifications", description = "Notification queue, processor and settings endpoints"),
        (name = "reviews", description = "Editorial approval endpoints")
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_notification_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/cron/notification-events",
            "/api/notification-events/process",
            "/api/notification-events",
            "/api/settings/notifications",
            "/api/articles/{id}/approve",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
