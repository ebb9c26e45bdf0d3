use crate::auth::middleware::auth_middleware;
use crate::notification::controller::{
    enqueue_event, get_notification_settings, process_pending, run_scheduled_processing,
    update_notification_settings,
};
use crate::notification::preferences::PreferenceResolver;
use crate::notification::processor::NotificationProcessor;
use crate::notification::producer::EventProducer;
use axum::{
    extract::Extension,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Everything the notification endpoints share
pub struct NotificationState {
    pub processor: Arc<NotificationProcessor>,
    pub preferences: PreferenceResolver,
    pub producer: EventProducer,
    /// Secret expected from the scheduler; the cron route refuses to run without it
    pub cron_secret: Option<String>,
}

/// Create a router for notification routes
pub fn routes(state: Arc<NotificationState>) -> Router {
    Router::new()
        // Scheduler trigger (shared secret, checked in the handler)
        .route(
            "/api/cron/notification-events",
            get(run_scheduled_processing),
        )
        // Manual trigger (requires authentication)
        .route(
            "/api/notification-events/process",
            post(process_pending).route_layer(middleware::from_fn(auth_middleware)),
        )
        .route(
            "/api/notification-events",
            post(enqueue_event).route_layer(middleware::from_fn(auth_middleware)),
        )
        .route(
            "/api/settings/notifications",
            get(get_notification_settings)
                .put(update_notification_settings)
                .route_layer(middleware::from_fn(auth_middleware)),
        )
        .layer(Extension(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{generate_token, TEST_SECRET};
    use crate::notification::model::{EventStatus, EventType, NotificationSettings};
    use crate::notification::render::ContentRenderer;
    use crate::notification::store::EventStore;
    use crate::notification::testing::{InMemoryStore, RecordingChannel};
    use axum::{
        body::{Body, HttpBody},
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app(store: &Arc<InMemoryStore>, cron_secret: Option<&str>) -> Router {
        let preferences = PreferenceResolver::new(store.clone());
        let processor = NotificationProcessor::new(
            store.clone(),
            preferences.clone(),
            store.clone(),
            ContentRenderer::new("https://qalam.example"),
            Arc::new(RecordingChannel::new()),
            Duration::from_secs(5),
        );

        routes(Arc::new(NotificationState {
            processor: Arc::new(processor),
            preferences,
            producer: EventProducer::new(store.clone(), store.clone()),
            cron_secret: cron_secret.map(str::to_string),
        }))
    }

    async fn read_json(response: Response) -> Value {
        let mut body = response.into_body();
        let mut bytes = Vec::new();
        while let Some(chunk) = body.data().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }
        serde_json::from_slice(&bytes).unwrap()
    }

    fn bearer(user_id: &Uuid) -> String {
        std::env::set_var("JWT_SECRET", TEST_SECRET);
        format!("Bearer {}", generate_token(user_id, None))
    }

    fn cron(uri: &str, authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = authorization {
            builder = builder.header("Authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_cron_without_configured_secret_is_refused() {
        let store = Arc::new(InMemoryStore::new());
        let response = app(&store, None)
            .oneshot(cron("/api/cron/notification-events?secret=anything", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await["error"], "cron_secret_not_set");
    }

    #[tokio::test]
    async fn test_cron_with_wrong_secret_touches_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let recipient = Uuid::new_v4();
        store.set_settings(
            recipient,
            NotificationSettings {
                pref_email: true,
                ..Default::default()
            },
        );
        let id = store
            .enqueue(crate::notification::model::NewNotificationEvent {
                event_type: EventType::Follow,
                actor_id: Some(Uuid::new_v4()),
                recipient_id: recipient,
                article_id: None,
                payload: json!({}),
            })
            .await
            .unwrap();

        let response = app(&store, Some("s3cret"))
            .oneshot(cron(
                "/api/cron/notification-events",
                Some("Bearer wrong"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(read_json(response).await["error"], "unauthorized");
        assert_eq!(store.event(id).status, EventStatus::Pending);
    }

    #[tokio::test]
    async fn test_cron_accepts_header_or_query_secret() {
        let store = Arc::new(InMemoryStore::new());

        let by_header = app(&store, Some("s3cret"))
            .oneshot(cron(
                "/api/cron/notification-events",
                Some("Bearer s3cret"),
            ))
            .await
            .unwrap();
        assert_eq!(by_header.status(), StatusCode::OK);
        assert_eq!(
            read_json(by_header).await,
            json!({"processed": 0, "failed": [], "skipped": 0, "total": 0, "message": "no_pending_events"})
        );

        let by_query = app(&store, Some("s3cret"))
            .oneshot(cron("/api/cron/notification-events?secret=s3cret", None))
            .await
            .unwrap();
        assert_eq!(by_query.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cron_reports_fetch_failure() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_next_fetch();

        let response = app(&store, Some("s3cret"))
            .oneshot(cron("/api/cron/notification-events?secret=s3cret", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await["error"], "failed_to_fetch_events");
    }

    #[tokio::test]
    async fn test_manual_trigger_requires_bearer() {
        let store = Arc::new(InMemoryStore::new());
        let request = Request::builder()
            .method("POST")
            .uri("/api/notification-events/process")
            .body(Body::empty())
            .unwrap();

        let response = app(&store, None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("POST")
            .uri("/api/notification-events/process")
            .header("Authorization", bearer(&Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let response = app(&store, None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_enqueue_records_caller_as_actor() {
        let store = Arc::new(InMemoryStore::new());
        let caller = Uuid::new_v4();
        let author = Uuid::new_v4();

        let request = Request::builder()
            .method("POST")
            .uri("/api/notification-events")
            .header("Authorization", bearer(&caller))
            .header("Content-Type", "application/json")
            .body(Body::from(
                json!({
                    "event_type": "like",
                    "recipient_id": author,
                    "article_id": 3,
                    "payload": {"article_title": "On Ink", "article_slug": "on-ink"}
                })
                .to_string(),
            ))
            .unwrap();

        let response = app(&store, None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = read_json(response).await;
        assert_eq!(body["queued"], true);

        let id = body["event_id"].as_i64().unwrap();
        let event = store.event(id);
        assert_eq!(event.actor_id, Some(caller));
        assert_eq!(event.recipient_id, author);
        assert_eq!(event.event_type, EventType::Like);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_incomplete_payload() {
        let store = Arc::new(InMemoryStore::new());
        let request = Request::builder()
            .method("POST")
            .uri("/api/notification-events")
            .header("Authorization", bearer(&Uuid::new_v4()))
            .header("Content-Type", "application/json")
            .body(Body::from(
                json!({"event_type": "comment", "recipient_id": Uuid::new_v4(), "payload": {}})
                    .to_string(),
            ))
            .unwrap();

        let response = app(&store, None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_settings_page_seeds_then_saves() {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        let authorization = bearer(&owner);

        let request = Request::builder()
            .uri("/api/settings/notifications")
            .header("Authorization", authorization.as_str())
            .body(Body::empty())
            .unwrap();
        let response = app(&store, None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            read_json(response).await,
            json!({"pref_email": false, "on_publish": true, "on_comment": true, "on_like": false, "on_follow": true})
        );

        let request = Request::builder()
            .method("PUT")
            .uri("/api/settings/notifications")
            .header("Authorization", authorization.as_str())
            .header("Content-Type", "application/json")
            .body(Body::from(
                json!({"pref_email": true, "on_publish": true, "on_comment": false, "on_like": true, "on_follow": true})
                    .to_string(),
            ))
            .unwrap();
        let response = app(&store, None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let saved = crate::notification::store::PreferenceStore::find_settings(
            store.as_ref(),
            owner,
        )
        .await
        .unwrap()
        .unwrap();
        assert!(saved.pref_email);
        assert!(!saved.on_comment);
    }
}
