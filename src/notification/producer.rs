use crate::notification::model::{
    EnqueueEventRequest, EventType, NewNotificationEvent, NotificationError,
};
use crate::notification::store::{EventStore, SubscriberStore};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Comment excerpts are cut to this many characters before queueing.
pub const COMMENT_EXCERPT_LENGTH: usize = 180;

/// Appends notification events on behalf of application actions.
#[derive(Clone)]
pub struct EventProducer {
    events: Arc<dyn EventStore>,
    subscribers: Arc<dyn SubscriberStore>,
}

impl EventProducer {
    pub fn new(events: Arc<dyn EventStore>, subscribers: Arc<dyn SubscriberStore>) -> Self {
        Self {
            events,
            subscribers,
        }
    }

    /// Queue a follow, like or comment performed by `actor_id`.
    ///
    /// Returns `None` when the actor would notify themselves; nothing is
    /// queued in that case.
    pub async fn enqueue_activity(
        &self,
        actor_id: Uuid,
        request: EnqueueEventRequest,
    ) -> Result<Option<i64>, NotificationError> {
        let payload = match &request.event_type {
            EventType::Follow => Value::Object(Map::new()),
            EventType::Like => {
                let mut fields = payload_object(request.payload)?;
                require_text(&fields, &["article_title", "article_slug"])?;
                fields.retain(|key, _| key == "article_title" || key == "article_slug");
                Value::Object(fields)
            }
            EventType::Comment => {
                let mut fields = payload_object(request.payload)?;
                require_text(&fields, &["article_title", "article_slug", "comment_excerpt"])?;
                if let Some(Value::String(excerpt)) = fields.get_mut("comment_excerpt") {
                    *excerpt = truncate_excerpt(excerpt);
                }
                Value::Object(fields)
            }
            EventType::Publish => {
                return Err(NotificationError::ValidationError(
                    "publish events are queued by article approval".to_string(),
                ))
            }
            EventType::Other(kind) => {
                return Err(NotificationError::ValidationError(format!(
                    "Unsupported event type: {}",
                    kind
                )))
            }
        };

        if actor_id == request.recipient_id {
            debug!(
                "Dropping {} notification from {} to themselves",
                request.event_type, actor_id
            );
            return Ok(None);
        }

        let id = self
            .events
            .enqueue(NewNotificationEvent {
                event_type: request.event_type,
                actor_id: Some(actor_id),
                recipient_id: request.recipient_id,
                article_id: request.article_id,
                payload,
            })
            .await?;

        Ok(Some(id))
    }

    /// Queue one `publish` event for every follower of the author who asked
    /// to hear about new articles.
    pub async fn fan_out_publish(
        &self,
        author_id: Uuid,
        article_id: i64,
        article_title: &str,
        article_slug: &str,
    ) -> Result<Vec<i64>, NotificationError> {
        let followers = self.subscribers.publish_subscribers(author_id).await?;
        let events: Vec<NewNotificationEvent> = followers
            .into_iter()
            .filter(|follower| *follower != author_id)
            .map(|follower| NewNotificationEvent {
                event_type: EventType::Publish,
                actor_id: Some(author_id),
                recipient_id: follower,
                article_id: Some(article_id),
                payload: json!({
                    "article_title": article_title,
                    "article_slug": article_slug,
                }),
            })
            .collect();

        if events.is_empty() {
            debug!("Article {} has no publish subscribers", article_id);
            return Ok(Vec::new());
        }

        let ids = self.events.enqueue_many(events).await?;
        info!(
            "Queued {} publish notifications for article {}",
            ids.len(),
            article_id
        );
        Ok(ids)
    }
}

fn payload_object(payload: Value) -> Result<Map<String, Value>, NotificationError> {
    match payload {
        Value::Object(fields) => Ok(fields),
        Value::Null => Ok(Map::new()),
        _ => Err(NotificationError::ValidationError(
            "payload must be an object".to_string(),
        )),
    }
}

fn require_text(fields: &Map<String, Value>, required: &[&str]) -> Result<(), NotificationError> {
    for field in required {
        match fields.get(*field) {
            Some(Value::String(value)) if !value.trim().is_empty() => {}
            _ => {
                return Err(NotificationError::ValidationError(format!(
                    "payload.{} is required",
                    field
                )))
            }
        }
    }
    Ok(())
}

fn truncate_excerpt(excerpt: &str) -> String {
    excerpt.chars().take(COMMENT_EXCERPT_LENGTH).collect()
}
