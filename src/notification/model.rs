use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Skip reason when the recipient turned this event type off.
pub const REASON_EVENT_DISABLED: &str = "event_disabled";
/// Skip reason when the recipient has not opted in to email.
pub const REASON_EMAIL_DISABLED: &str = "email_disabled";
/// Failure reason when the identity provider has no address on file.
pub const REASON_NO_EMAIL: &str = "no_email_on_file";
/// Failure reason when the channel reports failure without a message.
pub const REASON_EMAIL_FAILED: &str = "email_failed";
/// Failure reason for a caught error that carried no message.
pub const REASON_UNKNOWN: &str = "unknown";

pub const EMAIL_CHANNEL: &str = "email";

/// Kind of activity a notification event describes.
///
/// Unrecognised kinds are kept as `Other` so that newer producers can enqueue
/// events before this service learns about them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Publish,
    Comment,
    Like,
    Follow,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Publish => "publish",
            EventType::Comment => "comment",
            EventType::Like => "like",
            EventType::Follow => "follow",
            EventType::Other(kind) => kind.as_str(),
        }
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        match value {
            "publish" => EventType::Publish,
            "comment" => EventType::Comment,
            "like" => EventType::Like,
            "follow" => EventType::Follow,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        EventType::from(value.as_str())
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an event. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStatus {
    Pending,
    Completed,
    Failed(String),
    Skipped(String),
}

impl EventStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, EventStatus::Pending)
    }

    /// Column value of the `status` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Completed => "completed",
            EventStatus::Failed(_) => "failed",
            EventStatus::Skipped(_) => "skipped",
        }
    }

    /// Column value of the `error` field.
    pub fn reason(&self) -> Option<&str> {
        match self {
            EventStatus::Failed(reason) | EventStatus::Skipped(reason) => Some(reason.as_str()),
            EventStatus::Pending | EventStatus::Completed => None,
        }
    }

    /// Rebuild a status from its stored columns.
    pub fn from_columns(status: &str, error: Option<String>) -> Result<Self, NotificationError> {
        match status {
            "pending" => Ok(EventStatus::Pending),
            "completed" => Ok(EventStatus::Completed),
            "failed" => Ok(EventStatus::Failed(
                error.unwrap_or_else(|| REASON_UNKNOWN.to_string()),
            )),
            "skipped" => Ok(EventStatus::Skipped(
                error.unwrap_or_else(|| REASON_UNKNOWN.to_string()),
            )),
            other => Err(NotificationError::InternalError(format!(
                "Unknown event status: {}",
                other
            ))),
        }
    }
}

/// Database row of `notification_events`
#[derive(Debug, FromRow, Clone)]
pub struct NotificationEventRow {
    pub id: i64,
    pub event_type: String,
    pub actor_id: Option<Uuid>,
    pub recipient_id: Uuid,
    pub article_id: Option<i64>,
    pub payload: Option<sqlx::types::Json<Value>>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// A queued notification event
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub id: i64,
    pub event_type: EventType,
    pub actor_id: Option<Uuid>,
    pub recipient_id: Uuid,
    pub article_id: Option<i64>,
    pub payload: Value,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationEventRow> for NotificationEvent {
    type Error = NotificationError;

    fn try_from(row: NotificationEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            event_type: EventType::from(row.event_type),
            actor_id: row.actor_id,
            recipient_id: row.recipient_id,
            article_id: row.article_id,
            payload: row.payload.map(|json| json.0).unwrap_or(Value::Null),
            status: EventStatus::from_columns(&row.status, row.error)?,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

/// Producer-side input; the store assigns id, status and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotificationEvent {
    pub event_type: EventType,
    pub actor_id: Option<Uuid>,
    pub recipient_id: Uuid,
    pub article_id: Option<i64>,
    pub payload: Value,
}

/// Per-recipient opt-in settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationSettings {
    /// Master switch for the email channel
    #[schema(example = "true")]
    pub pref_email: bool,
    #[schema(example = "true")]
    pub on_publish: bool,
    #[schema(example = "true")]
    pub on_comment: bool,
    #[schema(example = "false")]
    pub on_like: bool,
    #[schema(example = "true")]
    pub on_follow: bool,
}

impl Default for NotificationSettings {
    /// Email stays off until the recipient opts in; event kinds default mostly on.
    fn default() -> Self {
        Self {
            pref_email: false,
            on_publish: true,
            on_comment: true,
            on_like: false,
            on_follow: true,
        }
    }
}

impl NotificationSettings {
    /// Whether the recipient wants this kind of event at all.
    ///
    /// Unknown kinds are allowed so that new producers are not silently muted;
    /// the email master switch still applies to them.
    pub fn allows(&self, event_type: &EventType) -> bool {
        match event_type {
            EventType::Publish => self.on_publish,
            EventType::Comment => self.on_comment,
            EventType::Like => self.on_like,
            EventType::Follow => self.on_follow,
            EventType::Other(_) => true,
        }
    }
}

/// Database row of `profile_notification_settings`; columns are nullable.
#[derive(Debug, FromRow, Clone)]
pub struct NotificationSettingsRow {
    pub pref_email: Option<bool>,
    pub on_publish: Option<bool>,
    pub on_comment: Option<bool>,
    pub on_like: Option<bool>,
    pub on_follow: Option<bool>,
}

impl From<NotificationSettingsRow> for NotificationSettings {
    fn from(row: NotificationSettingsRow) -> Self {
        let defaults = NotificationSettings::default();
        Self {
            pref_email: row.pref_email.unwrap_or(defaults.pref_email),
            on_publish: row.on_publish.unwrap_or(defaults.on_publish),
            on_comment: row.on_comment.unwrap_or(defaults.on_comment),
            on_like: row.on_like.unwrap_or(defaults.on_like),
            on_follow: row.on_follow.unwrap_or(defaults.on_follow),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

/// One row of the append-only delivery audit log
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotificationDelivery {
    pub event_id: i64,
    pub channel: &'static str,
    pub destination: Option<String>,
    pub status: DeliveryStatus,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Resolved contact details of a recipient
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientContact {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Identity-provider record of a user
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct IdentityRecord {
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FailedEvent {
    #[schema(example = "42")]
    pub id: i64,
    #[schema(example = "no_email_on_file")]
    pub reason: String,
}

/// Result of one processor invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProcessSummary {
    /// Events delivered successfully
    #[schema(example = "3")]
    pub processed: usize,
    pub failed: Vec<FailedEvent>,
    #[schema(example = "1")]
    pub skipped: usize,
    /// Size of the fetched batch
    #[schema(example = "5")]
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "no_pending_events")]
    pub message: Option<String>,
}

impl ProcessSummary {
    pub fn no_pending_events() -> Self {
        Self {
            message: Some("no_pending_events".to_string()),
            ..Default::default()
        }
    }

    pub fn run_in_progress() -> Self {
        Self {
            message: Some("run_in_progress".to_string()),
            ..Default::default()
        }
    }
}

/// Request to enqueue a notification on behalf of the caller
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct EnqueueEventRequest {
    #[schema(value_type = String, example = "comment")]
    pub event_type: EventType,

    #[schema(value_type = UuidWrapper)]
    pub recipient_id: Uuid,

    #[schema(example = "12")]
    pub article_id: Option<i64>,

    /// Event-specific context (article_title, article_slug, comment_excerpt)
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EnqueueEventResponse {
    /// Id of the queued event, absent when nothing was queued
    #[schema(example = "101")]
    pub event_id: Option<i64>,
    #[schema(example = "true")]
    pub queued: bool,
}

/// Possible notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("failed_to_fetch_events")]
    FailedToFetchEvents(#[source] Box<NotificationError>),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not authorized to perform this action")]
    Unauthorized,

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Error response for the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationErrorResponse {
    #[schema(example = "failed_to_fetch_events")]
    pub error: String,

    #[schema(example = "INTERNAL_ERROR")]
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_round_trips_through_strings() {
        assert_eq!(EventType::from("comment"), EventType::Comment);
        assert_eq!(
            EventType::from("digest"),
            EventType::Other("digest".to_string())
        );
        assert_eq!(String::from(EventType::Follow), "follow");

        let parsed: EventType = serde_json::from_value(json!("like")).unwrap();
        assert_eq!(parsed, EventType::Like);
        assert_eq!(serde_json::to_value(EventType::Publish).unwrap(), json!("publish"));
    }

    #[test]
    fn test_default_settings_keep_email_off() {
        let settings = NotificationSettings::default();
        assert!(!settings.pref_email);
        assert!(settings.on_publish);
        assert!(settings.on_comment);
        assert!(!settings.on_like);
        assert!(settings.on_follow);
    }

    #[test]
    fn test_unknown_event_type_is_allowed() {
        let settings = NotificationSettings {
            on_publish: false,
            on_comment: false,
            on_like: false,
            on_follow: false,
            pref_email: true,
        };
        assert!(settings.allows(&EventType::Other("digest".to_string())));
        assert!(!settings.allows(&EventType::Like));
    }

    #[test]
    fn test_null_columns_fall_back_per_flag() {
        let row = NotificationSettingsRow {
            pref_email: Some(true),
            on_publish: None,
            on_comment: Some(false),
            on_like: None,
            on_follow: None,
        };
        let settings = NotificationSettings::from(row);
        assert!(settings.pref_email);
        assert!(settings.on_publish);
        assert!(!settings.on_comment);
        assert!(!settings.on_like);
        assert!(settings.on_follow);
    }

    #[test]
    fn test_status_columns() {
        let skipped = EventStatus::Skipped(REASON_EMAIL_DISABLED.to_string());
        assert_eq!(skipped.as_str(), "skipped");
        assert_eq!(skipped.reason(), Some("email_disabled"));
        assert_eq!(EventStatus::Completed.reason(), None);

        let restored = EventStatus::from_columns("failed", Some("boom".to_string())).unwrap();
        assert_eq!(restored, EventStatus::Failed("boom".to_string()));
        assert!(EventStatus::from_columns("in_progress", None).is_err());
    }

    #[test]
    fn test_empty_summary_serialization() {
        let value = serde_json::to_value(ProcessSummary::no_pending_events()).unwrap();
        assert_eq!(
            value,
            json!({
                "processed": 0,
                "failed": [],
                "skipped": 0,
                "total": 0,
                "message": "no_pending_events"
            })
        );

        let without_message = serde_json::to_value(ProcessSummary::default()).unwrap();
        assert!(without_message.get("message").is_none());
    }
}
