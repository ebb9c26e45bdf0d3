use crate::notification::model::{
    EventStatus, IdentityRecord, NewNotificationDelivery, NewNotificationEvent,
    NotificationError, NotificationEvent, NotificationEventRow, NotificationSettings,
    NotificationSettingsRow,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use sqlx::{PgPool, Row};
use tracing::{debug, error};
use uuid::Uuid;

/// Append side and status side of the event queue.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a single pending event.
    async fn enqueue(&self, event: NewNotificationEvent) -> Result<i64, NotificationError>;

    /// Insert several pending events at once.
    async fn enqueue_many(
        &self,
        events: Vec<NewNotificationEvent>,
    ) -> Result<Vec<i64>, NotificationError>;

    /// Oldest pending events first, at most `limit`.
    async fn fetch_pending_batch(
        &self,
        limit: i64,
    ) -> Result<Vec<NotificationEvent>, NotificationError>;

    /// Move a pending event to a terminal status. Returns false when the
    /// event was no longer pending and nothing was written.
    async fn mark_status(
        &self,
        id: i64,
        status: &EventStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<bool, NotificationError>;

    async fn record_delivery(
        &self,
        delivery: NewNotificationDelivery,
    ) -> Result<i64, NotificationError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn find_settings(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<NotificationSettings>, NotificationError>;

    async fn upsert_settings(
        &self,
        profile_id: Uuid,
        settings: NotificationSettings,
    ) -> Result<(), NotificationError>;
}

/// Read-only view of profiles and the identity provider.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn profile_display_name(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<String>, NotificationError>;

    async fn identity(&self, profile_id: Uuid) -> Result<Option<IdentityRecord>, NotificationError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Followers of `author_id` who asked to hear about new articles.
    async fn publish_subscribers(&self, author_id: Uuid) -> Result<Vec<Uuid>, NotificationError>;
}

/// Postgres-backed implementation of every notification storage trait
#[derive(Debug, Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgNotificationStore {
    async fn enqueue(&self, event: NewNotificationEvent) -> Result<i64, NotificationError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO notification_events (
                event_type, actor_id, recipient_id, article_id, payload, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING id
            "#,
        )
        .bind(event.event_type.as_str())
        .bind(event.actor_id)
        .bind(event.recipient_id)
        .bind(event.article_id)
        .bind(sqlx::types::Json(&event.payload))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to enqueue notification event: {}", e);
            NotificationError::DatabaseError(e)
        })?;

        debug!(
            "Enqueued {} event {} for recipient {}",
            event.event_type, id, event.recipient_id
        );
        Ok(id)
    }

    async fn enqueue_many(
        &self,
        events: Vec<NewNotificationEvent>,
    ) -> Result<Vec<i64>, NotificationError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            NotificationError::DatabaseError(e)
        })?;

        let now = Utc::now();
        let mut ids = Vec::with_capacity(events.len());
        for event in &events {
            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO notification_events (
                    event_type, actor_id, recipient_id, article_id, payload, status, created_at
                )
                VALUES ($1, $2, $3, $4, $5, 'pending', $6)
                RETURNING id
                "#,
            )
            .bind(event.event_type.as_str())
            .bind(event.actor_id)
            .bind(event.recipient_id)
            .bind(event.article_id)
            .bind(sqlx::types::Json(&event.payload))
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            NotificationError::DatabaseError(e)
        })?;

        Ok(ids)
    }

    async fn fetch_pending_batch(
        &self,
        limit: i64,
    ) -> Result<Vec<NotificationEvent>, NotificationError> {
        let rows = sqlx::query_as::<_, NotificationEventRow>(
            r#"
            SELECT id, event_type, actor_id, recipient_id, article_id, payload,
                   status, error, created_at, processed_at
            FROM notification_events
            WHERE status = 'pending'
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NotificationEvent::try_from).collect()
    }

    async fn mark_status(
        &self,
        id: i64,
        status: &EventStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<bool, NotificationError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_events
            SET status = $2, error = $3, processed_at = $4
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(status.reason())
        .bind(processed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_delivery(
        &self,
        delivery: NewNotificationDelivery,
    ) -> Result<i64, NotificationError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO notification_deliveries (
                event_id, channel, destination, status, error, sent_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(delivery.event_id)
        .bind(delivery.channel)
        .bind(&delivery.destination)
        .bind(delivery.status.as_str())
        .bind(&delivery.error)
        .bind(delivery.sent_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl PreferenceStore for PgNotificationStore {
    async fn find_settings(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<NotificationSettings>, NotificationError> {
        let row = sqlx::query_as::<_, NotificationSettingsRow>(
            r#"
            SELECT pref_email, on_publish, on_comment, on_like, on_follow
            FROM profile_notification_settings
            WHERE profile_id = $1
            "#,
        )
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(NotificationSettings::from))
    }

    async fn upsert_settings(
        &self,
        profile_id: Uuid,
        settings: NotificationSettings,
    ) -> Result<(), NotificationError> {
        sqlx::query(
            r#"
            INSERT INTO profile_notification_settings (
                profile_id, pref_email, on_publish, on_comment, on_like, on_follow, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (profile_id) DO UPDATE SET
                pref_email = EXCLUDED.pref_email,
                on_publish = EXCLUDED.on_publish,
                on_comment = EXCLUDED.on_comment,
                on_like = EXCLUDED.on_like,
                on_follow = EXCLUDED.on_follow,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(profile_id)
        .bind(settings.pref_email)
        .bind(settings.on_publish)
        .bind(settings.on_comment)
        .bind(settings.on_like)
        .bind(settings.on_follow)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ContactDirectory for PgNotificationStore {
    async fn profile_display_name(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<String>, NotificationError> {
        let row = sqlx::query("SELECT display_name FROM profiles WHERE id = $1")
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|row| row.get::<Option<String>, _>("display_name")))
    }

    async fn identity(&self, profile_id: Uuid) -> Result<Option<IdentityRecord>, NotificationError> {
        let record = sqlx::query_as::<_, IdentityRecord>(
            r#"
            SELECT email, raw_user_meta_data->>'full_name' AS full_name
            FROM auth.users
            WHERE id = $1
            "#,
        )
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

#[async_trait]
impl SubscriberStore for PgNotificationStore {
    async fn publish_subscribers(&self, author_id: Uuid) -> Result<Vec<Uuid>, NotificationError> {
        let followers = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT follower_id FROM profile_follows
            WHERE author_id = $1 AND notify_on_publish = true
            "#,
        )
        .bind(author_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(followers)
    }
}
