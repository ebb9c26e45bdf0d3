//! In-memory stand-ins for the notification storage traits and the email
//! channel, used by the processor, producer and review tests.

use crate::notification::delivery::{DeliveryOutcome, EmailChannel, OutgoingEmail};
use crate::notification::model::{
    EventStatus, IdentityRecord, NewNotificationDelivery, NewNotificationEvent,
    NotificationError, NotificationEvent, NotificationSettings,
};
use crate::notification::store::{ContactDirectory, EventStore, PreferenceStore, SubscriberStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    events: Mutex<Vec<NotificationEvent>>,
    deliveries: Mutex<Vec<NewNotificationDelivery>>,
    settings: Mutex<HashMap<Uuid, NotificationSettings>>,
    profile_names: Mutex<HashMap<Uuid, String>>,
    identities: Mutex<HashMap<Uuid, IdentityRecord>>,
    follows: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    identity_lookups: AtomicUsize,
    fail_fetch: Mutex<bool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_settings(&self, profile_id: Uuid, settings: NotificationSettings) {
        self.settings.lock().unwrap().insert(profile_id, settings);
    }

    /// Register a user with a profile name and, optionally, an email on file.
    pub fn add_user(&self, profile_id: Uuid, name: &str, email: Option<&str>) {
        self.profile_names
            .lock()
            .unwrap()
            .insert(profile_id, name.to_string());
        self.identities.lock().unwrap().insert(
            profile_id,
            IdentityRecord {
                email: email.map(str::to_string),
                full_name: None,
            },
        );
    }

    pub fn add_follower(&self, author_id: Uuid, follower_id: Uuid) {
        self.follows
            .lock()
            .unwrap()
            .entry(author_id)
            .or_default()
            .push(follower_id);
    }

    pub fn fail_next_fetch(&self) {
        *self.fail_fetch.lock().unwrap() = true;
    }

    pub fn event(&self, id: i64) -> NotificationEvent {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|event| event.id == id)
            .cloned()
            .expect("event exists")
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn deliveries(&self) -> Vec<NewNotificationDelivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn deliveries_for(&self, event_id: i64) -> Vec<NewNotificationDelivery> {
        self.deliveries()
            .into_iter()
            .filter(|delivery| delivery.event_id == event_id)
            .collect()
    }

    pub fn identity_lookups(&self) -> usize {
        self.identity_lookups.load(Ordering::SeqCst)
    }

    fn insert(&self, event: NewNotificationEvent) -> i64 {
        let mut events = self.events.lock().unwrap();
        let id = events.len() as i64 + 1;
        // Strictly increasing timestamps keep FIFO order deterministic.
        let created_at: DateTime<Utc> = Utc::now() + Duration::milliseconds(id);
        events.push(NotificationEvent {
            id,
            event_type: event.event_type,
            actor_id: event.actor_id,
            recipient_id: event.recipient_id,
            article_id: event.article_id,
            payload: event.payload,
            status: EventStatus::Pending,
            created_at,
            processed_at: None,
        });
        id
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn enqueue(&self, event: NewNotificationEvent) -> Result<i64, NotificationError> {
        Ok(self.insert(event))
    }

    async fn enqueue_many(
        &self,
        events: Vec<NewNotificationEvent>,
    ) -> Result<Vec<i64>, NotificationError> {
        Ok(events.into_iter().map(|event| self.insert(event)).collect())
    }

    async fn fetch_pending_batch(
        &self,
        limit: i64,
    ) -> Result<Vec<NotificationEvent>, NotificationError> {
        let mut fail = self.fail_fetch.lock().unwrap();
        if *fail {
            *fail = false;
            return Err(NotificationError::InternalError(
                "connection refused".to_string(),
            ));
        }

        let mut pending: Vec<NotificationEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.status.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|event| event.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn mark_status(
        &self,
        id: i64,
        status: &EventStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<bool, NotificationError> {
        let mut events = self.events.lock().unwrap();
        match events
            .iter_mut()
            .find(|event| event.id == id && event.status.is_pending())
        {
            Some(event) => {
                event.status = status.clone();
                event.processed_at = Some(processed_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_delivery(
        &self,
        delivery: NewNotificationDelivery,
    ) -> Result<i64, NotificationError> {
        let mut deliveries = self.deliveries.lock().unwrap();
        deliveries.push(delivery);
        Ok(deliveries.len() as i64)
    }
}

#[async_trait]
impl PreferenceStore for InMemoryStore {
    async fn find_settings(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<NotificationSettings>, NotificationError> {
        Ok(self.settings.lock().unwrap().get(&profile_id).copied())
    }

    async fn upsert_settings(
        &self,
        profile_id: Uuid,
        settings: NotificationSettings,
    ) -> Result<(), NotificationError> {
        self.set_settings(profile_id, settings);
        Ok(())
    }
}

#[async_trait]
impl ContactDirectory for InMemoryStore {
    async fn profile_display_name(
        &self,
        profile_id: Uuid,
    ) -> Result<Option<String>, NotificationError> {
        Ok(self.profile_names.lock().unwrap().get(&profile_id).cloned())
    }

    async fn identity(&self, profile_id: Uuid) -> Result<Option<IdentityRecord>, NotificationError> {
        self.identity_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.identities.lock().unwrap().get(&profile_id).cloned())
    }
}

#[async_trait]
impl SubscriberStore for InMemoryStore {
    async fn publish_subscribers(&self, author_id: Uuid) -> Result<Vec<Uuid>, NotificationError> {
        Ok(self
            .follows
            .lock()
            .unwrap()
            .get(&author_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Channel that keeps every email it is asked to send.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<OutgoingEmail>>,
    failure: Option<String>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failure: Some(message.into()),
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailChannel for RecordingChannel {
    async fn send(&self, email: &OutgoingEmail) -> DeliveryOutcome {
        self.sent.lock().unwrap().push(email.clone());
        match &self.failure {
            Some(message) => DeliveryOutcome::failed(message.clone()),
            None => DeliveryOutcome::sent(),
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
