use crate::cache::redis::RunLock;
use crate::notification::contacts::ContactResolver;
use crate::notification::delivery::{DeliveryOutcome, EmailChannel, OutgoingEmail};
use crate::notification::model::{
    DeliveryStatus, EventStatus, FailedEvent, NewNotificationDelivery, NotificationError,
    NotificationEvent, ProcessSummary, EMAIL_CHANNEL, REASON_EMAIL_DISABLED, REASON_EMAIL_FAILED,
    REASON_EVENT_DISABLED, REASON_NO_EMAIL, REASON_UNKNOWN,
};
use crate::notification::preferences::PreferenceResolver;
use crate::notification::render::ContentRenderer;
use crate::notification::store::{ContactDirectory, EventStore};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Maximum number of events pulled per invocation
pub const BATCH_SIZE: i64 = 50;

/// Calls per event that run under their own timeout: preferences, contact,
/// actor name, send, delivery audit and the status write.
const TIMED_CALLS_PER_EVENT: u32 = 6;

/// Delivery error recorded when the channel does not answer in time.
pub const REASON_DELIVERY_TIMEOUT: &str = "delivery_timeout";

/// Terminal result of handling one event
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Completed,
    Skipped(String),
    Failed(String),
}

impl From<Outcome> for EventStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Completed => EventStatus::Completed,
            Outcome::Skipped(reason) => EventStatus::Skipped(reason),
            Outcome::Failed(reason) => EventStatus::Failed(reason),
        }
    }
}

/// Drains pending notification events and delivers them by email.
///
/// Safe to invoke repeatedly and concurrently: only `pending` events are
/// fetched and each status write is conditional on the event still being
/// pending. Overlapping runs may still both send the same event once.
pub struct NotificationProcessor {
    events: Arc<dyn EventStore>,
    preferences: PreferenceResolver,
    directory: Arc<dyn ContactDirectory>,
    renderer: ContentRenderer,
    channel: Arc<dyn EmailChannel>,
    lock: Option<Arc<dyn RunLock>>,
    call_timeout: Duration,
}

impl NotificationProcessor {
    pub fn new(
        events: Arc<dyn EventStore>,
        preferences: PreferenceResolver,
        directory: Arc<dyn ContactDirectory>,
        renderer: ContentRenderer,
        channel: Arc<dyn EmailChannel>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            events,
            preferences,
            directory,
            renderer,
            channel,
            lock: None,
            call_timeout,
        }
    }

    /// Upper bound on one run when every call takes its full timeout, plus
    /// the batch fetch. Used as the run lock TTL.
    pub fn max_run_time(call_timeout: Duration) -> Duration {
        call_timeout * (1 + BATCH_SIZE as u32 * TIMED_CALLS_PER_EVENT)
    }

    /// Serialise runs through a lock.
    pub fn with_lock(mut self, lock: Arc<dyn RunLock>) -> Self {
        info!("Processor runs serialised through a lock (ttl {:?})", lock.ttl());
        self.lock = Some(lock);
        self
    }

    /// Process up to [`BATCH_SIZE`] pending events.
    ///
    /// Only a failure to fetch the batch is returned as an error; every
    /// per-event problem is recorded on the event and listed in the summary.
    pub async fn process_pending_events(&self) -> Result<ProcessSummary, NotificationError> {
        let Some(lock) = &self.lock else {
            return self.run_batch().await;
        };

        let token = match lock.try_acquire().await {
            Ok(Some(token)) => Some(token),
            Ok(None) => {
                info!("Another notification run holds the lock");
                return Ok(ProcessSummary::run_in_progress());
            }
            Err(e) => {
                warn!("Processor lock unavailable, running unlocked: {}", e);
                None
            }
        };

        let result = self.run_batch().await;

        if let Some(token) = token {
            match lock.release(token).await {
                Ok(true) => {}
                Ok(false) => warn!("Processor lock expired before the run finished"),
                Err(e) => warn!("Failed to release processor lock: {}", e),
            }
        }

        result
    }

    async fn run_batch(&self) -> Result<ProcessSummary, NotificationError> {
        let events = self
            .with_timeout("pending events", self.events.fetch_pending_batch(BATCH_SIZE))
            .await
            .map_err(|e| {
                error!("Error fetching notification events: {}", e);
                NotificationError::FailedToFetchEvents(Box::new(e))
            })?;

        if events.is_empty() {
            info!("No pending notification events");
            return Ok(ProcessSummary::no_pending_events());
        }

        info!("Processing {} notification events", events.len());

        let mut contacts = ContactResolver::new(self.directory.as_ref());
        let mut summary = ProcessSummary {
            total: events.len(),
            ..Default::default()
        };

        for event in &events {
            if !event.status.is_pending() {
                warn!(
                    "Ignoring event {} fetched with terminal status {}",
                    event.id,
                    event.status.as_str()
                );
                continue;
            }

            let outcome = match self.handle_event(event, &mut contacts).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Error processing notification event {}: {}", event.id, e);
                    Outcome::Failed(failure_reason(&e))
                }
            };

            let status = EventStatus::from(outcome.clone());
            match self
                .with_timeout(
                    "event status update",
                    self.events.mark_status(event.id, &status, Utc::now()),
                )
                .await
            {
                Ok(true) => {}
                Ok(false) => warn!("Event {} was no longer pending at status write", event.id),
                Err(e) => error!("Failed to record status of event {}: {}", event.id, e),
            }

            info!(
                event_id = event.id,
                event_type = %event.event_type,
                status = status.as_str(),
                reason = status.reason().unwrap_or(""),
                "Notification event handled"
            );

            match outcome {
                Outcome::Completed => summary.processed += 1,
                Outcome::Skipped(_) => summary.skipped += 1,
                Outcome::Failed(reason) => summary.failed.push(FailedEvent {
                    id: event.id,
                    reason,
                }),
            }
        }

        info!(
            "Notification run finished: {} sent, {} skipped, {} failed of {}",
            summary.processed,
            summary.skipped,
            summary.failed.len(),
            summary.total
        );

        Ok(summary)
    }

    async fn handle_event(
        &self,
        event: &NotificationEvent,
        contacts: &mut ContactResolver<'_>,
    ) -> Result<Outcome, NotificationError> {
        let settings = self
            .with_timeout(
                "notification settings",
                self.preferences.get_settings(event.recipient_id),
            )
            .await?;

        // Two separate gates so the skip reason tells which switch was off.
        if !settings.allows(&event.event_type) {
            return Ok(Outcome::Skipped(REASON_EVENT_DISABLED.to_string()));
        }
        if !settings.pref_email {
            return Ok(Outcome::Skipped(REASON_EMAIL_DISABLED.to_string()));
        }

        let recipient = self
            .with_timeout(
                "recipient contact",
                contacts.resolve_contact(event.recipient_id),
            )
            .await?;
        let actor_name = self
            .with_timeout("actor name", contacts.resolve_display_name(event.actor_id))
            .await?;

        // Rendered before the email check so the audit trail covers both paths.
        let content = self
            .renderer
            .render(event, &recipient, actor_name.as_deref())?;

        let Some(destination) = recipient.email else {
            self.record_delivery(NewNotificationDelivery {
                event_id: event.id,
                channel: EMAIL_CHANNEL,
                destination: None,
                status: DeliveryStatus::Failed,
                error: Some(REASON_NO_EMAIL.to_string()),
                sent_at: None,
            })
            .await;
            return Ok(Outcome::Failed(REASON_NO_EMAIL.to_string()));
        };

        let email = OutgoingEmail {
            to: destination.clone(),
            subject: content.subject,
            text: content.text,
            html: content.html,
        };
        debug!("Sending event {} via {}", event.id, self.channel.name());
        let delivery = tokio::time::timeout(self.call_timeout, self.channel.send(&email))
            .await
            .unwrap_or_else(|_| DeliveryOutcome::failed(REASON_DELIVERY_TIMEOUT));

        self.record_delivery(NewNotificationDelivery {
            event_id: event.id,
            channel: EMAIL_CHANNEL,
            destination: Some(destination),
            status: if delivery.success {
                DeliveryStatus::Sent
            } else {
                DeliveryStatus::Failed
            },
            error: delivery.error.clone(),
            sent_at: delivery.success.then(Utc::now),
        })
        .await;

        if delivery.success {
            Ok(Outcome::Completed)
        } else {
            Ok(Outcome::Failed(
                delivery
                    .error
                    .unwrap_or_else(|| REASON_EMAIL_FAILED.to_string()),
            ))
        }
    }

    /// Audit rows are best effort; the event status still reflects the send.
    async fn record_delivery(&self, delivery: NewNotificationDelivery) {
        let event_id = delivery.event_id;
        if let Err(e) = self
            .with_timeout("delivery audit", self.events.record_delivery(delivery))
            .await
        {
            error!("Failed to record delivery for event {}: {}", event_id, e);
        }
    }

    async fn with_timeout<T, F>(&self, what: &'static str, call: F) -> Result<T, NotificationError>
    where
        F: Future<Output = Result<T, NotificationError>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| NotificationError::Timeout(what))?
    }
}

fn failure_reason(error: &NotificationError) -> String {
    let message = error.to_string();
    if message.is_empty() {
        REASON_UNKNOWN.to_string()
    } else {
        message
    }
}
