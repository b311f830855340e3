use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::domain::{Trip, TripId};
use super::pending::PendingDecision;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: String,
    pub trip_id: TripId,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(
        trip_id: TripId,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("notif-{}", Uuid::new_v4().simple()),
            trip_id,
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            timestamp,
        }
    }
}

/// Outbound delivery hook (mailer, queue, chat). Delivery is best-effort: the lifecycle
/// logs failures and never rolls back a committed transition because of them.
pub trait NotificationSink: Send + Sync {
    fn send(&self, event: NotificationEvent) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("notification outbox closed")]
    Closed,
}

/// Sink that only enqueues; an [`OutboxDispatcher`] performs the actual delivery.
#[derive(Debug, Clone)]
pub struct NotificationOutbox {
    sender: mpsc::UnboundedSender<NotificationEvent>,
}

impl NotificationOutbox {
    pub fn channel() -> (Self, OutboxDispatcher) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, OutboxDispatcher { receiver })
    }
}

impl NotificationSink for NotificationOutbox {
    fn send(&self, event: NotificationEvent) -> Result<(), NotificationError> {
        self.sender
            .send(event)
            .map_err(|_| NotificationError::Closed)
    }
}

/// Consumer side of the outbox.
#[derive(Debug)]
pub struct OutboxDispatcher {
    receiver: mpsc::UnboundedReceiver<NotificationEvent>,
}

impl OutboxDispatcher {
    /// Deliver events until every outbox handle is dropped. Returns the number of events
    /// the downstream sink accepted.
    pub async fn run<S>(mut self, sink: Arc<S>) -> usize
    where
        S: NotificationSink + ?Sized,
    {
        let mut delivered = 0;
        while let Some(event) = self.receiver.recv().await {
            let id = event.id.clone();
            match sink.send(event) {
                Ok(()) => {
                    delivered += 1;
                    debug!(notification_id = %id, "notification delivered");
                }
                Err(err) => warn!(notification_id = %id, error = %err, "notification delivery failed"),
            }
        }
        delivered
    }

    pub fn spawn<S>(self, sink: Arc<S>) -> JoinHandle<usize>
    where
        S: NotificationSink + ?Sized + 'static,
    {
        tokio::spawn(self.run(sink))
    }
}

pub(crate) fn approval_notice(
    trip: &Trip,
    to: &str,
    comment: Option<&str>,
    at: DateTime<Utc>,
) -> NotificationEvent {
    NotificationEvent::new(
        trip.id.clone(),
        to,
        format!("Your trip request to {} is approved", trip.destination),
        format!(
            "Hi {},\n\nYour trip to {} ({}) has been approved.\n\nComments: {}\n\nRegards",
            trip.requester,
            trip.destination,
            trip.date_span(),
            comment.unwrap_or("-")
        ),
        at,
    )
}

pub(crate) fn rejection_notice(
    trip: &Trip,
    to: &str,
    reason: &str,
    at: DateTime<Utc>,
) -> NotificationEvent {
    NotificationEvent::new(
        trip.id.clone(),
        to,
        format!("Your trip request to {} was rejected", trip.destination),
        format!(
            "Hi {},\n\nYour trip to {} ({}) has been rejected.\n\nReason: {}\n\nRegards",
            trip.requester,
            trip.destination,
            trip.date_span(),
            reason
        ),
        at,
    )
}

pub(crate) fn escalation_notice(
    trip: &Trip,
    decision: &PendingDecision,
    to: &str,
    note: Option<&str>,
    at: DateTime<Utc>,
) -> NotificationEvent {
    let findings = decision
        .hold_reasons()
        .iter()
        .map(|reason| format!("• {reason}"))
        .collect::<Vec<_>>()
        .join("\n");
    NotificationEvent::new(
        trip.id.clone(),
        to,
        format!(
            "Approval requested: {} trip to {}",
            trip.requester, trip.destination
        ),
        format!(
            "{} ({}) requested approval for a trip to {} ({}).\n\nRisk level: {}\n\nFindings:\n{}\n\nNote: {}",
            trip.requester,
            trip.department,
            trip.destination,
            trip.date_span(),
            decision.risk.level,
            findings,
            note.unwrap_or("-")
        ),
        at,
    )
}
