//! Notification hub
//!
//! Fan-out of findings and recovery transitions to any number of subscribers.
//! Delivery is best-effort with no replay: a subscriber only sees events
//! published after it subscribed, and a subscriber that falls behind the
//! channel capacity loses the oldest events.

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::monitor::types::{Finding, RecoveryState};

/// Subscription filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Findings,
    Recovery,
    All,
}

impl Topic {
    fn accepts(&self, event: &MonitorEvent) -> bool {
        match self {
            Topic::All => true,
            topic => *topic == event.topic(),
        }
    }
}

/// Domain event published by the monitor
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    FindingCreated(Finding),
    RecoveryChanged {
        active: bool,
        neutralized: usize,
        state: RecoveryState,
    },
}

impl MonitorEvent {
    pub fn topic(&self) -> Topic {
        match self {
            MonitorEvent::FindingCreated(_) => Topic::Findings,
            MonitorEvent::RecoveryChanged { .. } => Topic::Recovery,
        }
    }

    /// Event name used on the wire
    pub fn event_name(&self) -> &'static str {
        match self {
            MonitorEvent::FindingCreated(_) => "alert",
            MonitorEvent::RecoveryChanged { .. } => "recovery-mode",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            MonitorEvent::FindingCreated(finding) => {
                serde_json::to_value(finding).unwrap_or(Value::Null)
            }
            MonitorEvent::RecoveryChanged {
                active,
                neutralized,
                state,
            } => json!({
                "active": active,
                "neutralized": neutralized,
                "transitionCount": state.transition_count,
            }),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MonitorEvent::FindingCreated(finding) => finding.timestamp,
            MonitorEvent::RecoveryChanged { state, .. } => {
                state.last_transition_at.unwrap_or_else(Utc::now)
            }
        }
    }
}

/// Broadcaster backed by a single `tokio::sync::broadcast` channel
#[derive(Debug, Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<MonitorEvent>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let subscription = Subscription {
            id: Uuid::new_v4(),
            topic,
            receiver: self.sender.subscribe(),
        };
        debug!(subscription = %subscription.id, topic = ?topic, "Hub subscription opened");
        subscription
    }

    /// Deliver to every current subscriber. Never blocks; returns the number
    /// of receivers the event was queued for (0 when nobody listens).
    pub fn publish(&self, event: MonitorEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Handle for one subscriber. Dropping it detaches the subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    topic: Topic,
    receiver: broadcast::Receiver<MonitorEvent>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Next matching event; `None` once the hub is gone
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.topic.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        subscription = %self.id,
                        skipped,
                        "Subscriber lagged, oldest events dropped"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already queued
    pub fn try_recv(&mut self) -> Option<MonitorEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.topic.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(
                        subscription = %self.id,
                        skipped,
                        "Subscriber lagged, oldest events dropped"
                    );
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = MonitorEvent> + Send + Unpin {
        Box::pin(stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        }))
    }

    pub fn unsubscribe(self) {
        debug!(subscription = %self.id, "Hub subscription closed");
    }
}
