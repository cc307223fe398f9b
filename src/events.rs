//! Notifications for UI feedback.
//!
//! The client publishes two kinds of events: a connection error (the backend
//! is unreachable or misconfigured) and a retry attempt (a transient failure
//! is being retried after a delay). UI code subscribes and renders banners or
//! toasts; the client never waits for, or depends on, any subscriber.

use crate::classify::ErrorKind;
use serde::Serialize;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast::{self, error::RecvError};

/// Name of an event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    ConnectionError,
    RetryAttempted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ConnectionError => "connection-error",
            EventKind::RetryAttempted => "retry-attempted",
        }
    }
}

/// The backend could not be reached, or answered like a misconfigured gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: SystemTime,
    pub path: String,
}

/// A failed attempt is about to be retried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryAttemptedEvent {
    /// The attempt that failed (1-indexed).
    pub attempt: usize,
    pub max_attempts: usize,
    pub delay: Duration,
    pub path: String,
    /// HTTP status of the failed attempt, when there was one.
    pub status: Option<u16>,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    ConnectionError(ConnectionErrorEvent),
    RetryAttempted(RetryAttemptedEvent),
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::ConnectionError(_) => EventKind::ConnectionError,
            ClientEvent::RetryAttempted(_) => EventKind::RetryAttempted,
        }
    }
}

/// Fire-and-forget publisher backed by a `broadcast` channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<ClientEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            filter: None,
        }
    }

    /// Subscribe to a single event stream by name.
    pub fn subscribe_to(&self, kind: EventKind) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            filter: Some(kind),
        }
    }

    /// Emission is best-effort; with no subscribers the event is dropped.
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }
}

/// A receiving end of the notification stream.
pub struct EventSubscription {
    rx: broadcast::Receiver<ClientEvent>,
    filter: Option<EventKind>,
}

impl EventSubscription {
    /// Waits for the next matching event.
    ///
    /// Events missed because this subscriber lagged are skipped. Returns
    /// `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "notification subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    fn matches(&self, event: &ClientEvent) -> bool {
        self.filter.map_or(true, |kind| event.kind() == kind)
    }
}
