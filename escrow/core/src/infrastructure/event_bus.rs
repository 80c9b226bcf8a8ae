// Event Bus - Pub/Sub for Escrow Ledger Events
//
// In-memory event streaming over tokio broadcast channels. Notification
// delivery is a collaborator concern: publishing is fire-and-forget and a
// failed send never rolls back the ledger transaction that produced it.
//
// Services publish after their session commits, so subscribers only ever
// observe durable state.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::EscrowEvent;
use crate::domain::ids::AppId;

/// Event bus for publishing and subscribing to escrow events
#[derive(Clone)]
pub struct EscrowEventBus {
    sender: Arc<broadcast::Sender<EscrowEvent>>,
}

impl EscrowEventBus {
    /// Create a new event bus with the given channel capacity. Capacity
    /// bounds how many events a slow subscriber can fall behind before old
    /// ones are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create an event bus with default capacity (256)
    pub fn with_default_capacity() -> Self {
        Self::new(256)
    }

    /// Publish an event to all subscribers, best-effort
    pub fn publish(&self, event: EscrowEvent) {
        debug!("Publishing event: {:?}", event);

        // send() returns the number of receivers that got the message
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all escrow events
    pub fn subscribe(&self) -> EventReceiver {
        let receiver = self.sender.subscribe();
        EventReceiver { receiver }
    }

    /// Subscribe filtered to a single app's funding round
    pub fn subscribe_app(&self, app_id: AppId) -> AppEventReceiver {
        let receiver = self.sender.subscribe();
        AppEventReceiver { receiver, app_id }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EscrowEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for all escrow events
pub struct EventReceiver {
    receiver: broadcast::Receiver<EscrowEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<EscrowEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<EscrowEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one app's events
pub struct AppEventReceiver {
    receiver: broadcast::Receiver<EscrowEvent>,
    app_id: AppId,
}

impl AppEventReceiver {
    /// Receive the next event belonging to the subscribed app, skipping
    /// events from other funding rounds.
    pub async fn recv(&mut self) -> Result<EscrowEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;

            if event.app_id() == self.app_id {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_event_bus_publish_subscribe() {
        let bus = EscrowEventBus::new(10);
        let mut receiver = bus.subscribe();

        let app_id = AppId::new();
        bus.publish(EscrowEvent::AppFullyFunded {
            app_id,
            total_invested: "10000.00".parse().unwrap(),
            funded_at: Utc::now(),
        });

        let received = tokio_test::block_on(receiver.recv()).unwrap();
        match received {
            EscrowEvent::AppFullyFunded { app_id: id, .. } => assert_eq!(id, app_id),
            _ => panic!("Wrong event type received"),
        }
    }

    #[test]
    fn test_app_event_filtering() {
        let bus = EscrowEventBus::new(10);
        let app_id = AppId::new();
        let other_app_id = AppId::new();

        let mut receiver = bus.subscribe_app(app_id);

        // event for a different app is filtered out
        bus.publish(EscrowEvent::MilestoneVerificationRequested {
            app_id: other_app_id,
            milestone_id: crate::domain::ids::MilestoneId::new(),
            requested_at: Utc::now(),
        });

        bus.publish(EscrowEvent::AppFullyFunded {
            app_id,
            total_invested: "500.00".parse().unwrap(),
            funded_at: Utc::now(),
        });

        let received = tokio_test::block_on(receiver.recv()).unwrap();
        assert_eq!(received.app_id(), app_id);
    }

    #[test]
    fn test_multiple_subscribers() {
        let bus = EscrowEventBus::new(10);
        let mut receiver1 = bus.subscribe();
        let mut receiver2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(EscrowEvent::AppFullyFunded {
            app_id: AppId::new(),
            total_invested: "1.00".parse().unwrap(),
            funded_at: Utc::now(),
        });

        let _ = tokio_test::block_on(receiver1.recv()).unwrap();
        let _ = tokio_test::block_on(receiver2.recv()).unwrap();
    }
}
