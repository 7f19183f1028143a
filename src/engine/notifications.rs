use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::error::AppError;
use crate::messaging::topology::GATEWAY_NOTIFICATIONS_QUEUE;
use crate::messaging::{Delivery, MessageHandler, SharedBroker};
use crate::models::message::{AmqpMessage, TripEventData};

/// Broker event addressed to one rider or driver, ready to push over a live
/// connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEvent {
    pub routing_key: String,
    pub owner_id: String,
    pub payload: Option<TripEventData>,
}

/// Gateway side of the exchange: fans commands and notifications out to
/// whichever connections are listening.
pub struct NotificationRelay {
    broker: SharedBroker,
    events_tx: broadcast::Sender<OutboundEvent>,
}

impl NotificationRelay {
    pub fn new(broker: SharedBroker, events_tx: broadcast::Sender<OutboundEvent>) -> Self {
        Self { broker, events_tx }
    }

    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<(), AppError> {
        info!(queue = GATEWAY_NOTIFICATIONS_QUEUE, "notification relay starting");
        let broker = self.broker.clone();
        broker
            .consume(GATEWAY_NOTIFICATIONS_QUEUE, self, shutdown)
            .await
    }
}

#[async_trait]
impl MessageHandler for NotificationRelay {
    async fn handle(&self, delivery: &Delivery) -> Result<(), AppError> {
        let message: AmqpMessage = serde_json::from_slice(&delivery.body)?;
        let payload = message
            .data
            .as_deref()
            .map(serde_json::from_slice::<TripEventData>)
            .transpose()?;

        let event = OutboundEvent {
            routing_key: delivery.routing_key.clone(),
            owner_id: message.owner_id,
            payload,
        };

        // No listener means nobody is connected for this owner right now.
        let listeners = self.events_tx.send(event).unwrap_or(0);
        debug!(routing_key = %delivery.routing_key, listeners, "notification relayed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast;

    use super::NotificationRelay;
    use crate::messaging::memory::InMemoryBroker;
    use crate::messaging::topology::{routing_keys, Topology};
    use crate::messaging::{Delivery, MessageHandler};
    use crate::models::message::AmqpMessage;

    fn relay() -> (NotificationRelay, broadcast::Receiver<super::OutboundEvent>) {
        let broker = Arc::new(InMemoryBroker::new(&Topology::dispatch()));
        let (events_tx, events_rx) = broadcast::channel(8);
        (NotificationRelay::new(broker, events_tx), events_rx)
    }

    #[tokio::test]
    async fn notification_without_payload_is_relayed_to_owner() {
        let (relay, mut events) = relay();
        let message = AmqpMessage::new("rider-1", None);

        relay
            .handle(&Delivery {
                routing_key: routing_keys::TRIP_NO_DRIVERS_FOUND.to_string(),
                body: serde_json::to_vec(&message).unwrap(),
                redelivered: false,
            })
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.routing_key, routing_keys::TRIP_NO_DRIVERS_FOUND);
        assert_eq!(event.owner_id, "rider-1");
        assert!(event.payload.is_none());
    }

    #[tokio::test]
    async fn relaying_with_nobody_listening_still_succeeds() {
        let (relay, events) = relay();
        drop(events);

        let message = AmqpMessage::new("driver-1", None);
        let result = relay
            .handle(&Delivery {
                routing_key: routing_keys::DRIVER_CMD_REQUEST.to_string(),
                body: serde_json::to_vec(&message).unwrap(),
                redelivered: false,
            })
            .await;
        assert!(result.is_ok());
    }
}
