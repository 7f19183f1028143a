use tracing::info;

use crate::error::AppError;
use crate::messaging::topology::routing_keys;
use crate::messaging::SharedBroker;
use crate::models::message::{AmqpMessage, TripEventData};
use crate::models::trip::Trip;

/// Announces newly created trips on the exchange.
#[derive(Clone)]
pub struct TripPublisher {
    broker: SharedBroker,
}

impl TripPublisher {
    pub fn new(broker: SharedBroker) -> Self {
        Self { broker }
    }

    /// Publishes `trip.created` keyed by the rider. Transport errors come back
    /// unchanged.
    pub async fn publish_trip_created(&self, trip: &Trip) -> Result<(), AppError> {
        let payload = serde_json::to_vec(&TripEventData { trip: trip.clone() })?;
        let message = AmqpMessage::new(trip.user_id.clone(), Some(payload));

        self.broker
            .publish(routing_keys::TRIP_CREATED, &message)
            .await?;

        info!(
            trip_id = %trip.id,
            user_id = %trip.user_id,
            package_slug = %trip.selected_fare.package_slug,
            "trip created event published"
        );
        Ok(())
    }
}
