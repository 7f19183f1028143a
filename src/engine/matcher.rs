use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::registry::DriverRegistry;
use crate::error::AppError;
use crate::messaging::topology::{routing_keys, FIND_AVAILABLE_DRIVERS_QUEUE};
use crate::messaging::{Delivery, MessageHandler, SharedBroker};
use crate::models::driver::Driver;
use crate::models::message::{AmqpMessage, TripEventData};
use crate::models::trip::Trip;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Dispatched { driver_id: String },
    NoDriversFound,
    /// Routing key accepted on the queue but not acted upon.
    Ignored,
}

impl MatchOutcome {
    fn label(&self) -> &'static str {
        match self {
            MatchOutcome::Dispatched { .. } => "dispatched",
            MatchOutcome::NoDriversFound => "no_drivers",
            MatchOutcome::Ignored => "ignored",
        }
    }
}

/// Consumes trip events and offers each new trip to one available driver.
pub struct TripConsumer {
    registry: Arc<DriverRegistry>,
    broker: SharedBroker,
    metrics: Metrics,
}

impl TripConsumer {
    pub fn new(registry: Arc<DriverRegistry>, broker: SharedBroker, metrics: Metrics) -> Self {
        Self {
            registry,
            broker,
            metrics,
        }
    }

    /// Blocks until `shutdown` fires or the broker channel closes.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<(), AppError> {
        info!(queue = FIND_AVAILABLE_DRIVERS_QUEUE, "trip consumer starting");
        let broker = self.broker.clone();
        broker
            .consume(FIND_AVAILABLE_DRIVERS_QUEUE, self, shutdown)
            .await
    }

    pub async fn process(&self, delivery: &Delivery) -> Result<MatchOutcome, AppError> {
        let message: AmqpMessage = serde_json::from_slice(&delivery.body)?;
        let data = message.data.as_deref().ok_or_else(|| {
            AppError::BadRequest(format!(
                "{} event from {} carries no payload",
                delivery.routing_key, message.owner_id
            ))
        })?;
        let payload: TripEventData = serde_json::from_slice(data)?;

        match delivery.routing_key.as_str() {
            routing_keys::TRIP_CREATED => self.find_and_notify_driver(payload.trip).await,
            other => {
                debug!(routing_key = other, trip_id = %payload.trip.id, "no handler for routing key");
                Ok(MatchOutcome::Ignored)
            }
        }
    }

    async fn find_and_notify_driver(&self, trip: Trip) -> Result<MatchOutcome, AppError> {
        // A redelivered trip that already holds a driver goes to that driver again.
        let driver = match self.registry.assigned_driver(&trip.id) {
            Some(online) => Some(online.driver),
            None => self.claim_driver(&trip)?,
        };

        let Some(driver) = driver else {
            let message = AmqpMessage::new(trip.user_id.clone(), None);
            self.broker
                .publish(routing_keys::TRIP_NO_DRIVERS_FOUND, &message)
                .await?;

            info!(trip_id = %trip.id, user_id = %trip.user_id, "no drivers found");
            return Ok(MatchOutcome::NoDriversFound);
        };

        if let Err(err) = self.offer_trip(&trip, &driver).await {
            if let Err(release_err) = self.registry.release(&driver.id, &trip.id) {
                warn!(driver_id = %driver.id, error = %release_err, "could not release driver");
            }
            return Err(err);
        }

        info!(trip_id = %trip.id, driver_id = %driver.id, "trip offered to driver");
        Ok(MatchOutcome::Dispatched {
            driver_id: driver.id,
        })
    }

    /// Reserves the first candidate that is still online and available when we
    /// get to it.
    fn claim_driver(&self, trip: &Trip) -> Result<Option<Driver>, AppError> {
        let package_slug = &trip.selected_fare.package_slug;

        for driver_id in self.registry.find_available(package_slug) {
            match self.registry.reserve(&driver_id, &trip.id) {
                Ok(Some(driver)) => return Ok(Some(driver)),
                Ok(None) => {
                    debug!(driver_id = %driver_id, trip_id = %trip.id, "candidate taken; trying next");
                }
                Err(AppError::NotOnline(_)) => {
                    debug!(driver_id = %driver_id, trip_id = %trip.id, "candidate went offline; trying next");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(None)
    }

    async fn offer_trip(&self, trip: &Trip, driver: &Driver) -> Result<(), AppError> {
        let payload = serde_json::to_vec(&TripEventData {
            trip: trip.offered_to(driver),
        })?;
        let message = AmqpMessage::new(driver.id.clone(), Some(payload));

        self.broker
            .publish(routing_keys::DRIVER_CMD_REQUEST, &message)
            .await
    }
}

#[async_trait]
impl MessageHandler for TripConsumer {
    async fn handle(&self, delivery: &Delivery) -> Result<(), AppError> {
        let start = Instant::now();
        let result = self.process(delivery).await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(outcome) => {
                self.metrics.record_match(outcome.label(), elapsed);
                Ok(())
            }
            Err(err) => {
                self.metrics.record_match("error", elapsed);
                warn!(
                    routing_key = %delivery.routing_key,
                    redelivered = delivery.redelivered,
                    error = %err,
                    "failed to process trip event"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::{MatchOutcome, TripConsumer};
    use crate::engine::registry::DriverRegistry;
    use crate::error::AppError;
    use crate::messaging::memory::InMemoryBroker;
    use crate::messaging::topology::{routing_keys, Topology, GATEWAY_NOTIFICATIONS_QUEUE};
    use crate::messaging::Delivery;
    use crate::models::driver::DriverStatus;
    use crate::models::message::{AmqpMessage, TripEventData};
    use crate::models::trip::{RideFare, Trip, TripStatus};
    use crate::observability::metrics::Metrics;

    fn setup() -> (TripConsumer, Arc<DriverRegistry>, Arc<InMemoryBroker>) {
        let registry = Arc::new(DriverRegistry::new());
        let broker = Arc::new(InMemoryBroker::new(&Topology::dispatch()));
        let consumer = TripConsumer::new(registry.clone(), broker.clone(), Metrics::new());
        (consumer, registry, broker)
    }

    fn trip(id: &str, rider: &str, package_slug: &str) -> Trip {
        Trip {
            id: id.to_string(),
            user_id: rider.to_string(),
            status: TripStatus::Pending,
            selected_fare: RideFare {
                id: format!("fare-{id}"),
                user_id: rider.to_string(),
                package_slug: package_slug.to_string(),
                total_price_in_cents: 1500,
                route: None,
            },
            driver: None,
        }
    }

    fn delivery(routing_key: &str, trip: &Trip) -> Delivery {
        let data = serde_json::to_vec(&TripEventData { trip: trip.clone() }).unwrap();
        let message = AmqpMessage::new(trip.user_id.clone(), Some(data));
        Delivery {
            routing_key: routing_key.to_string(),
            body: serde_json::to_vec(&message).unwrap(),
            redelivered: false,
        }
    }

    fn decode(delivery: &Delivery) -> AmqpMessage {
        serde_json::from_slice(&delivery.body).unwrap()
    }

    #[tokio::test]
    async fn new_trip_is_offered_to_an_available_driver() {
        let (consumer, registry, broker) = setup();
        registry.register("d1", "sedan").unwrap();

        let outcome = consumer
            .process(&delivery(routing_keys::TRIP_CREATED, &trip("t1", "r1", "sedan")))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            MatchOutcome::Dispatched {
                driver_id: "d1".to_string()
            }
        );

        let sent = broker.drain(GATEWAY_NOTIFICATIONS_QUEUE).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].routing_key, routing_keys::DRIVER_CMD_REQUEST);
        let message = decode(&sent[0]);
        assert_eq!(message.owner_id, "d1");
        let payload: TripEventData =
            serde_json::from_slice(message.data.as_deref().unwrap()).unwrap();
        assert_eq!(payload.trip.id, "t1");
        assert_eq!(payload.trip.status, TripStatus::DriverAssigned);
        assert_eq!(payload.trip.driver.unwrap().id, "d1");

        let online = registry.get("d1").unwrap();
        assert_eq!(online.status, DriverStatus::Busy);
        assert_eq!(online.current_trip.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn rider_is_told_when_nobody_can_take_the_trip() {
        let (consumer, registry, broker) = setup();
        registry.register("d1", "sedan").unwrap();
        registry.set_status("d1", DriverStatus::Busy).unwrap();
        registry.register("d2", "van").unwrap();

        let outcome = consumer
            .process(&delivery(routing_keys::TRIP_CREATED, &trip("t1", "r2", "sedan")))
            .await
            .unwrap();
        assert_eq!(outcome, MatchOutcome::NoDriversFound);

        let sent = broker.drain(GATEWAY_NOTIFICATIONS_QUEUE).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].routing_key, routing_keys::TRIP_NO_DRIVERS_FOUND);
        let message = decode(&sent[0]);
        assert_eq!(message.owner_id, "r2");
        assert!(message.data.is_none());
    }

    #[tokio::test]
    async fn duplicate_delivery_goes_back_to_the_same_driver() {
        let (consumer, registry, broker) = setup();
        registry.register("d1", "van").unwrap();
        registry.register("d2", "van").unwrap();
        let event = delivery(routing_keys::TRIP_CREATED, &trip("t1", "r1", "van"));

        let first = consumer.process(&event).await.unwrap();
        let second = consumer.process(&event).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.get("d2").unwrap().status, DriverStatus::Available);
        let owners: Vec<String> = broker
            .drain(GATEWAY_NOTIFICATIONS_QUEUE)
            .await
            .unwrap()
            .iter()
            .map(|sent| decode(sent).owner_id)
            .collect();
        assert_eq!(owners, vec!["d1".to_string(), "d1".to_string()]);
    }

    #[tokio::test]
    async fn failed_offer_releases_the_driver() {
        let (consumer, registry, broker) = setup();
        registry.register("d1", "sedan").unwrap();

        broker.fail_next_publishes(1);
        let result = consumer
            .process(&delivery(routing_keys::TRIP_CREATED, &trip("t1", "r1", "sedan")))
            .await;

        assert!(matches!(result, Err(AppError::Transport(_))));
        let online = registry.get("d1").unwrap();
        assert_eq!(online.status, DriverStatus::Available);
        assert!(online.current_trip.is_none());
    }

    #[tokio::test]
    async fn declined_trips_are_ignored() {
        let (consumer, registry, broker) = setup();
        registry.register("d1", "sedan").unwrap();

        let outcome = consumer
            .process(&delivery(
                routing_keys::TRIP_DRIVER_DECLINED,
                &trip("t1", "r1", "sedan"),
            ))
            .await
            .unwrap();

        assert_eq!(outcome, MatchOutcome::Ignored);
        assert_eq!(broker.depth(GATEWAY_NOTIFICATIONS_QUEUE).await.unwrap(), 0);
        assert_eq!(registry.get("d1").unwrap().status, DriverStatus::Available);
    }

    #[tokio::test]
    async fn envelope_without_data_is_a_bad_request() {
        let (consumer, _registry, _broker) = setup();
        let message = AmqpMessage::new("r1".to_string(), None);
        let event = Delivery {
            routing_key: routing_keys::TRIP_CREATED.to_string(),
            body: serde_json::to_vec(&message).unwrap(),
            redelivered: false,
        };

        let result = consumer.process(&event).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn drivers_going_offline_mid_match_never_lose_the_trip() {
        let (consumer, registry, _broker) = setup();
        let stop = Arc::new(AtomicBool::new(false));

        let churn = {
            let registry = registry.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let _ = registry.register("d1", "sedan");
                    let _ = registry.unregister("d1");
                }
            })
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let failures = runtime.block_on(async {
            let mut failures = 0;
            for n in 0..2_000 {
                let event = delivery(
                    routing_keys::TRIP_CREATED,
                    &trip(&format!("t{n}"), "r1", "sedan"),
                );
                match consumer.process(&event).await {
                    Ok(MatchOutcome::Dispatched { .. } | MatchOutcome::NoDriversFound) => {}
                    _ => failures += 1,
                }
            }
            failures
        });

        stop.store(true, Ordering::Relaxed);
        churn.join().unwrap();
        assert_eq!(failures, 0);
    }

    #[tokio::test]
    async fn offline_candidate_is_skipped_for_the_next_one() {
        let (consumer, registry, broker) = setup();
        registry.register("d1", "van").unwrap();
        registry.register("d2", "van").unwrap();
        registry.unregister("d1").unwrap();

        let outcome = consumer
            .process(&delivery(routing_keys::TRIP_CREATED, &trip("t1", "r1", "van")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            MatchOutcome::Dispatched {
                driver_id: "d2".to_string()
            }
        );
        let sent = broker.drain(GATEWAY_NOTIFICATIONS_QUEUE).await.unwrap();
        assert_eq!(decode(&sent[0]).owner_id, "d2");
    }
}
