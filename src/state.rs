use std::sync::Arc;

use tokio::sync::broadcast;

use crate::engine::matcher::TripConsumer;
use crate::engine::notifications::{NotificationRelay, OutboundEvent};
use crate::engine::publisher::TripPublisher;
use crate::engine::registry::DriverRegistry;
use crate::messaging::SharedBroker;
use crate::observability::metrics::Metrics;
use crate::pricing::routing::RouteProvider;
use crate::pricing::PricingConfig;
use crate::trips::repository::InMemoryTripRepository;
use crate::trips::TripService;

pub struct AppState {
    pub registry: Arc<DriverRegistry>,
    pub trips: TripService,
    pub broker: SharedBroker,
    pub events_tx: broadcast::Sender<OutboundEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        broker: SharedBroker,
        routes: Arc<dyn RouteProvider>,
        event_buffer_size: usize,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            registry: Arc::new(DriverRegistry::new()),
            trips: TripService::new(
                Arc::new(InMemoryTripRepository::new()),
                routes,
                TripPublisher::new(broker.clone()),
                PricingConfig::default(),
            ),
            broker,
            events_tx,
            metrics: Metrics::new(),
        }
    }

    pub fn trip_consumer(&self) -> Arc<TripConsumer> {
        Arc::new(TripConsumer::new(
            self.registry.clone(),
            self.broker.clone(),
            self.metrics.clone(),
        ))
    }

    pub fn notification_relay(&self) -> Arc<NotificationRelay> {
        Arc::new(NotificationRelay::new(
            self.broker.clone(),
            self.events_tx.clone(),
        ))
    }
}
