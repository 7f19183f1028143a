//! Rider-facing trip flow: preview a route with priced packages, then create a
//! trip from one of the offered fares and hand it to dispatch.

pub mod repository;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::publisher::TripPublisher;
use crate::error::AppError;
use crate::models::route::{Coordinate, Route};
use crate::models::trip::{RideFare, Trip, TripStatus};
use crate::pricing::routing::RouteProvider;
use crate::pricing::{estimate_fares, PricingConfig};
use crate::trips::repository::TripRepository;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPreview {
    pub route: Route,
    pub ride_fares: Vec<RideFare>,
}

pub struct TripService {
    repo: Arc<dyn TripRepository>,
    routes: Arc<dyn RouteProvider>,
    publisher: TripPublisher,
    pricing: PricingConfig,
}

impl TripService {
    pub fn new(
        repo: Arc<dyn TripRepository>,
        routes: Arc<dyn RouteProvider>,
        publisher: TripPublisher,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            repo,
            routes,
            publisher,
            pricing,
        }
    }

    /// Route between two points without pricing or storing anything.
    pub async fn route(
        &self,
        pickup: &Coordinate,
        destination: &Coordinate,
    ) -> Result<Route, AppError> {
        self.routes.route(pickup, destination).await
    }

    pub async fn preview_trip(
        &self,
        user_id: &str,
        pickup: &Coordinate,
        destination: &Coordinate,
    ) -> Result<TripPreview, AppError> {
        let route = self.routes.route(pickup, destination).await?;

        let mut ride_fares = Vec::new();
        for (package_slug, total_price_in_cents) in estimate_fares(&route, &self.pricing) {
            let fare = RideFare {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                package_slug,
                total_price_in_cents,
                route: Some(route.clone()),
            };
            self.repo.save_ride_fare(fare.clone()).await?;
            ride_fares.push(fare);
        }

        info!(
            user_id,
            distance_m = route.distance,
            fares = ride_fares.len(),
            "trip previewed"
        );
        Ok(TripPreview { route, ride_fares })
    }

    /// Creates a trip from a previewed fare owned by `user_id` and announces
    /// it for matching.
    pub async fn create_trip(&self, fare_id: &str, user_id: &str) -> Result<Trip, AppError> {
        let fare = self.repo.get_ride_fare(fare_id).await?;
        if fare.user_id != user_id {
            return Err(AppError::BadRequest(format!(
                "ride fare {fare_id} does not belong to user {user_id}"
            )));
        }

        let trip = self
            .repo
            .create_trip(Trip {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                status: TripStatus::Pending,
                selected_fare: fare,
                driver: None,
            })
            .await?;

        if let Err(err) = self.publisher.publish_trip_created(&trip).await {
            warn!(trip_id = %trip.id, error = %err, "trip stored but not announced");
            return Err(err);
        }

        Ok(trip)
    }

    pub async fn get_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        self.repo.get_trip(trip_id).await
    }

    pub async fn trip_count(&self) -> usize {
        self.repo.trip_count().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::TripService;
    use crate::engine::publisher::TripPublisher;
    use crate::error::AppError;
    use crate::messaging::memory::InMemoryBroker;
    use crate::messaging::topology::{Topology, FIND_AVAILABLE_DRIVERS_QUEUE};
    use crate::models::message::{AmqpMessage, TripEventData};
    use crate::models::route::Coordinate;
    use crate::models::trip::TripStatus;
    use crate::pricing::routing::StraightLineRouteProvider;
    use crate::pricing::PricingConfig;
    use crate::trips::repository::InMemoryTripRepository;

    fn service(broker: Arc<InMemoryBroker>) -> TripService {
        TripService::new(
            Arc::new(InMemoryTripRepository::new()),
            Arc::new(StraightLineRouteProvider::default()),
            TripPublisher::new(broker),
            PricingConfig::default(),
        )
    }

    fn pickup() -> Coordinate {
        Coordinate {
            latitude: 37.7749,
            longitude: -122.4194,
        }
    }

    fn destination() -> Coordinate {
        Coordinate {
            latitude: 37.8024,
            longitude: -122.4058,
        }
    }

    #[tokio::test]
    async fn preview_offers_one_fare_per_package() {
        let broker = Arc::new(InMemoryBroker::new(&Topology::dispatch()));
        let trips = service(broker);

        let preview = trips
            .preview_trip("rider-1", &pickup(), &destination())
            .await
            .unwrap();

        let slugs: Vec<&str> = preview
            .ride_fares
            .iter()
            .map(|fare| fare.package_slug.as_str())
            .collect();
        assert_eq!(slugs, vec!["suv", "sedan", "van", "luxury"]);
        assert!(preview.ride_fares.iter().all(|fare| fare.user_id == "rider-1"));
        assert!(preview.route.distance > 0.0);
    }

    #[tokio::test]
    async fn create_trip_stores_and_announces_it() {
        let broker = Arc::new(InMemoryBroker::new(&Topology::dispatch()));
        let trips = service(broker.clone());
        let preview = trips
            .preview_trip("rider-1", &pickup(), &destination())
            .await
            .unwrap();
        let van = preview
            .ride_fares
            .iter()
            .find(|fare| fare.package_slug == "van")
            .unwrap();

        let trip = trips.create_trip(&van.id, "rider-1").await.unwrap();
        assert_eq!(trip.status, TripStatus::Pending);
        assert_eq!(trips.get_trip(&trip.id).await.unwrap(), trip);

        let announced = broker.drain(FIND_AVAILABLE_DRIVERS_QUEUE).await.unwrap();
        assert_eq!(announced.len(), 1);
        assert_eq!(announced[0].routing_key, "trip.created");
        let message: AmqpMessage = serde_json::from_slice(&announced[0].body).unwrap();
        assert_eq!(message.owner_id, "rider-1");
        let payload: TripEventData =
            serde_json::from_slice(message.data.as_deref().unwrap()).unwrap();
        assert_eq!(payload.trip.id, trip.id);
        assert_eq!(payload.trip.selected_fare.package_slug, "van");
    }

    #[tokio::test]
    async fn fares_cannot_be_used_by_another_rider_or_invented() {
        let broker = Arc::new(InMemoryBroker::new(&Topology::dispatch()));
        let trips = service(broker.clone());
        let preview = trips
            .preview_trip("rider-1", &pickup(), &destination())
            .await
            .unwrap();

        let stolen = trips.create_trip(&preview.ride_fares[0].id, "rider-2").await;
        assert!(matches!(stolen, Err(AppError::BadRequest(_))));

        let unknown = trips.create_trip("no-such-fare", "rider-1").await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));

        assert_eq!(broker.depth(FIND_AVAILABLE_DRIVERS_QUEUE).await.unwrap(), 0);
        assert_eq!(trips.trip_count().await, 0);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_from_create_trip() {
        let broker = Arc::new(InMemoryBroker::new(&Topology::dispatch()));
        let trips = service(broker.clone());
        let preview = trips
            .preview_trip("rider-1", &pickup(), &destination())
            .await
            .unwrap();

        broker.fail_next_publishes(1);
        let result = trips.create_trip(&preview.ride_fares[0].id, "rider-1").await;
        assert!(matches!(result, Err(AppError::Transport(_))));
    }
}
