use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::AppError;
use crate::models::trip::{RideFare, Trip};

/// Storage for trips and the fares offered during preview.
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn create_trip(&self, trip: Trip) -> Result<Trip, AppError>;
    async fn get_trip(&self, trip_id: &str) -> Result<Trip, AppError>;
    /// Fares are write-once: saving an id twice is a conflict.
    async fn save_ride_fare(&self, fare: RideFare) -> Result<(), AppError>;
    async fn get_ride_fare(&self, fare_id: &str) -> Result<RideFare, AppError>;
    async fn trip_count(&self) -> usize;
}

/// Volatile repository; contents are lost on restart.
#[derive(Default)]
pub struct InMemoryTripRepository {
    trips: DashMap<String, Trip>,
    ride_fares: DashMap<String, RideFare>,
}

impl InMemoryTripRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TripRepository for InMemoryTripRepository {
    async fn create_trip(&self, trip: Trip) -> Result<Trip, AppError> {
        match self.trips.entry(trip.id.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!("trip {} already exists", trip.id))),
            Entry::Vacant(slot) => {
                slot.insert(trip.clone());
                Ok(trip)
            }
        }
    }

    async fn get_trip(&self, trip_id: &str) -> Result<Trip, AppError> {
        self.trips
            .get(trip_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))
    }

    async fn save_ride_fare(&self, fare: RideFare) -> Result<(), AppError> {
        match self.ride_fares.entry(fare.id.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "ride fare {} already exists",
                fare.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(fare);
                Ok(())
            }
        }
    }

    async fn get_ride_fare(&self, fare_id: &str) -> Result<RideFare, AppError> {
        self.ride_fares
            .get(fare_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("ride fare {fare_id} not found")))
    }

    async fn trip_count(&self) -> usize {
        self.trips.len()
    }
}
