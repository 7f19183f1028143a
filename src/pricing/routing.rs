use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::route::{Coordinate, Route};

#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn route(&self, pickup: &Coordinate, destination: &Coordinate)
    -> Result<Route, AppError>;
}

/// Routes through an OSRM-compatible HTTP API.
pub struct OsrmRouteProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OsrmRouteProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, pickup: &Coordinate, destination: &Coordinate) -> String {
        format!(
            "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url,
            pickup.longitude,
            pickup.latitude,
            destination.longitude,
            destination.latitude,
        )
    }
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: `[lng, lat]`.
    coordinates: Vec<[f64; 2]>,
}

impl OsrmResponse {
    fn into_route(self) -> Result<Route, AppError> {
        if self.code != "Ok" {
            return Err(AppError::Routing(format!("routing api answered {}", self.code)));
        }

        let route = self
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Routing("routing api returned no routes".to_string()))?;

        Ok(Route {
            distance: route.distance,
            duration: route.duration,
            geometry: route
                .geometry
                .coordinates
                .into_iter()
                .map(|[longitude, latitude]| Coordinate {
                    latitude,
                    longitude,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl RouteProvider for OsrmRouteProvider {
    async fn route(
        &self,
        pickup: &Coordinate,
        destination: &Coordinate,
    ) -> Result<Route, AppError> {
        let url = self.url(pickup, destination);
        debug!(%url, "requesting route");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| AppError::Routing(format!("failed to fetch route: {err}")))?;

        let body: OsrmResponse = response
            .json()
            .await
            .map_err(|err| AppError::Routing(format!("failed to parse route: {err}")))?;

        body.into_route()
    }
}

/// Great-circle estimate used when no routing API is configured.
pub struct StraightLineRouteProvider {
    pub average_speed_kmh: f64,
}

impl Default for StraightLineRouteProvider {
    fn default() -> Self {
        Self {
            average_speed_kmh: 30.0,
        }
    }
}

#[async_trait]
impl RouteProvider for StraightLineRouteProvider {
    async fn route(
        &self,
        pickup: &Coordinate,
        destination: &Coordinate,
    ) -> Result<Route, AppError> {
        let distance_km = haversine_km(pickup, destination);

        Ok(Route {
            distance: distance_km * 1000.0,
            duration: distance_km / self.average_speed_kmh * 3600.0,
            geometry: vec![*pickup, *destination],
        })
    }
}
