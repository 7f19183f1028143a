use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::route::{Coordinate, Route};
use crate::models::trip::Trip;
use crate::state::AppState;
use crate::trips::TripPreview;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trip/route", post(get_route))
        .route("/trip/preview", post(preview_trip))
        .route("/trip/start", post(start_trip))
        .route("/trips/:id", get(get_trip))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteRequest {
    pub pickup: Coordinate,
    pub destination: Coordinate,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreviewTripRequest {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub pickup: Coordinate,
    pub destination: Coordinate,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartTripRequest {
    #[serde(rename = "rideFareID")]
    pub ride_fare_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
}

#[derive(Serialize)]
pub struct StartTripResponse {
    #[serde(rename = "tripID")]
    pub trip_id: String,
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RouteRequest>,
) -> Result<Json<Route>, AppError> {
    let route = state
        .trips
        .route(&payload.pickup, &payload.destination)
        .await?;
    Ok(Json(route))
}

async fn preview_trip(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PreviewTripRequest>,
) -> Result<Json<TripPreview>, AppError> {
    if payload.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user ID is required".to_string()));
    }

    let preview = state
        .trips
        .preview_trip(&payload.user_id, &payload.pickup, &payload.destination)
        .await?;
    Ok(Json(preview))
}

async fn start_trip(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartTripRequest>,
) -> Result<Json<StartTripResponse>, AppError> {
    if payload.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user ID is required".to_string()));
    }

    let trip = state
        .trips
        .create_trip(&payload.ride_fare_id, &payload.user_id)
        .await?;
    state.metrics.trips_created_total.inc();

    Ok(Json(StartTripResponse { trip_id: trip.id }))
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(state.trips.get_trip(&id).await?))
}
