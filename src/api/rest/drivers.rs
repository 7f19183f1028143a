use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, OnlineDriver};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver))
        .route("/drivers/:id", get(get_driver).delete(unregister_driver))
        .route("/drivers/:id/status", patch(update_driver_status))
}

#[derive(Deserialize)]
pub struct RegisterDriverRequest {
    #[serde(rename = "driverID")]
    pub driver_id: String,
    #[serde(rename = "packageSlug")]
    pub package_slug: String,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<(StatusCode, Json<Driver>), AppError> {
    if payload.driver_id.trim().is_empty() {
        return Err(AppError::BadRequest("driverID cannot be empty".to_string()));
    }
    if payload.package_slug.trim().is_empty() {
        return Err(AppError::BadRequest("packageSlug cannot be empty".to_string()));
    }

    let driver = state
        .registry
        .register(&payload.driver_id, &payload.package_slug)?;
    Ok((StatusCode::CREATED, Json(driver)))
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OnlineDriver>, AppError> {
    Ok(Json(state.registry.get(&id)?))
}

async fn unregister_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.registry.unregister(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<OnlineDriver>, AppError> {
    state.registry.set_status(&id, payload.status)?;
    Ok(Json(state.registry.get(&id)?))
}
