use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::route::Coordinate;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub profile_picture: String,
    pub car_plate: String,
    pub package_slug: String,
    /// Proximity key derived from `location`; stored, never used for ranking.
    pub geohash: String,
    pub location: Coordinate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    Available,
    Busy,
}

/// Registry view of a driver that is currently online.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineDriver {
    pub driver: Driver,
    pub status: DriverStatus,
    /// Trip the driver was reserved for by the matcher, if any.
    pub current_trip: Option<String>,
    pub online_since: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) registration_seq: u64,
}
