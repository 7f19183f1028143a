use serde::{Deserialize, Serialize};

use crate::models::driver::Driver;
use crate::models::route::Route;

/// A priced option for a trip. Written once when the preview is generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideFare {
    pub id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub package_slug: String,
    pub total_price_in_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Pending,
    DriverAssigned,
}

/// Driver details attached to a trip once the matcher has picked someone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDriver {
    pub id: String,
    pub name: String,
    pub profile_picture: String,
    pub car_plate: String,
}

impl From<&Driver> for TripDriver {
    fn from(driver: &Driver) -> Self {
        Self {
            id: driver.id.clone(),
            name: driver.name.clone(),
            profile_picture: driver.profile_picture.clone(),
            car_plate: driver.car_plate.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    pub status: TripStatus,
    pub selected_fare: RideFare,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<TripDriver>,
}

impl Trip {
    /// Copy of this trip offered to `driver`. The original is left untouched so
    /// an envelope already on the broker is never edited in place.
    pub fn offered_to(&self, driver: &Driver) -> Trip {
        Trip {
            status: TripStatus::DriverAssigned,
            driver: Some(TripDriver::from(driver)),
            ..self.clone()
        }
    }
}
