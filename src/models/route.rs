use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Road route between a pickup and a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Metres along the road network.
    pub distance: f64,
    /// Seconds of free-flow travel.
    pub duration: f64,
    /// Ordered waypoints from pickup to destination.
    pub geometry: Vec<Coordinate>,
}
