//! Fare estimation for a previewed route.
//!
//! Each package has a base price; distance and time are charged on top at a
//! shared rate. All arithmetic is in integer cents.

pub mod routing;

use serde::Serialize;

use crate::models::route::Route;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRate {
    pub package_slug: String,
    pub base_fare_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingConfig {
    pub packages: Vec<PackageRate>,
    pub per_km_cents: i64,
    pub per_minute_cents: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let package = |slug: &str, base_fare_cents| PackageRate {
            package_slug: slug.to_string(),
            base_fare_cents,
        };

        Self {
            packages: vec![
                package("suv", 200),
                package("sedan", 350),
                package("van", 400),
                package("luxury", 1000),
            ],
            per_km_cents: 150,
            per_minute_cents: 25,
        }
    }
}

/// Package slug and price for every package in `config`.
pub fn estimate_fares(route: &Route, config: &PricingConfig) -> Vec<(String, i64)> {
    let metres = route.distance.max(0.0).round() as i64;
    let seconds = route.duration.max(0.0).round() as i64;

    let distance_cents = div_round(metres * config.per_km_cents, 1000);
    let time_cents = div_round(seconds * config.per_minute_cents, 60);

    config
        .packages
        .iter()
        .map(|rate| {
            (
                rate.package_slug.clone(),
                rate.base_fare_cents + distance_cents + time_cents,
            )
        })
        .collect()
}

/// Non-negative integer division rounding half up.
fn div_round(numerator: i64, denominator: i64) -> i64 {
    (numerator + denominator / 2) / denominator
}

#[cfg(test)]
mod tests {
    use super::{estimate_fares, PricingConfig};
    use crate::models::route::Route;

    fn route(distance: f64, duration: f64) -> Route {
        Route {
            distance,
            duration,
            geometry: Vec::new(),
        }
    }

    #[test]
    fn fare_is_base_plus_distance_plus_time() {
        // 10 km and 20 minutes: 1500 + 500 cents on top of the base.
        let fares = estimate_fares(&route(10_000.0, 1_200.0), &PricingConfig::default());

        assert_eq!(
            fares,
            vec![
                ("suv".to_string(), 2_200),
                ("sedan".to_string(), 2_350),
                ("van".to_string(), 2_400),
                ("luxury".to_string(), 3_000),
            ]
        );
    }

    #[test]
    fn sub_cent_charges_round_to_nearest_cent() {
        let config = PricingConfig::default();
        let sedan = |r: &Route| estimate_fares(r, &config)[1].1;

        // 3 m = 0.45 cents, 1 s = 0.42 cents: both round down.
        assert_eq!(sedan(&route(3.0, 1.0)), 350);
        // 4 m = 0.6 cents, 2 s = 0.83 cents: both round up.
        assert_eq!(sedan(&route(4.0, 2.0)), 352);
        assert_eq!(sedan(&route(-5.0, 0.0)), 350);
    }
}
