use crate::models::route::Coordinate;

const EARTH_RADIUS_KM: f64 = 6_371.0;

const GEOHASH_ALPHABET: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Cell size of roughly 5 m x 5 m.
pub const DEFAULT_GEOHASH_PRECISION: usize = 9;

pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Base32 geohash of `point` with `precision` characters.
pub fn geohash(point: &Coordinate, precision: usize) -> String {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lng_range = (-180.0_f64, 180.0_f64);

    let mut hash = String::with_capacity(precision);
    let mut even_bit = true;
    let mut bits = 0;
    let mut index = 0usize;

    while hash.len() < precision {
        // Bits alternate between longitude and latitude, longitude first.
        let (range, value) = if even_bit {
            (&mut lng_range, point.longitude)
        } else {
            (&mut lat_range, point.latitude)
        };

        let mid = (range.0 + range.1) / 2.0;
        if value >= mid {
            index = index * 2 + 1;
            range.0 = mid;
        } else {
            index *= 2;
            range.1 = mid;
        }

        even_bit = !even_bit;
        bits += 1;
        if bits == 5 {
            hash.push(GEOHASH_ALPHABET[index] as char);
            bits = 0;
            index = 0;
        }
    }

    hash
}
