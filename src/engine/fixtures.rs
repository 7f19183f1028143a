use rand::Rng;

use crate::geo::{geohash, DEFAULT_GEOHASH_PRECISION};
use crate::models::driver::Driver;
use crate::models::route::Coordinate;

/// Spawn points for drivers coming online, spread across San Francisco.
const START_LOCATIONS: [(f64, f64); 8] = [
    (37.7749, -122.4194),
    (37.7849, -122.4094),
    (37.7649, -122.4294),
    (37.7950, -122.3937),
    (37.7599, -122.4148),
    (37.8024, -122.4058),
    (37.7694, -122.4862),
    (37.7338, -122.4470),
];

const DRIVER_NAMES: [&str; 6] = [
    "Lando Norris",
    "Ana Ruiz",
    "Kenji Watanabe",
    "Priya Nair",
    "Tomasz Kowal",
    "Amara Okafor",
];

const PLATE_LETTERS: &[u8] = b"ABCDEFGHJKLMNPRSTUVWXYZ";

/// Builds the record for a driver going online: a random start location and
/// its proximity key, plus display details.
pub fn seed_driver(driver_id: &str, package_slug: &str) -> Driver {
    let mut rng = rand::thread_rng();

    let (latitude, longitude) = START_LOCATIONS[rng.gen_range(0..START_LOCATIONS.len())];
    let location = Coordinate {
        latitude,
        longitude,
    };
    let avatar_index = rng.gen_range(0..10);

    Driver {
        id: driver_id.to_string(),
        name: DRIVER_NAMES[rng.gen_range(0..DRIVER_NAMES.len())].to_string(),
        profile_picture: avatar_url(avatar_index),
        car_plate: random_plate(&mut rng),
        package_slug: package_slug.to_string(),
        geohash: geohash(&location, DEFAULT_GEOHASH_PRECISION),
        location,
    }
}

fn avatar_url(index: usize) -> String {
    format!("https://randomuser.me/api/portraits/lego/{index}.jpg")
}

fn random_plate<R: Rng>(rng: &mut R) -> String {
    let letters: String = (0..3)
        .map(|_| PLATE_LETTERS[rng.gen_range(0..PLATE_LETTERS.len())] as char)
        .collect();
    format!("{letters}{:03}", rng.gen_range(0..1000))
}
