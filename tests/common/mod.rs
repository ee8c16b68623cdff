use mapcluster::{places_from_geojson, GeoPoint, GeoRect, Options, Place};
use std::{fs, path::Path};

#[allow(dead_code)]
pub fn get_options(max_clusters: usize, title_format: &str) -> Options {
    Options {
        max_clusters,
        title_format: title_format.to_string(),
    }
}

#[allow(dead_code)]
pub fn load_places() -> Vec<Place> {
    let file_path = Path::new("./tests/common/places.json");
    let json_string = fs::read_to_string(file_path).expect("places.json was not found");

    places_from_geojson(&json_string).expect("places.json was not parsed")
}

#[allow(dead_code)]
pub fn rect(south: f64, west: f64, north: f64, east: f64) -> GeoRect {
    GeoRect::new(GeoPoint::new(south, west), GeoPoint::new(north, east))
}
