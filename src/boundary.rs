//! City boundary membership used to scope city-level statistics.

use geo::{Contains, Coord, LineString, Point, Polygon};

pub trait CityBoundary: Send + Sync {
    fn contains_point(&self, latitude: f64, longitude: f64) -> bool;
}

/// Polygons are in (longitude, latitude) order, as everywhere in `geo`.
impl CityBoundary for Polygon<f64> {
    fn contains_point(&self, latitude: f64, longitude: f64) -> bool {
        self.contains(&Point::new(longitude, latitude))
    }
}

/// Builds a polygon from a ring of `(latitude, longitude)` pairs.
pub fn polygon_from_lat_lon(ring: &[(f64, f64)]) -> Polygon<f64> {
    let exterior: LineString<f64> = ring
        .iter()
        .map(|&(lat, lon)| Coord { x: lon, y: lat })
        .collect();
    Polygon::new(exterior, vec![])
}
