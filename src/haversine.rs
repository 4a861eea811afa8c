//! Straight-line travel-time provider.
//!
//! Estimates distance along the great circle and time from an assumed speed.
//! Ignores roads, but needs no network and never has an outage.

use crate::traits::{
    ElementStatus, Location, MatrixElement, MatrixResponse, MatrixRow, TravelOptions, TravelTimeProvider,
};

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    pub speed_kmh: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
        let (lat1, lng1) = from;
        let (lat2, lng2) = to;

        let delta_lat = (lat2 - lat1).to_radians();
        let delta_lng = (lng2 - lng1).to_radians();
        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.to_radians().cos() * lat2.to_radians().cos() * (delta_lng / 2.0).sin().powi(2);

        EARTH_RADIUS_KM * 2.0 * a.sqrt().asin()
    }

    fn km_to_seconds(&self, km: f64) -> i64 {
        (km / self.speed_kmh * 3600.0).round() as i64
    }

    fn leg(&self, from: &Location, to: &Location) -> MatrixElement {
        match (from.coordinates(), to.coordinates()) {
            (Some(from), Some(to)) => {
                let km = Self::haversine_km(from, to);
                MatrixElement::ok((km * 1000.0).round() as i64, self.km_to_seconds(km))
            }
            _ => MatrixElement::failed(ElementStatus::NotFound),
        }
    }
}

impl TravelTimeProvider for HaversineMatrix {
    fn query(&self, origins: &[Location], destinations: &[Location], _options: &TravelOptions) -> MatrixResponse {
        let rows = origins
            .iter()
            .map(|from| MatrixRow {
                elements: destinations.iter().map(|to| self.leg(from, to)).collect(),
            })
            .collect();

        MatrixResponse::new(rows)
    }
}
