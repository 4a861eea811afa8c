//! Shared fixtures for the integration tests.
//!
//! - A deterministic in-memory travel-time provider with call counting and
//!   switchable failures
//! - A manually advanced clock for cache expiry
//! - Small location and matrix builders

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use route_optimizer::cache::Clock;
use route_optimizer::matrix::{Matrix, TravelMatrices};
use route_optimizer::traits::{
    ElementStatus, Location, MatrixElement, MatrixResponse, MatrixRow, MatrixStatus, TravelOptions,
    TravelTimeProvider,
};

/// Meters per degree used by [`FakeProvider`]; Manhattan distance on raw
/// coordinates keeps expected values easy to compute.
pub const METERS_PER_DEGREE: f64 = 100_000.0;

/// Seconds are meters / 10.
pub fn expected_leg(from: &Location, to: &Location) -> Option<(i64, i64)> {
    let (a_lat, a_lng) = from.coordinates()?;
    let (b_lat, b_lng) = to.coordinates()?;
    let meters = (((a_lat - b_lat).abs() + (a_lng - b_lng).abs()) * METERS_PER_DEGREE).round() as i64;
    Some((meters, meters / 10))
}

/// In-memory travel-time service.
#[derive(Default)]
pub struct FakeProvider {
    calls: AtomicUsize,
    largest_block: AtomicUsize,
    outage: AtomicBool,
    failing: Vec<String>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any block touching one of `locations` fails as a whole.
    pub fn failing_on(locations: &[Location]) -> Self {
        Self {
            failing: locations.iter().map(Location::key).collect(),
            ..Self::default()
        }
    }

    pub fn set_outage(&self, outage: bool) {
        self.outage.store(outage, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most origin x destination elements requested in one call.
    pub fn largest_block(&self) -> usize {
        self.largest_block.load(Ordering::SeqCst)
    }
}

impl TravelTimeProvider for FakeProvider {
    fn query(&self, origins: &[Location], destinations: &[Location], _options: &TravelOptions) -> MatrixResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.largest_block
            .fetch_max(origins.len() * destinations.len(), Ordering::SeqCst);

        if self.outage.load(Ordering::SeqCst) {
            return MatrixResponse::failed(MatrixStatus::OverQueryLimit, "quota exhausted");
        }
        if origins
            .iter()
            .chain(destinations)
            .any(|location| self.failing.contains(&location.key()))
        {
            return MatrixResponse::failed(MatrixStatus::UnknownError, "backend error");
        }

        let rows = origins
            .iter()
            .map(|from| MatrixRow {
                elements: destinations
                    .iter()
                    .map(|to| match expected_leg(from, to) {
                        Some((meters, seconds)) => MatrixElement::ok(meters, seconds),
                        None => MatrixElement::failed(ElementStatus::NotFound),
                    })
                    .collect(),
            })
            .collect();
        MatrixResponse::new(rows)
    }
}

pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }
}

pub fn point(name: &str, lat: f64, lng: f64) -> Location {
    Location::new(name).with_coordinates(lat, lng)
}

/// `n` distinct points on a 4-wide grid, 0.01 degrees apart.
pub fn grid(n: usize) -> Vec<Location> {
    (0..n)
        .map(|i| {
            let lat = 36.0 + (i % 4) as f64 * 0.01;
            let lng = -115.0 + (i / 4) as f64 * 0.01;
            point(&format!("stop {i}"), lat, lng)
        })
        .collect()
}

/// Travel matrices where time equals distance.
pub fn symmetric(rows: Vec<Vec<i64>>) -> TravelMatrices {
    let distance = Matrix::from_rows("distance", rows).expect("square rows");
    TravelMatrices {
        time: distance.clone(),
        distance,
    }
}

/// Points on a number line at `positions`; distance is the gap between them.
pub fn line(positions: &[i64]) -> TravelMatrices {
    symmetric(
        positions
            .iter()
            .map(|a| positions.iter().map(|b| (a - b).abs()).collect())
            .collect(),
    )
}
