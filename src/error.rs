//! Error types for the optimization engine.
//!
//! Provider outages are not errors at this level: they degrade matrix
//! entries to [`crate::matrix::UNREACHABLE`]. Infeasibility is a status,
//! not an error. What remains are malformed inputs, bad configuration and
//! solver inconsistencies.

use thiserror::Error;

/// Input rejected before any solving takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one location is required")]
    NoLocations,
    #[error("at least one vehicle is required")]
    NoVehicles,
    #[error("depot index {depot} is out of range for {locations} locations")]
    DepotOutOfRange { depot: usize, locations: usize },
    #[error("{name} matrix is {rows}x{cols}, expected {expected}x{expected}")]
    MatrixShape {
        name: &'static str,
        rows: usize,
        cols: usize,
        expected: usize,
    },
    #[error("{name} has {actual} entries, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        actual: usize,
        expected: usize,
    },
    #[error("vehicle capacities and demands must be supplied together")]
    IncompleteCapacity,
    #[error("{name}[{index}] is negative ({value})")]
    Negative {
        name: &'static str,
        index: usize,
        value: i64,
    },
    #[error("depot demand must be 0, got {0}")]
    DepotDemand(i64),
    #[error("time window {index} starts at {start} after it ends at {end}")]
    InvertedTimeWindow { index: usize, start: i64, end: i64 },
}

/// Unexpected failure inside the search.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("location {location} is visited {count} times")]
    InconsistentVisits { location: usize, count: usize },
    #[error("route for vehicle {vehicle} violates its constraints")]
    InfeasibleRoute { vehicle: usize },
    #[error("route references unknown location {0}")]
    UnknownLocation(usize),
}

/// Environment configuration could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name}={value} is not a valid number")]
    InvalidNumber { name: &'static str, value: String },
    #[error("max elements per request must be positive")]
    ZeroElementsPerRequest,
}
