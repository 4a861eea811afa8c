//! Boundaries to the external collaborators of the engine.
//!
//! The travel-time and geocoding services are consumed through these traits
//! so that the matrix provider and planner can be driven by real HTTP
//! adapters or by deterministic fakes. The wire types mirror the
//! distance-matrix response shape: a top-level status plus a grid of
//! per-element results.

use serde::{Deserialize, Serialize};

/// A stop or depot as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

impl Location {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            lat: None,
            lng: None,
        }
    }

    pub fn with_coordinates(mut self, lat: f64, lng: f64) -> Self {
        self.lat = Some(lat);
        self.lng = Some(lng);
        self
    }

    /// Resolved (lat, lng), if both halves are known.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lng)
    }

    /// Identity used when talking to travel-time services and in cache keys.
    ///
    /// Coordinates win over the address because they are unambiguous.
    pub fn key(&self) -> String {
        match self.coordinates() {
            Some((lat, lng)) => format!("{:.6},{:.6}", lat, lng),
            None => self.address.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Bicycling,
    Transit,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
            TravelMode::Transit => "transit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Avoid {
    Tolls,
    Highways,
    Ferries,
}

impl Avoid {
    pub fn as_str(&self) -> &'static str {
        match self {
            Avoid::Tolls => "tolls",
            Avoid::Highways => "highways",
            Avoid::Ferries => "ferries",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficModel {
    BestGuess,
    Pessimistic,
    Optimistic,
}

impl TrafficModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficModel::BestGuess => "best_guess",
            TrafficModel::Pessimistic => "pessimistic",
            TrafficModel::Optimistic => "optimistic",
        }
    }
}

/// Request options forwarded to the travel-time service.
///
/// Every field participates in the matrix cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TravelOptions {
    pub mode: TravelMode,
    #[serde(default)]
    pub avoid: Vec<Avoid>,
    pub units: Units,
    /// `"now"` or seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<String>,
    /// Only meaningful together with a departure time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_model: Option<TrafficModel>,
}

impl Default for TravelOptions {
    fn default() -> Self {
        Self {
            mode: TravelMode::Driving,
            avoid: Vec::new(),
            units: Units::Metric,
            departure_time: Some("now".to_string()),
            traffic_model: None,
        }
    }
}

/// Top-level status of a distance-matrix call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatrixStatus {
    Ok,
    InvalidRequest,
    MaxElementsExceeded,
    MaxDimensionsExceeded,
    OverDailyLimit,
    OverQueryLimit,
    RequestDenied,
    #[serde(other)]
    UnknownError,
}

/// Per-element status. Anything but `Ok` maps to the unreachable sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementStatus {
    Ok,
    NotFound,
    ZeroResults,
    MaxRouteLengthExceeded,
    #[serde(other)]
    NotCalculated,
}

/// A measured quantity: meters for distance, seconds for duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub value: i64,
    #[serde(default)]
    pub text: String,
}

impl Measure {
    pub fn new(value: i64) -> Self {
        Self {
            value,
            text: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixElement {
    pub status: ElementStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<Measure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Measure>,
}

impl MatrixElement {
    pub fn ok(distance: i64, duration: i64) -> Self {
        Self {
            status: ElementStatus::Ok,
            distance: Some(Measure::new(distance)),
            duration: Some(Measure::new(duration)),
        }
    }

    pub fn failed(status: ElementStatus) -> Self {
        Self {
            status,
            distance: None,
            duration: None,
        }
    }

    /// (distance, duration) when the element resolved successfully.
    pub fn leg(&self) -> Option<(i64, i64)> {
        if self.status != ElementStatus::Ok {
            return None;
        }
        let distance = self.distance.as_ref()?.value;
        let duration = self.duration.as_ref()?.value;
        (distance >= 0 && duration >= 0).then_some((distance, duration))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub elements: Vec<MatrixElement>,
}

/// Raw response of one travel-time query, rows follow the origin order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixResponse {
    pub status: MatrixStatus,
    #[serde(default)]
    pub rows: Vec<MatrixRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl MatrixResponse {
    pub fn new(rows: Vec<MatrixRow>) -> Self {
        Self {
            status: MatrixStatus::Ok,
            rows,
            error_message: None,
        }
    }

    pub fn failed(status: MatrixStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            rows: Vec::new(),
            error_message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == MatrixStatus::Ok
    }

    pub fn element(&self, origin: usize, destination: usize) -> Option<&MatrixElement> {
        self.rows.get(origin)?.elements.get(destination)
    }
}

/// Result of resolving an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedAddress {
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: String,
}

/// A travel-time service answering origin x destination queries.
///
/// Implementations never fail with a Rust error: outages are reported
/// through [`MatrixResponse::status`] so callers can degrade gracefully.
pub trait TravelTimeProvider: Sync {
    fn query(
        &self,
        origins: &[Location],
        destinations: &[Location],
        options: &TravelOptions,
    ) -> MatrixResponse;
}

/// Resolves an address to coordinates.
pub trait Geocoder: Sync {
    fn resolve(&self, address: &str) -> Option<GeocodedAddress>;
}

/// Geocoder that never resolves anything, for callers supplying coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipGeocoding;

impl Geocoder for SkipGeocoding {
    fn resolve(&self, _address: &str) -> Option<GeocodedAddress> {
        None
    }
}
