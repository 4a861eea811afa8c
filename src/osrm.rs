//! OSRM HTTP adapter for travel-time blocks.
//!
//! Uses the `table` service with explicit `sources` and `destinations`, so
//! one call answers exactly one origin x destination block.

use serde::Deserialize;
use tracing::warn;

use crate::traits::{
    Avoid, ElementStatus, Location, MatrixElement, MatrixResponse, MatrixRow, MatrixStatus, TravelOptions,
    TravelTimeProvider,
};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }
}

impl TravelTimeProvider for OsrmClient {
    fn query(&self, origins: &[Location], destinations: &[Location], options: &TravelOptions) -> MatrixResponse {
        if origins.is_empty() || destinations.is_empty() {
            return MatrixResponse::failed(MatrixStatus::InvalidRequest, "origins and destinations must not be empty");
        }

        let coordinates = origins
            .iter()
            .chain(destinations)
            .map(Location::coordinates)
            .collect::<Option<Vec<_>>>();
        let Some(coordinates) = coordinates else {
            return MatrixResponse::failed(MatrixStatus::InvalidRequest, "OSRM needs coordinates for every location");
        };

        let url = table_url(&self.config, &coordinates, origins.len(), options);
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<OsrmTableResponse>());

        match response {
            Ok(body) => body.into_matrix(origins.len(), destinations.len()),
            Err(err) => {
                warn!(error = %err, "OSRM table request failed");
                MatrixResponse::failed(MatrixStatus::UnknownError, err.to_string())
            }
        }
    }
}

fn table_url(config: &OsrmConfig, coordinates: &[(f64, f64)], sources: usize, options: &TravelOptions) -> String {
    let coords = coordinates
        .iter()
        .map(|(lat, lng)| format!("{:.6},{:.6}", lng, lat))
        .collect::<Vec<_>>()
        .join(";");
    let indices = |range: std::ops::Range<usize>| range.map(|i| i.to_string()).collect::<Vec<_>>().join(";");

    let mut url = format!(
        "{}/table/v1/{}/{}?sources={}&destinations={}&annotations=duration,distance",
        config.base_url,
        config.profile,
        coords,
        indices(0..sources),
        indices(sources..coordinates.len()),
    );

    let mut exclude = options
        .avoid
        .iter()
        .map(|avoid| match avoid {
            Avoid::Tolls => "toll",
            Avoid::Highways => "motorway",
            Avoid::Ferries => "ferry",
        })
        .collect::<Vec<_>>();
    exclude.sort_unstable();
    exclude.dedup();
    if !exclude.is_empty() {
        url.push_str("&exclude=");
        url.push_str(&exclude.join(","));
    }
    url
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    message: Option<String>,
    durations: Option<Vec<Vec<Option<f64>>>>,
    distances: Option<Vec<Vec<Option<f64>>>>,
}

impl OsrmTableResponse {
    fn into_matrix(self, rows: usize, cols: usize) -> MatrixResponse {
        if self.code != "Ok" {
            let status = match self.code.as_str() {
                "TooBig" => MatrixStatus::MaxElementsExceeded,
                "InvalidQuery" | "InvalidValue" | "InvalidOptions" => MatrixStatus::InvalidRequest,
                _ => MatrixStatus::UnknownError,
            };
            return MatrixResponse::failed(status, self.message.unwrap_or(self.code));
        }

        let cell = |values: &Option<Vec<Vec<Option<f64>>>>, i: usize, j: usize| {
            values.as_ref()?.get(i)?.get(j).copied().flatten()
        };

        let rows = (0..rows)
            .map(|i| MatrixRow {
                elements: (0..cols)
                    .map(|j| match (cell(&self.distances, i, j), cell(&self.durations, i, j)) {
                        (Some(meters), Some(seconds)) => {
                            MatrixElement::ok(meters.round() as i64, seconds.round() as i64)
                        }
                        _ => MatrixElement::failed(ElementStatus::ZeroResults),
                    })
                    .collect(),
            })
            .collect();

        MatrixResponse::new(rows)
    }
}
