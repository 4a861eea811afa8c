//! Google Maps HTTP adapter: Distance Matrix and Geocoding.

use serde::Deserialize;
use tracing::warn;

use crate::traits::{
    GeocodedAddress, Geocoder, Location, MatrixResponse, MatrixStatus, TravelOptions, TravelTimeProvider,
};

#[derive(Debug, Clone)]
pub struct GoogleMapsConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl GoogleMapsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://maps.googleapis.com/maps/api".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleMapsClient {
    config: GoogleMapsConfig,
    client: reqwest::blocking::Client,
}

impl GoogleMapsClient {
    pub fn new(config: GoogleMapsConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }
}

impl TravelTimeProvider for GoogleMapsClient {
    fn query(&self, origins: &[Location], destinations: &[Location], options: &TravelOptions) -> MatrixResponse {
        if origins.is_empty() || destinations.is_empty() {
            return MatrixResponse::failed(MatrixStatus::InvalidRequest, "origins and destinations must not be empty");
        }

        let url = format!("{}/distancematrix/json", self.config.base_url);
        let response = self
            .client
            .get(url)
            .query(&matrix_params(origins, destinations, options, &self.config.api_key))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<MatrixResponse>());

        match response {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "distance matrix request failed");
                MatrixResponse::failed(MatrixStatus::UnknownError, err.to_string())
            }
        }
    }
}

impl Geocoder for GoogleMapsClient {
    fn resolve(&self, address: &str) -> Option<GeocodedAddress> {
        if address.trim().is_empty() {
            return None;
        }

        let url = format!("{}/geocode/json", self.config.base_url);
        let response = self
            .client
            .get(url)
            .query(&[("address", address), ("key", self.config.api_key.as_str())])
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<GeocodeResponse>());

        match response {
            Ok(body) => body.into_address(address),
            Err(err) => {
                warn!(error = %err, address, "geocoding request failed");
                None
            }
        }
    }
}

fn join(locations: &[Location]) -> String {
    locations.iter().map(Location::key).collect::<Vec<_>>().join("|")
}

fn matrix_params(
    origins: &[Location],
    destinations: &[Location],
    options: &TravelOptions,
    api_key: &str,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("origins", join(origins)),
        ("destinations", join(destinations)),
        ("mode", options.mode.as_str().to_string()),
        ("units", options.units.as_str().to_string()),
    ];

    if !options.avoid.is_empty() {
        let avoid = options.avoid.iter().map(|a| a.as_str()).collect::<Vec<_>>().join("|");
        params.push(("avoid", avoid));
    }
    if let Some(departure) = &options.departure_time {
        params.push(("departure_time", departure.clone()));
        if let Some(model) = options.traffic_model {
            params.push(("traffic_model", model.as_str().to_string()));
        }
    }

    params.push(("key", api_key.to_string()));
    params
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl GeocodeResponse {
    fn into_address(self, address: &str) -> Option<GeocodedAddress> {
        if self.status != "OK" {
            warn!(
                status = %self.status,
                message = self.error_message.as_deref().unwrap_or(""),
                address,
                "no geocoding result"
            );
            return None;
        }
        let first = self.results.into_iter().next()?;
        Some(GeocodedAddress {
            lat: first.geometry.location.lat,
            lng: first.geometry.location.lng,
            formatted_address: first.formatted_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{Avoid, ElementStatus, TrafficModel};

    #[test]
    fn parses_distance_matrix_payload() {
        let body = r#"{
            "status": "OK",
            "origin_addresses": ["A"],
            "destination_addresses": ["B", "C"],
            "rows": [{
                "elements": [
                    {"status": "OK", "distance": {"text": "1.2 km", "value": 1200}, "duration": {"text": "3 mins", "value": 180}},
                    {"status": "ZERO_RESULTS"}
                ]
            }]
        }"#;

        let response: MatrixResponse = serde_json::from_str(body).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.element(0, 0).and_then(|e| e.leg()), Some((1200, 180)));
        assert_eq!(response.element(0, 1).map(|e| e.status), Some(ElementStatus::ZeroResults));
        assert_eq!(response.element(0, 1).and_then(|e| e.leg()), None);
    }

    #[test]
    fn unknown_statuses_do_not_break_parsing() {
        let body = r#"{"status": "SOMETHING_NEW", "rows": []}"#;
        let response: MatrixResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.status, MatrixStatus::UnknownError);
    }

    #[test]
    fn builds_query_parameters() {
        let origins = vec![Location::new("1 Main St"), Location::new("x").with_coordinates(1.5, -2.25)];
        let destinations = vec![Location::new("2 Side Rd")];
        let options = TravelOptions {
            avoid: vec![Avoid::Tolls, Avoid::Ferries],
            traffic_model: Some(TrafficModel::Pessimistic),
            ..TravelOptions::default()
        };

        let params = matrix_params(&origins, &destinations, &options, "key");
        let get = |name: &str| params.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str());

        assert_eq!(get("origins"), Some("1 Main St|1.500000,-2.250000"));
        assert_eq!(get("destinations"), Some("2 Side Rd"));
        assert_eq!(get("mode"), Some("driving"));
        assert_eq!(get("avoid"), Some("tolls|ferries"));
        assert_eq!(get("departure_time"), Some("now"));
        assert_eq!(get("traffic_model"), Some("pessimistic"));
        assert_eq!(get("key"), Some("key"));
    }

    #[test]
    fn traffic_model_needs_departure_time() {
        let options = TravelOptions {
            departure_time: None,
            traffic_model: Some(TrafficModel::BestGuess),
            ..TravelOptions::default()
        };
        let params = matrix_params(&[Location::new("a")], &[Location::new("b")], &options, "key");
        assert!(params.iter().all(|(k, _)| *k != "traffic_model" && *k != "departure_time"));
    }

    #[test]
    fn geocode_takes_first_result() {
        let body = r#"{
            "status": "OK",
            "results": [
                {"formatted_address": "1 Main St, Town", "geometry": {"location": {"lat": 36.1, "lng": -115.2}}},
                {"formatted_address": "Other", "geometry": {"location": {"lat": 0.0, "lng": 0.0}}}
            ]
        }"#;
        let response: GeocodeResponse = serde_json::from_str(body).unwrap();
        let address = response.into_address("1 main st").unwrap();
        assert_eq!(address.formatted_address, "1 Main St, Town");
        assert_eq!((address.lat, address.lng), (36.1, -115.2));

        let empty: GeocodeResponse = serde_json::from_str(r#"{"status": "ZERO_RESULTS", "results": []}"#).unwrap();
        assert!(empty.into_address("nowhere").is_none());
    }
}
