//! Engine configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use crate::cache::{MatrixCache, TtlCache};
use crate::error::ConfigError;
use crate::google::GoogleMapsConfig;
use crate::matrix::{DEFAULT_MAX_ELEMENTS, MatrixSettings};
use crate::solver::{DEFAULT_TIME_LIMIT, SolveOptions};
use crate::traits::{GeocodedAddress, TravelOptions};

const DAY: Duration = Duration::from_secs(86_400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub capacity: usize,
    pub ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub google_maps_api_key: Option<String>,
    pub distance_matrix_cache: CacheSettings,
    pub geocoding_cache: CacheSettings,
    pub max_elements_per_request: usize,
    pub solver_time_limit: Duration,
    pub travel: TravelOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            google_maps_api_key: None,
            distance_matrix_cache: CacheSettings {
                capacity: 10_000,
                ttl: DAY,
            },
            geocoding_cache: CacheSettings {
                capacity: 1_000,
                ttl: DAY,
            },
            max_elements_per_request: DEFAULT_MAX_ELEMENTS,
            solver_time_limit: DEFAULT_TIME_LIMIT,
            travel: TravelOptions::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`, falling back to defaults for unset
    /// or empty variables.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let read = |name: &str| lookup(name).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

        let max_elements_per_request = parse(
            "MAX_ELEMENTS_PER_REQUEST",
            read("MAX_ELEMENTS_PER_REQUEST"),
            defaults.max_elements_per_request,
        )?;
        if max_elements_per_request == 0 {
            return Err(ConfigError::ZeroElementsPerRequest);
        }

        Ok(Self {
            google_maps_api_key: read("GOOGLE_MAPS_API_KEY"),
            distance_matrix_cache: CacheSettings {
                capacity: parse(
                    "DISTANCE_MATRIX_CACHE_SIZE",
                    read("DISTANCE_MATRIX_CACHE_SIZE"),
                    defaults.distance_matrix_cache.capacity,
                )?,
                ttl: Duration::from_secs(parse(
                    "DISTANCE_MATRIX_CACHE_TTL",
                    read("DISTANCE_MATRIX_CACHE_TTL"),
                    defaults.distance_matrix_cache.ttl.as_secs(),
                )?),
            },
            geocoding_cache: CacheSettings {
                capacity: parse(
                    "GEOCODING_CACHE_SIZE",
                    read("GEOCODING_CACHE_SIZE"),
                    defaults.geocoding_cache.capacity,
                )?,
                ttl: Duration::from_secs(parse(
                    "GEOCODING_CACHE_TTL",
                    read("GEOCODING_CACHE_TTL"),
                    defaults.geocoding_cache.ttl.as_secs(),
                )?),
            },
            max_elements_per_request,
            solver_time_limit: Duration::from_secs(parse(
                "SOLVER_TIME_LIMIT_SECS",
                read("SOLVER_TIME_LIMIT_SECS"),
                defaults.solver_time_limit.as_secs(),
            )?),
            travel: defaults.travel,
        })
    }

    /// Google Maps client settings, when an API key is configured.
    pub fn google_maps(&self) -> Option<GoogleMapsConfig> {
        self.google_maps_api_key.as_deref().map(GoogleMapsConfig::new)
    }

    pub fn matrix_cache(&self) -> MatrixCache {
        TtlCache::new(self.distance_matrix_cache.capacity, self.distance_matrix_cache.ttl)
    }

    pub fn geocoding_cache(&self) -> TtlCache<String, GeocodedAddress> {
        TtlCache::new(self.geocoding_cache.capacity, self.geocoding_cache.ttl)
    }

    pub fn matrix_settings(&self) -> MatrixSettings {
        MatrixSettings {
            max_elements_per_request: self.max_elements_per_request,
            options: self.travel.clone(),
        }
    }

    pub fn solve_options(&self) -> SolveOptions {
        SolveOptions {
            time_limit: self.solver_time_limit,
            ..SolveOptions::default()
        }
    }
}

fn parse<T: FromStr>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        EngineConfig::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config(&[]).unwrap(), EngineConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("GOOGLE_MAPS_API_KEY", "secret"),
            ("DISTANCE_MATRIX_CACHE_SIZE", "50"),
            ("DISTANCE_MATRIX_CACHE_TTL", "120"),
            ("MAX_ELEMENTS_PER_REQUEST", "25"),
            ("SOLVER_TIME_LIMIT_SECS", " 5 "),
        ])
        .unwrap();

        assert_eq!(config.google_maps().map(|google| google.api_key), Some("secret".to_string()));
        assert_eq!(config.distance_matrix_cache.capacity, 50);
        assert_eq!(config.distance_matrix_cache.ttl, Duration::from_secs(120));
        assert_eq!(config.matrix_settings().max_elements_per_request, 25);
        assert_eq!(config.solve_options().time_limit, Duration::from_secs(5));
    }

    #[test]
    fn empty_key_counts_as_unset() {
        let config = config(&[("GOOGLE_MAPS_API_KEY", "")]).unwrap();
        assert_eq!(config.google_maps_api_key, None);
        assert!(config.google_maps().is_none());
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err = config(&[("GEOCODING_CACHE_TTL", "a day")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                name: "GEOCODING_CACHE_TTL",
                value: "a day".to_string(),
            }
        );
        assert_eq!(
            config(&[("MAX_ELEMENTS_PER_REQUEST", "0")]).unwrap_err(),
            ConfigError::ZeroElementsPerRequest
        );
    }
}
