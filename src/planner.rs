//! Solve request boundary: addresses in, routes out.
//!
//! Data flows one way: locations are geocoded when a geocoder is configured,
//! matrices are built through the cached [`MatrixProvider`], the problem is
//! assembled and solved, and the solution is reported with addresses.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::ValidationError;
use crate::matrix::MatrixProvider;
use crate::problem::{Problem, ProblemShape, TimeWindow};
use crate::solution::{Solution, SolutionStatus, extract};
use crate::solver::{SolveOptions, SolveOutcome, solve};
use crate::traits::{Geocoder, Location, SkipGeocoding, TravelTimeProvider};

fn default_vehicles() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveRequest {
    pub locations: Vec<Location>,
    #[serde(default = "default_vehicles")]
    pub num_vehicles: usize,
    #[serde(default)]
    pub depot_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_capacities: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demands: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_windows: Option<Vec<TimeWindow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_per_vehicle: Option<Vec<i64>>,
}

impl SolveRequest {
    pub fn new(locations: Vec<Location>, num_vehicles: usize) -> Self {
        Self {
            locations,
            num_vehicles,
            depot_index: 0,
            vehicle_capacities: None,
            demands: None,
            time_windows: None,
            max_time_per_vehicle: None,
        }
    }

    pub fn shape(&self) -> ProblemShape<'_> {
        ProblemShape {
            locations: self.locations.len(),
            vehicles: self.num_vehicles,
            depot: self.depot_index,
            capacities: self.vehicle_capacities.as_deref(),
            demands: self.demands.as_deref(),
            time_windows: self.time_windows.as_deref(),
            max_route_time: self.max_time_per_vehicle.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    pub location_index: usize,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_arrival: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_arrival: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub vehicle_id: usize,
    pub stops: Vec<RouteStop>,
    pub distance: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveResponse {
    pub status: SolutionStatus,
    pub routes: Vec<RouteResponse>,
    pub total_distance: i64,
    pub total_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SolveResponse {
    /// Attaches addresses to the solution's location indices.
    pub fn from_solution(solution: Solution, locations: &[Location]) -> Self {
        let routes = solution
            .routes
            .into_iter()
            .map(|route| RouteResponse {
                vehicle_id: route.vehicle_id,
                stops: route
                    .stops
                    .into_iter()
                    .map(|stop| RouteStop {
                        location_index: stop.location_index,
                        address: locations
                            .get(stop.location_index)
                            .map(|location| location.address.clone())
                            .unwrap_or_default(),
                        load: stop.load,
                        earliest_arrival: stop.arrival.map(|window| window.start),
                        latest_arrival: stop.arrival.map(|window| window.end),
                    })
                    .collect(),
                distance: route.distance,
                time: Some(route.time),
                load: route.load,
            })
            .collect();

        Self {
            status: solution.status,
            routes,
            total_distance: solution.total_distance,
            total_time: solution.total_time,
            message: solution.message,
        }
    }
}

/// Entry point tying geocoding, matrices and the solver together.
///
/// Holds no per-request state; `plan` may be called from several threads.
pub struct RoutePlanner<P, G = SkipGeocoding> {
    matrices: MatrixProvider<P>,
    geocoder: G,
    options: SolveOptions,
}

impl<P: TravelTimeProvider> RoutePlanner<P> {
    pub fn new(matrices: MatrixProvider<P>, options: SolveOptions) -> Self {
        Self {
            matrices,
            geocoder: SkipGeocoding,
            options,
        }
    }
}

impl<P: TravelTimeProvider, G: Geocoder> RoutePlanner<P, G> {
    pub fn with_geocoder<H: Geocoder>(self, geocoder: H) -> RoutePlanner<P, H> {
        RoutePlanner {
            matrices: self.matrices,
            geocoder,
            options: self.options,
        }
    }

    pub fn matrices(&self) -> &MatrixProvider<P> {
        &self.matrices
    }

    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    /// Solves one request.
    ///
    /// Malformed input is an `Err`; infeasibility and solver failures are
    /// reported through [`SolveResponse::status`].
    pub fn plan(&self, request: &SolveRequest) -> Result<SolveResponse, ValidationError> {
        request.shape().validate()?;

        let locations = self.resolve_locations(&request.locations);
        let matrices = self.matrices.build(&locations)?;

        let mut builder = Problem::builder(matrices, request.num_vehicles).depot(request.depot_index);
        if let (Some(capacities), Some(demands)) = (&request.vehicle_capacities, &request.demands) {
            builder = builder.capacities(capacities.clone(), demands.clone());
        }
        if let Some(windows) = &request.time_windows {
            builder = builder.time_windows(windows.clone());
        }
        if let Some(limits) = &request.max_time_per_vehicle {
            builder = builder.max_route_time(limits.clone());
        }
        let problem = builder.build()?;

        let solution = match solve(&problem, &self.options) {
            Ok(SolveOutcome::Solved(assignment)) => extract(&problem, &assignment),
            Ok(SolveOutcome::Infeasible) => Solution::no_solution(),
            Err(err) => {
                error!(error = %err, "solver failed");
                Solution::error(err.to_string())
            }
        };

        info!(
            status = ?solution.status,
            routes = solution.routes.len(),
            total_distance = solution.total_distance,
            "routing request finished"
        );

        Ok(SolveResponse::from_solution(solution, &request.locations))
    }

    /// Fills in coordinates for locations that lack them.
    fn resolve_locations(&self, locations: &[Location]) -> Vec<Location> {
        locations
            .par_iter()
            .map(|location| {
                if location.coordinates().is_some() {
                    return location.clone();
                }
                match self.geocoder.resolve(&location.address) {
                    Some(found) => location.clone().with_coordinates(found.lat, found.lng),
                    None => {
                        debug!(address = %location.address, "address left unresolved");
                        location.clone()
                    }
                }
            })
            .collect()
    }
}
