//! Turns a solver assignment into the reported route structure.

use serde::{Deserialize, Serialize};

use crate::problem::{Problem, TimeWindow};
use crate::solver::Assignment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolutionStatus {
    Ok,
    NoSolution,
    Error,
}

/// One node of a route, depot included at both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopVisit {
    pub location_index: usize,
    /// Load carried after serving this node, when capacities are active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<i64>,
    /// Feasible arrival interval, when the time dimension is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival: Option<TimeWindow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSolution {
    pub vehicle_id: usize,
    pub stops: Vec<StopVisit>,
    pub distance: i64,
    pub time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<i64>,
}

impl RouteSolution {
    pub fn location_indices(&self) -> Vec<usize> {
        self.stops.iter().map(|stop| stop.location_index).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub status: SolutionStatus,
    pub routes: Vec<RouteSolution>,
    pub total_distance: i64,
    pub total_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Solution {
    pub fn no_solution() -> Self {
        Self::failed(SolutionStatus::NoSolution, "no feasible solution found")
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::failed(SolutionStatus::Error, message)
    }

    fn failed(status: SolutionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            routes: Vec::new(),
            total_distance: 0,
            total_time: 0,
            message: Some(message.into()),
        }
    }
}

/// Walks each vehicle's route from depot to depot.
///
/// Vehicles serving no stop are left out. Distance and time are the matrix
/// sums along consecutive nodes; the overtime penalty is not included.
pub fn extract(problem: &Problem, assignment: &Assignment) -> Solution {
    let depot = problem.depot();
    let mut routes = Vec::new();

    for (vehicle_id, stops) in assignment.routes().iter().enumerate() {
        if stops.is_empty() {
            continue;
        }

        let nodes = std::iter::once(depot)
            .chain(stops.iter().copied())
            .chain(std::iter::once(depot))
            .collect::<Vec<_>>();
        let arrivals = problem.arrival_windows(stops);

        let mut load = 0i64;
        let visits = nodes
            .iter()
            .enumerate()
            .map(|(position, &location_index)| {
                if position > 0 && position < nodes.len() - 1 {
                    load += problem.demand(location_index);
                }
                StopVisit {
                    location_index,
                    load: problem.has_capacity().then_some(load),
                    arrival: arrivals.as_ref().and_then(|windows| windows.get(position).copied()),
                }
            })
            .collect::<Vec<_>>();

        routes.push(RouteSolution {
            vehicle_id,
            stops: visits,
            distance: problem.route_sum(&problem.matrices().distance, stops),
            time: problem.route_sum(&problem.matrices().time, stops),
            load: problem.has_capacity().then(|| problem.route_load(stops)),
        });
    }

    Solution {
        status: SolutionStatus::Ok,
        total_distance: routes.iter().map(|route| route.distance).sum(),
        total_time: routes.iter().map(|route| route.time).sum(),
        routes,
        message: None,
    }
}
