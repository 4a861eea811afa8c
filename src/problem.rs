//! Immutable optimization input and the route checks derived from it.
//!
//! A [`Problem`] owns the matrices plus the optional capacity and time
//! dimensions. All route evaluation is done by pure methods on it, so the
//! solver and the extractor share one definition of feasibility and cost.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::matrix::{Matrix, TravelMatrices};

/// Upper bound for every time cumul: one day in seconds.
pub const DEFAULT_HORIZON: i64 = 86_400;

/// Waiting allowed at a stop before departing.
pub const DEFAULT_WAITING_SLACK: i64 = 30;

/// Cost per second a route runs over its vehicle's maximum time.
pub const DEFAULT_OVERTIME_PENALTY: i64 = 1_000;

/// Closed interval of seconds from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.start <= value && value <= self.end
    }

    pub fn intersect(&self, other: TimeWindow) -> Option<TimeWindow> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(TimeWindow { start, end })
    }
}

/// Cheap length and range checks shared by the planner and the builder.
///
/// Runs before any matrix is fetched so malformed requests cost nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProblemShape<'a> {
    pub locations: usize,
    pub vehicles: usize,
    pub depot: usize,
    pub capacities: Option<&'a [i64]>,
    pub demands: Option<&'a [i64]>,
    pub time_windows: Option<&'a [TimeWindow]>,
    pub max_route_time: Option<&'a [i64]>,
}

impl ProblemShape<'_> {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.locations == 0 {
            return Err(ValidationError::NoLocations);
        }
        if self.vehicles == 0 {
            return Err(ValidationError::NoVehicles);
        }
        if self.depot >= self.locations {
            return Err(ValidationError::DepotOutOfRange {
                depot: self.depot,
                locations: self.locations,
            });
        }

        match (self.capacities, self.demands) {
            (Some(capacities), Some(demands)) => {
                expect_len("vehicle_capacities", capacities.len(), self.vehicles)?;
                expect_len("demands", demands.len(), self.locations)?;
                non_negative("vehicle_capacities", capacities)?;
                non_negative("demands", demands)?;
                if demands[self.depot] != 0 {
                    return Err(ValidationError::DepotDemand(demands[self.depot]));
                }
            }
            (None, None) => {}
            _ => return Err(ValidationError::IncompleteCapacity),
        }

        if let Some(windows) = self.time_windows {
            expect_len("time_windows", windows.len(), self.locations)?;
            if let Some((index, window)) = windows.iter().enumerate().find(|(_, w)| w.start > w.end) {
                return Err(ValidationError::InvertedTimeWindow {
                    index,
                    start: window.start,
                    end: window.end,
                });
            }
        }

        if let Some(max_route_time) = self.max_route_time {
            expect_len("max_time_per_vehicle", max_route_time.len(), self.vehicles)?;
            non_negative("max_time_per_vehicle", max_route_time)?;
        }

        Ok(())
    }
}

fn expect_len(name: &'static str, actual: usize, expected: usize) -> Result<(), ValidationError> {
    if actual != expected {
        return Err(ValidationError::LengthMismatch {
            name,
            actual,
            expected,
        });
    }
    Ok(())
}

fn non_negative(name: &'static str, values: &[i64]) -> Result<(), ValidationError> {
    match values.iter().enumerate().find(|(_, value)| **value < 0) {
        Some((index, value)) => Err(ValidationError::Negative {
            name,
            index,
            value: *value,
        }),
        None => Ok(()),
    }
}

/// Inputs are validated non-negative, so clamping at `i64::MAX` keeps every
/// comparison against a capacity correct.
fn saturating_sum(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0i64, |sum, value| sum.saturating_add(value))
}

#[derive(Debug, Clone)]
struct CapacityDimension {
    capacities: Vec<i64>,
    demands: Vec<i64>,
}

#[derive(Debug, Clone)]
struct TimeDimension {
    /// Per location, already clipped to `[0, horizon]`.
    windows: Vec<TimeWindow>,
    max_route_time: Option<Vec<i64>>,
    waiting_slack: i64,
    overtime_penalty: i64,
}

/// Solver-ready description of one routing instance.
#[derive(Debug, Clone)]
pub struct Problem {
    matrices: TravelMatrices,
    num_vehicles: usize,
    depot: usize,
    capacity: Option<CapacityDimension>,
    time: Option<TimeDimension>,
}

impl Problem {
    pub fn builder(matrices: TravelMatrices, num_vehicles: usize) -> ProblemBuilder {
        ProblemBuilder::new(matrices, num_vehicles)
    }

    pub fn num_locations(&self) -> usize {
        self.matrices.size()
    }

    pub fn num_vehicles(&self) -> usize {
        self.num_vehicles
    }

    pub fn depot(&self) -> usize {
        self.depot
    }

    pub fn matrices(&self) -> &TravelMatrices {
        &self.matrices
    }

    /// Every location except the depot.
    pub fn stops(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_locations()).filter(move |&i| i != self.depot)
    }

    /// Arc cost of the ordered pair.
    pub fn distance(&self, from: usize, to: usize) -> i64 {
        self.matrices.distance.get(from, to)
    }

    pub fn travel_time(&self, from: usize, to: usize) -> i64 {
        self.matrices.time.get(from, to)
    }

    pub fn has_capacity(&self) -> bool {
        self.capacity.is_some()
    }

    pub fn has_time(&self) -> bool {
        self.time.is_some()
    }

    pub fn demand(&self, location: usize) -> i64 {
        self.capacity.as_ref().map_or(0, |c| c.demands[location])
    }

    pub fn capacity(&self, vehicle: usize) -> Option<i64> {
        self.capacity.as_ref().map(|c| c.capacities[vehicle])
    }

    pub fn total_demand(&self) -> i64 {
        self.capacity.as_ref().map_or(0, |c| saturating_sum(c.demands.iter().copied()))
    }

    pub fn total_capacity(&self) -> Option<i64> {
        self.capacity.as_ref().map(|c| saturating_sum(c.capacities.iter().copied()))
    }

    pub fn route_load(&self, stops: &[usize]) -> i64 {
        saturating_sum(stops.iter().map(|&stop| self.demand(stop)))
    }

    /// Sum of `matrix` along depot -> stops -> depot.
    pub fn route_sum(&self, matrix: &Matrix, stops: &[usize]) -> i64 {
        if stops.is_empty() {
            return 0;
        }
        let mut total = 0i64;
        let mut previous = self.depot;
        for &stop in stops.iter().chain(std::iter::once(&self.depot)) {
            total = total.saturating_add(matrix.get(previous, stop));
            previous = stop;
        }
        total
    }

    /// Cost of `stops` served by `vehicle`, or `None` if infeasible.
    ///
    /// The cost is the travelled distance plus the soft overtime penalty.
    /// Empty routes are free.
    pub fn route_cost(&self, vehicle: usize, stops: &[usize]) -> Option<i64> {
        if stops.is_empty() {
            return Some(0);
        }

        if let Some(capacity) = self.capacity(vehicle) {
            if self.route_load(stops) > capacity {
                return None;
            }
        }

        let mut cost = self.route_sum(&self.matrices.distance, stops);

        if let Some(time) = &self.time {
            let intervals = self.propagate(time, stops)?;
            if let Some(limit) = time.max_route_time.as_ref().map(|limits| limits[vehicle]) {
                let overtime = self.min_duration(&intervals, stops) - limit;
                if overtime > 0 {
                    cost = cost.saturating_add(overtime.saturating_mul(time.overtime_penalty));
                }
            }
        }

        Some(cost)
    }

    /// Feasible arrival interval at each node of depot -> stops -> depot.
    ///
    /// `None` when the time dimension is inactive or the sequence violates
    /// a window.
    pub fn arrival_windows(&self, stops: &[usize]) -> Option<Vec<TimeWindow>> {
        self.propagate(self.time.as_ref()?, stops)
    }

    /// Shortest achievable elapsed time of a route, starting as late as the
    /// windows allow.
    pub fn route_duration(&self, stops: &[usize]) -> Option<i64> {
        let intervals = self.arrival_windows(stops)?;
        Some(self.min_duration(&intervals, stops))
    }

    fn node_at(&self, stops: &[usize], position: usize) -> usize {
        match position.checked_sub(1).and_then(|k| stops.get(k)) {
            Some(&stop) => stop,
            None => self.depot,
        }
    }

    fn propagate(&self, time: &TimeDimension, stops: &[usize]) -> Option<Vec<TimeWindow>> {
        let len = stops.len() + 2;
        let mut intervals: Vec<TimeWindow> = Vec::with_capacity(len);

        for position in 0..len {
            let node = self.node_at(stops, position);
            let window = time.windows[node];
            let current = match intervals.last() {
                None => window,
                Some(previous) => {
                    let transit = self.travel_time(self.node_at(stops, position - 1), node);
                    let reachable = TimeWindow::new(
                        previous.start.saturating_add(transit),
                        previous.end.saturating_add(transit).saturating_add(time.waiting_slack),
                    );
                    reachable.intersect(window)?
                }
            };
            intervals.push(current);
        }

        for position in (0..len - 1).rev() {
            let transit = self.travel_time(
                self.node_at(stops, position),
                self.node_at(stops, position + 1),
            );
            let next = intervals[position + 1];
            let allowed = TimeWindow::new(
                next.start.saturating_sub(transit).saturating_sub(time.waiting_slack),
                next.end.saturating_sub(transit),
            );
            intervals[position] = intervals[position].intersect(allowed)?;
        }

        Some(intervals)
    }

    fn min_duration(&self, intervals: &[TimeWindow], stops: &[usize]) -> i64 {
        let Some(first) = intervals.first() else {
            return 0;
        };
        let start = first.end;
        let mut clock = start;
        for position in 1..intervals.len() {
            let transit = self.travel_time(
                self.node_at(stops, position - 1),
                self.node_at(stops, position),
            );
            clock = clock.saturating_add(transit).max(intervals[position].start);
        }
        clock - start
    }
}

/// Assembles and validates a [`Problem`].
#[derive(Debug, Clone)]
pub struct ProblemBuilder {
    matrices: TravelMatrices,
    num_vehicles: usize,
    depot: usize,
    capacities: Option<Vec<i64>>,
    demands: Option<Vec<i64>>,
    time_windows: Option<Vec<TimeWindow>>,
    max_route_time: Option<Vec<i64>>,
    waiting_slack: i64,
    horizon: i64,
    overtime_penalty: i64,
}

impl ProblemBuilder {
    pub fn new(matrices: TravelMatrices, num_vehicles: usize) -> Self {
        Self {
            matrices,
            num_vehicles,
            depot: 0,
            capacities: None,
            demands: None,
            time_windows: None,
            max_route_time: None,
            waiting_slack: DEFAULT_WAITING_SLACK,
            horizon: DEFAULT_HORIZON,
            overtime_penalty: DEFAULT_OVERTIME_PENALTY,
        }
    }

    pub fn depot(mut self, depot: usize) -> Self {
        self.depot = depot;
        self
    }

    pub fn capacities(mut self, capacities: Vec<i64>, demands: Vec<i64>) -> Self {
        self.capacities = Some(capacities);
        self.demands = Some(demands);
        self
    }

    pub fn time_windows(mut self, windows: Vec<TimeWindow>) -> Self {
        self.time_windows = Some(windows);
        self
    }

    pub fn max_route_time(mut self, limits: Vec<i64>) -> Self {
        self.max_route_time = Some(limits);
        self
    }

    pub fn waiting_slack(mut self, seconds: i64) -> Self {
        self.waiting_slack = seconds;
        self
    }

    pub fn horizon(mut self, seconds: i64) -> Self {
        self.horizon = seconds;
        self
    }

    pub fn overtime_penalty(mut self, per_second: i64) -> Self {
        self.overtime_penalty = per_second;
        self
    }

    pub fn build(self) -> Result<Problem, ValidationError> {
        let n = self.matrices.distance.size();
        if self.matrices.time.size() != n {
            return Err(ValidationError::MatrixShape {
                name: "time",
                rows: self.matrices.time.size(),
                cols: self.matrices.time.size(),
                expected: n,
            });
        }

        ProblemShape {
            locations: n,
            vehicles: self.num_vehicles,
            depot: self.depot,
            capacities: self.capacities.as_deref(),
            demands: self.demands.as_deref(),
            time_windows: self.time_windows.as_deref(),
            max_route_time: self.max_route_time.as_deref(),
        }
        .validate()?;

        let capacity = self
            .capacities
            .zip(self.demands)
            .map(|(capacities, demands)| CapacityDimension { capacities, demands });

        let day = TimeWindow::new(0, self.horizon);
        let time = if self.time_windows.is_some() || self.max_route_time.is_some() {
            // A window outside the horizon collapses to an empty one and
            // makes every route through that stop infeasible.
            let windows = match self.time_windows {
                Some(windows) => windows
                    .into_iter()
                    .map(|w| w.intersect(day).unwrap_or(TimeWindow::new(1, 0)))
                    .collect(),
                None => vec![day; n],
            };
            Some(TimeDimension {
                windows,
                max_route_time: self.max_route_time,
                waiting_slack: self.waiting_slack.max(0),
                overtime_penalty: self.overtime_penalty.max(0),
            })
        } else {
            None
        };

        Ok(Problem {
            matrices: self.matrices,
            num_vehicles: self.num_vehicles,
            depot: self.depot,
            capacity,
            time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrices(rows: Vec<Vec<i64>>) -> TravelMatrices {
        let distance = Matrix::from_rows("distance", rows).unwrap();
        TravelMatrices {
            time: distance.clone(),
            distance,
        }
    }

    fn triangle() -> TravelMatrices {
        matrices(vec![vec![0, 10, 15], vec![10, 0, 20], vec![15, 20, 0]])
    }

    #[test]
    fn rejects_depot_out_of_range() {
        let err = Problem::builder(triangle(), 1).depot(3).build().unwrap_err();
        assert_eq!(err, ValidationError::DepotOutOfRange { depot: 3, locations: 3 });
    }

    #[test]
    fn rejects_capacity_length_mismatch() {
        let err = Problem::builder(triangle(), 2)
            .capacities(vec![5], vec![0, 1, 1])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::LengthMismatch {
                name: "vehicle_capacities",
                actual: 1,
                expected: 2,
            }
        );
    }

    #[test]
    fn rejects_demand_length_mismatch() {
        let err = Problem::builder(triangle(), 1)
            .capacities(vec![5], vec![0, 1])
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::LengthMismatch { name: "demands", .. }));
    }

    #[test]
    fn rejects_time_window_length_mismatch() {
        let err = Problem::builder(triangle(), 1)
            .time_windows(vec![TimeWindow::new(0, 100)])
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::LengthMismatch { name: "time_windows", .. }));
    }

    #[test]
    fn rejects_inverted_window_and_depot_demand() {
        let err = Problem::builder(triangle(), 1)
            .time_windows(vec![TimeWindow::new(0, 100), TimeWindow::new(50, 10), TimeWindow::new(0, 100)])
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::InvertedTimeWindow { index: 1, start: 50, end: 10 });

        let err = Problem::builder(triangle(), 1)
            .capacities(vec![5], vec![1, 1, 1])
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::DepotDemand(1));
    }

    #[test]
    fn rejects_zero_vehicles() {
        let err = Problem::builder(triangle(), 0).build().unwrap_err();
        assert_eq!(err, ValidationError::NoVehicles);
    }

    #[test]
    fn route_cost_sums_arcs_and_checks_capacity() {
        let problem = Problem::builder(triangle(), 1)
            .capacities(vec![5], vec![0, 3, 4])
            .build()
            .unwrap();

        assert_eq!(problem.route_cost(0, &[]), Some(0));
        assert_eq!(problem.route_cost(0, &[1]), Some(20));
        assert_eq!(problem.route_cost(0, &[1, 2]), None);
    }

    #[test]
    fn arrival_windows_respect_slack_and_windows() {
        // depot -> 1 takes 10s and stop 1 closes at 50, so the vehicle has
        // to leave the depot by 40.
        let problem = Problem::builder(triangle(), 1)
            .time_windows(vec![
                TimeWindow::new(0, 1_000),
                TimeWindow::new(35, 50),
                TimeWindow::new(0, 1_000),
            ])
            .build()
            .unwrap();

        let windows = problem.arrival_windows(&[1]).unwrap();
        assert_eq!(windows[0], TimeWindow::new(0, 40));
        assert_eq!(windows[1], TimeWindow::new(35, 50));
        assert_eq!(windows[2], TimeWindow::new(45, 90));
        assert_eq!(problem.route_duration(&[1]), Some(20));
    }

    #[test]
    fn windows_that_cannot_be_met_are_infeasible() {
        let problem = Problem::builder(triangle(), 1)
            .time_windows(vec![
                TimeWindow::new(0, 1_000),
                TimeWindow::new(0, 5),
                TimeWindow::new(0, 1_000),
            ])
            .build()
            .unwrap();

        assert!(problem.arrival_windows(&[1]).is_none());
        assert_eq!(problem.route_cost(0, &[1]), None);
        assert!(problem.route_cost(0, &[2]).is_some());
    }

    #[test]
    fn huge_capacities_do_not_overflow_totals() {
        let problem = Problem::builder(triangle(), 2)
            .capacities(vec![i64::MAX, i64::MAX], vec![0, 1, 1])
            .build()
            .unwrap();

        assert_eq!(problem.total_capacity(), Some(i64::MAX));
        assert_eq!(problem.total_demand(), 2);
        assert_eq!(problem.route_cost(0, &[1, 2]), Some(45));
    }

    #[test]
    fn waiting_is_capped_by_slack() {
        // Stop 1 closes at 20 and stop 2 opens at 200, 10s later: the
        // vehicle would have to idle far longer than the default slack.
        let windows = vec![
            TimeWindow::new(0, 1_000),
            TimeWindow::new(0, 20),
            TimeWindow::new(200, 300),
        ];
        let strict = Problem::builder(matrices(vec![vec![0, 10, 20], vec![10, 0, 10], vec![20, 10, 0]]), 1)
            .time_windows(windows.clone())
            .build()
            .unwrap();
        assert_eq!(strict.route_cost(0, &[1, 2]), None);
        assert!(strict.route_cost(0, &[1]).is_some());

        let patient = Problem::builder(matrices(vec![vec![0, 10, 20], vec![10, 0, 10], vec![20, 10, 0]]), 1)
            .time_windows(windows)
            .waiting_slack(500)
            .build()
            .unwrap();
        assert_eq!(patient.route_cost(0, &[1, 2]), Some(40));
        assert_eq!(patient.arrival_windows(&[1, 2]).unwrap()[2], TimeWindow::new(200, 300));
    }

    #[test]
    fn windows_beyond_the_horizon_are_infeasible() {
        let windows = vec![
            TimeWindow::new(0, 100_000),
            TimeWindow::new(90_000, 95_000),
            TimeWindow::new(0, 100_000),
        ];

        let day = Problem::builder(triangle(), 1).time_windows(windows.clone()).build().unwrap();
        assert_eq!(day.route_cost(0, &[1]), None);
        assert!(day.route_cost(0, &[2]).is_some());
        // The depot closes at the horizon, whatever was asked for.
        assert_eq!(day.arrival_windows(&[2]).unwrap()[2].end, DEFAULT_HORIZON);

        let longer = Problem::builder(triangle(), 1)
            .time_windows(windows)
            .horizon(100_000)
            .build()
            .unwrap();
        assert!(longer.route_cost(0, &[1]).is_some());
    }

    #[test]
    fn overtime_is_penalised_not_forbidden() {
        let problem = Problem::builder(triangle(), 1)
            .max_route_time(vec![40])
            .build()
            .unwrap();

        // 10 + 20 + 15 = 45 seconds, 5 over the limit.
        assert_eq!(problem.route_cost(0, &[1, 2]), Some(45 + 5 * DEFAULT_OVERTIME_PENALTY));
        assert_eq!(problem.route_cost(0, &[1]), Some(20));
    }
}
