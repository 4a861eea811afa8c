//! Routing solver: greedy construction followed by guided local search.
//!
//! `solve` is a pure function of the problem and options. All search state
//! lives in a [`Search`] value local to the call, so independent problems can
//! be solved concurrently.

use std::iter;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::SolverError;
use crate::problem::Problem;

pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(30);

/// Scale applied to arc costs before dividing by the penalty count, so that
/// utilities of cheap arcs do not all round to the same integer.
const UTILITY_SCALE: i64 = 1_000;

#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Wall-clock budget for the whole search.
    pub time_limit: Duration,
    /// Maximum number of guided local search rounds.
    pub max_iterations: usize,
    /// Penalty weight, as a percentage of the average arc cost of the first
    /// local optimum.
    pub penalty_weight_percent: i64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            time_limit: DEFAULT_TIME_LIMIT,
            max_iterations: 10_000,
            penalty_weight_percent: 10,
        }
    }
}

/// Stops served by each vehicle, depot excluded, indexed by vehicle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    routes: Vec<Vec<usize>>,
}

impl Assignment {
    pub fn new(routes: Vec<Vec<usize>>) -> Self {
        Self { routes }
    }

    pub fn empty(num_vehicles: usize) -> Self {
        Self {
            routes: vec![Vec::new(); num_vehicles],
        }
    }

    pub fn routes(&self) -> &[Vec<usize>] {
        &self.routes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    Solved(Assignment),
    /// No assignment satisfies the hard constraints.
    Infeasible,
}

pub fn solve(problem: &Problem, options: &SolveOptions) -> Result<SolveOutcome, SolverError> {
    let started = Instant::now();
    let deadline = started.checked_add(options.time_limit);
    let stops = problem.stops().collect::<Vec<_>>();

    info!(
        locations = problem.num_locations(),
        vehicles = problem.num_vehicles(),
        capacity = problem.has_capacity(),
        time = problem.has_time(),
        "solving routing problem"
    );

    if stops.is_empty() {
        return Ok(SolveOutcome::Solved(Assignment::empty(problem.num_vehicles())));
    }

    if let Some(total_capacity) = problem.total_capacity() {
        let total_demand = problem.total_demand();
        if total_demand > total_capacity {
            info!(total_demand, total_capacity, "demand exceeds fleet capacity");
            return Ok(SolveOutcome::Infeasible);
        }
    }

    let Some(routes) = construct(problem, &stops) else {
        info!("no feasible initial assignment");
        return Ok(SolveOutcome::Infeasible);
    };

    let mut search = Search::new(problem, routes, deadline)?;
    let initial_cost = search.best_cost;
    let rounds = search.run(options);

    info!(
        initial_cost,
        best_cost = search.best_cost,
        rounds,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "search finished"
    );

    let best = search.best;
    verify(problem, &best)?;
    Ok(SolveOutcome::Solved(Assignment::new(best)))
}

/// Arcs of depot -> stops -> depot.
fn arcs(depot: usize, stops: &[usize]) -> impl Iterator<Item = (usize, usize)> + '_ {
    iter::once(depot)
        .chain(stops.iter().copied())
        .zip(stops.iter().copied().chain(iter::once(depot)))
}

// ============================================================================
// Construction
// ============================================================================

fn construct(problem: &Problem, stops: &[usize]) -> Option<Vec<Vec<usize>>> {
    let (mut routes, stranded) = path_cheapest_arc(problem, stops);
    let mut costs = routes
        .iter()
        .enumerate()
        .map(|(vehicle, route)| problem.route_cost(vehicle, route))
        .collect::<Option<Vec<_>>>()?;

    if insert_remaining(problem, &mut routes, &mut costs, stranded) {
        return Some(routes);
    }

    debug!("path-cheapest-arc stranded stops, retrying with cheapest insertion");
    let vehicles = problem.num_vehicles();
    let mut routes = vec![Vec::new(); vehicles];
    let mut costs = vec![0; vehicles];
    insert_remaining(problem, &mut routes, &mut costs, stops.to_vec()).then_some(routes)
}

/// Extends each vehicle's route with the cheapest feasible arc until no
/// pending stop fits, then moves on to the next vehicle.
///
/// Returns the routes and the stops no vehicle could take.
fn path_cheapest_arc(problem: &Problem, stops: &[usize]) -> (Vec<Vec<usize>>, Vec<usize>) {
    let mut pending = stops.to_vec();
    let mut routes = Vec::with_capacity(problem.num_vehicles());

    for vehicle in 0..problem.num_vehicles() {
        let mut route: Vec<usize> = Vec::new();
        loop {
            let current = route.last().copied().unwrap_or(problem.depot());
            let mut candidates = pending.clone();
            candidates.sort_by_key(|&next| (problem.distance(current, next), next));

            let chosen = candidates.into_iter().find(|&next| {
                route.push(next);
                let feasible = problem.route_cost(vehicle, &route).is_some();
                route.pop();
                feasible
            });

            match chosen {
                Some(next) => {
                    route.push(next);
                    pending.retain(|&stop| stop != next);
                }
                None => break,
            }
        }
        routes.push(route);
    }

    (routes, pending)
}

/// Repeatedly performs the globally cheapest feasible insertion.
///
/// Returns false if some stop fits nowhere.
fn insert_remaining(
    problem: &Problem,
    routes: &mut [Vec<usize>],
    costs: &mut [i64],
    mut pending: Vec<usize>,
) -> bool {
    while !pending.is_empty() {
        // (delta, pending index, vehicle, position, new route cost)
        let mut best: Option<(i64, usize, usize, usize, i64)> = None;

        for (index, &stop) in pending.iter().enumerate() {
            for (vehicle, route) in routes.iter().enumerate() {
                for position in 0..=route.len() {
                    let mut candidate = route.clone();
                    candidate.insert(position, stop);
                    let Some(cost) = problem.route_cost(vehicle, &candidate) else {
                        continue;
                    };
                    let delta = cost.saturating_sub(costs[vehicle]);
                    if best.is_none_or(|(best_delta, ..)| delta < best_delta) {
                        best = Some((delta, index, vehicle, position, cost));
                    }
                }
            }
        }

        let Some((_, index, vehicle, position, cost)) = best else {
            return false;
        };
        let stop = pending.remove(index);
        routes[vehicle].insert(position, stop);
        costs[vehicle] = cost;
    }
    true
}

// ============================================================================
// Guided Local Search
// ============================================================================

/// Directed arc penalty counts.
struct ArcPenalties {
    size: usize,
    counts: Vec<i64>,
}

impl ArcPenalties {
    fn new(size: usize) -> Self {
        Self {
            size,
            counts: vec![0; size * size],
        }
    }

    fn get(&self, from: usize, to: usize) -> i64 {
        self.counts[from * self.size + to]
    }

    fn bump(&mut self, from: usize, to: usize) {
        self.counts[from * self.size + to] += 1;
    }

    fn along(&self, depot: usize, stops: &[usize]) -> i64 {
        if stops.is_empty() {
            return 0;
        }
        arcs(depot, stops).map(|(from, to)| self.get(from, to)).sum()
    }
}

struct Search<'a> {
    problem: &'a Problem,
    deadline: Option<Instant>,
    routes: Vec<Vec<usize>>,
    /// True cost of each route.
    costs: Vec<i64>,
    /// Cost of each route including arc penalties; what moves minimise.
    augmented: Vec<i64>,
    penalties: ArcPenalties,
    lambda: i64,
    best: Vec<Vec<usize>>,
    best_cost: i64,
}

impl<'a> Search<'a> {
    fn new(problem: &'a Problem, routes: Vec<Vec<usize>>, deadline: Option<Instant>) -> Result<Self, SolverError> {
        let costs = routes
            .iter()
            .enumerate()
            .map(|(vehicle, route)| {
                problem
                    .route_cost(vehicle, route)
                    .ok_or(SolverError::InfeasibleRoute { vehicle })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let best_cost = total(&costs);

        Ok(Self {
            problem,
            deadline,
            best: routes.clone(),
            augmented: costs.clone(),
            routes,
            costs,
            penalties: ArcPenalties::new(problem.num_locations()),
            lambda: 0,
            best_cost,
        })
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Runs local search to a first optimum, then keeps penalising its most
    /// expensive arcs and re-descending until the budget runs out.
    fn run(&mut self, options: &SolveOptions) -> usize {
        self.descend();

        let arc_count = self
            .routes
            .iter()
            .filter(|route| !route.is_empty())
            .map(|route| route.len() as i64 + 1)
            .sum::<i64>();
        if arc_count == 0 {
            return 0;
        }
        self.lambda = (total(&self.costs).saturating_mul(options.penalty_weight_percent) / (100 * arc_count)).max(1);

        let mut rounds = 0;
        while rounds < options.max_iterations && !self.expired() {
            self.penalize();
            self.descend();
            rounds += 1;
        }
        rounds
    }

    fn descend(&mut self) {
        while !self.expired() {
            let improved = self.two_opt() || self.relocate() || self.swap() || self.two_opt_star();
            if !improved {
                break;
            }
        }
    }

    fn evaluate(&self, vehicle: usize, stops: &[usize]) -> Option<(i64, i64)> {
        let cost = self.problem.route_cost(vehicle, stops)?;
        let penalty = self.lambda.saturating_mul(self.penalties.along(self.problem.depot(), stops));
        Some((cost, cost.saturating_add(penalty)))
    }

    fn apply(&mut self, vehicle: usize, stops: Vec<usize>, (cost, augmented): (i64, i64)) {
        self.routes[vehicle] = stops;
        self.costs[vehicle] = cost;
        self.augmented[vehicle] = augmented;
    }

    fn record(&mut self) {
        let cost = total(&self.costs);
        if cost < self.best_cost {
            debug!(cost, "new best solution");
            self.best_cost = cost;
            self.best = self.routes.clone();
        }
    }

    /// Penalises the arcs of the current solution with maximal utility
    /// `cost / (1 + penalty)`.
    fn penalize(&mut self) {
        let depot = self.problem.depot();
        let mut best_utility = i64::MIN;
        let mut selected: Vec<(usize, usize)> = Vec::new();

        for route in self.routes.iter().filter(|route| !route.is_empty()) {
            for (from, to) in arcs(depot, route) {
                let utility = self.problem.distance(from, to).saturating_mul(UTILITY_SCALE)
                    / (1 + self.penalties.get(from, to));
                if utility > best_utility {
                    best_utility = utility;
                    selected.clear();
                    selected.push((from, to));
                } else if utility == best_utility {
                    selected.push((from, to));
                }
            }
        }

        for (from, to) in selected {
            self.penalties.bump(from, to);
        }

        for vehicle in 0..self.routes.len() {
            let penalty = self.penalties.along(depot, &self.routes[vehicle]);
            self.augmented[vehicle] = self.costs[vehicle].saturating_add(self.lambda.saturating_mul(penalty));
        }
    }

    /// Reverse a segment within a route.
    fn two_opt(&mut self) -> bool {
        for vehicle in 0..self.routes.len() {
            if self.expired() {
                return false;
            }
            let len = self.routes[vehicle].len();
            for i in 0..len.saturating_sub(1) {
                for j in i + 1..len {
                    let mut candidate = self.routes[vehicle].clone();
                    candidate[i..=j].reverse();
                    let Some(value) = self.evaluate(vehicle, &candidate) else {
                        continue;
                    };
                    if value.1 < self.augmented[vehicle] {
                        self.apply(vehicle, candidate, value);
                        self.record();
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Move one stop to another position, in the same or another route.
    fn relocate(&mut self) -> bool {
        let vehicles = self.routes.len();
        for from in 0..vehicles {
            if self.expired() {
                return false;
            }
            for index in 0..self.routes[from].len() {
                let mut remaining = self.routes[from].clone();
                let stop = remaining.remove(index);

                for position in 0..=remaining.len() {
                    if position == index {
                        continue;
                    }
                    let mut candidate = remaining.clone();
                    candidate.insert(position, stop);
                    let Some(value) = self.evaluate(from, &candidate) else {
                        continue;
                    };
                    if value.1 < self.augmented[from] {
                        self.apply(from, candidate, value);
                        self.record();
                        return true;
                    }
                }

                // Removing a stop can break a window when waiting is capped.
                let Some(from_value) = self.evaluate(from, &remaining) else {
                    continue;
                };
                for to in (0..vehicles).filter(|&to| to != from) {
                    let current = self.augmented[from].saturating_add(self.augmented[to]);
                    for position in 0..=self.routes[to].len() {
                        let mut candidate = self.routes[to].clone();
                        candidate.insert(position, stop);
                        let Some(to_value) = self.evaluate(to, &candidate) else {
                            continue;
                        };
                        if from_value.1.saturating_add(to_value.1) < current {
                            self.apply(from, remaining, from_value);
                            self.apply(to, candidate, to_value);
                            self.record();
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Exchange two stops between different routes.
    fn swap(&mut self) -> bool {
        let vehicles = self.routes.len();
        for first in 0..vehicles {
            if self.expired() {
                return false;
            }
            for second in first + 1..vehicles {
                let current = self.augmented[first].saturating_add(self.augmented[second]);
                for i in 0..self.routes[first].len() {
                    for j in 0..self.routes[second].len() {
                        let mut left = self.routes[first].clone();
                        let mut right = self.routes[second].clone();
                        std::mem::swap(&mut left[i], &mut right[j]);

                        let Some(left_value) = self.evaluate(first, &left) else {
                            continue;
                        };
                        let Some(right_value) = self.evaluate(second, &right) else {
                            continue;
                        };
                        if left_value.1.saturating_add(right_value.1) < current {
                            self.apply(first, left, left_value);
                            self.apply(second, right, right_value);
                            self.record();
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Exchange the tails of two routes.
    fn two_opt_star(&mut self) -> bool {
        let vehicles = self.routes.len();
        for first in 0..vehicles {
            if self.expired() {
                return false;
            }
            for second in first + 1..vehicles {
                let current = self.augmented[first].saturating_add(self.augmented[second]);
                let first_len = self.routes[first].len();
                let second_len = self.routes[second].len();
                for i in 0..=first_len {
                    for j in 0..=second_len {
                        if i == first_len && j == second_len {
                            continue;
                        }
                        let left = self.routes[first][..i]
                            .iter()
                            .chain(&self.routes[second][j..])
                            .copied()
                            .collect::<Vec<_>>();
                        let right = self.routes[second][..j]
                            .iter()
                            .chain(&self.routes[first][i..])
                            .copied()
                            .collect::<Vec<_>>();

                        let Some(left_value) = self.evaluate(first, &left) else {
                            continue;
                        };
                        let Some(right_value) = self.evaluate(second, &right) else {
                            continue;
                        };
                        if left_value.1.saturating_add(right_value.1) < current {
                            self.apply(first, left, left_value);
                            self.apply(second, right, right_value);
                            self.record();
                            return true;
                        }
                    }
                }
            }
        }
        false
    }
}

fn total(costs: &[i64]) -> i64 {
    costs.iter().fold(0i64, |sum, cost| sum.saturating_add(*cost))
}

/// Every stop exactly once, the depot never as a stop, every route feasible.
fn verify(problem: &Problem, routes: &[Vec<usize>]) -> Result<(), SolverError> {
    let mut visits = vec![0usize; problem.num_locations()];
    for &stop in routes.iter().flatten() {
        match visits.get_mut(stop) {
            Some(count) => *count += 1,
            None => return Err(SolverError::UnknownLocation(stop)),
        }
    }

    let depot = problem.depot();
    if visits[depot] != 0 {
        return Err(SolverError::InconsistentVisits {
            location: depot,
            count: visits[depot],
        });
    }
    if let Some(location) = problem.stops().find(|&stop| visits[stop] != 1) {
        return Err(SolverError::InconsistentVisits {
            location,
            count: visits[location],
        });
    }

    for (vehicle, route) in routes.iter().enumerate() {
        if problem.route_cost(vehicle, route).is_none() {
            return Err(SolverError::InfeasibleRoute { vehicle });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{Matrix, TravelMatrices};

    fn line(n: usize) -> Problem {
        // Locations on a line, 10 apart; depot at 0.
        let rows = (0..n)
            .map(|i| (0..n).map(|j| (i as i64 - j as i64).abs() * 10).collect())
            .collect();
        let distance = Matrix::from_rows("distance", rows).unwrap();
        let matrices = TravelMatrices {
            time: distance.clone(),
            distance,
        };
        Problem::builder(matrices, 2).build().unwrap()
    }

    #[test]
    fn arcs_close_the_tour() {
        assert_eq!(arcs(0, &[2, 1]).collect::<Vec<_>>(), vec![(0, 2), (2, 1), (1, 0)]);
    }

    #[test]
    fn path_cheapest_arc_follows_nearest_neighbours() {
        let problem = line(4);
        let (routes, stranded) = path_cheapest_arc(&problem, &[1, 2, 3]);
        assert_eq!(routes[0], vec![1, 2, 3]);
        assert!(routes[1].is_empty());
        assert!(stranded.is_empty());
    }

    #[test]
    fn verify_detects_duplicates() {
        let problem = line(3);
        let err = verify(&problem, &[vec![1, 2], vec![2]]).unwrap_err();
        assert_eq!(err, SolverError::InconsistentVisits { location: 2, count: 2 });

        let err = verify(&problem, &[vec![1], vec![]]).unwrap_err();
        assert_eq!(err, SolverError::InconsistentVisits { location: 2, count: 0 });
    }
}
