use crate::backend::{RawSolution, Status};
use crate::error::ExtractionError;
use crate::formulation::Formulation;
use crate::problem::{NodeId, TimeWindow, VehicleId};
use serde::Serialize;
use tracing::{debug, info};

/// Arc variables above this value count as selected
pub const ARC_THRESHOLD: f64 = 0.5;

/// Service start at one customer of a route
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScheduledStop {
    pub node: NodeId,
    pub start: f64,
    pub window: Option<TimeWindow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub vehicle: VehicleId,
    /// Visited nodes, starting and ending at the depot
    pub nodes: Vec<NodeId>,
    pub load: f64,
    pub travel_time: f64,
    /// Duration variable of the last customer before the depot
    pub duration: f64,
    /// Service start times, present when time windows are modelled
    pub schedule: Option<Vec<ScheduledStop>>,
}

impl Route {
    pub fn customers(&self) -> &[NodeId] {
        &self.nodes[1..self.nodes.len() - 1]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceMetrics {
    /// Value of the mean route duration variable
    pub average_duration: f64,
    /// Sum of the deviation variables over all vehicles
    pub total_deviation: f64,
    pub max_deviation: f64,
    /// `|duration - average_duration|` per route, in route order
    pub route_deviations: Vec<f64>,
    /// Population standard deviation of the route durations
    pub duration_std_dev: f64,
    /// Longest minus shortest route duration
    pub duration_spread: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pub status: Status,
    pub proven_optimal: bool,
    pub total_travel_time: f64,
    pub total_service_time: f64,
    pub total_operational_time: f64,
    pub routes: Vec<Route>,
    pub vehicles_used: usize,
    pub vehicles_available: usize,
    pub total_duration: f64,
    pub average_duration: Option<f64>,
    pub max_duration: Option<f64>,
    pub capacity_utilization: Option<f64>,
    pub balance: Option<BalanceMetrics>,
}

/// Reads routes and metrics out of the values of a solved formulation
pub struct SolutionExtractor<'a> {
    formulation: &'a Formulation<'a>,
}

impl<'a> SolutionExtractor<'a> {
    pub fn new(formulation: &'a Formulation<'a>) -> Self {
        SolutionExtractor { formulation }
    }

    pub fn extract(&self, raw: &RawSolution) -> Result<Solution, ExtractionError> {
        let values = match &raw.values {
            Some(values) if raw.status.has_values() => values,
            _ => return Err(ExtractionError::NotSolved(raw.status)),
        };
        let expected = self.formulation.model.num_vars();
        if values.len() != expected {
            return Err(ExtractionError::ValueCount {
                expected,
                actual: values.len(),
            });
        }

        let problem = self.formulation.instance;
        let mut visited = vec![false; problem.num_nodes];
        let mut routes = Vec::new();
        for k in problem.all_vehicles() {
            if let Some(route) = self.walk(values, k, &mut visited)? {
                routes.push(route);
            }
        }
        self.check_coverage(values, &visited)?;

        let solution = self.summarize(raw.status, values, routes);
        info!(
            status = %solution.status,
            travel_time = solution.total_travel_time,
            vehicles = solution.vehicles_used,
            "extracted solution"
        );
        Ok(solution)
    }

    fn selected(&self, values: &[f64], i: NodeId, j: NodeId, k: VehicleId) -> bool {
        values[self.formulation.vars.arc_index(i, j, k)] > ARC_THRESHOLD
    }

    fn successor(
        &self,
        values: &[f64],
        i: NodeId,
        k: VehicleId,
    ) -> Result<Option<NodeId>, ExtractionError> {
        let mut successors = self
            .formulation
            .instance
            .all_nodes_except(i)
            .filter(|&j| self.selected(values, i, j, k));
        let next = successors.next();
        if successors.next().is_some() {
            return Err(ExtractionError::AmbiguousSuccessor { vehicle: k, node: i });
        }
        Ok(next)
    }

    /// Follows the selected arcs of vehicle `k` from the depot back to it
    fn walk(
        &self,
        values: &[f64],
        k: VehicleId,
        visited: &mut [bool],
    ) -> Result<Option<Route>, ExtractionError> {
        let Some(first) = self.successor(values, 0, k)? else {
            return Ok(None);
        };

        let problem = self.formulation.instance;
        let distances = self.formulation.distances;
        let mut nodes = vec![0];
        let mut travel_time = distances.get(0, first);
        let mut current = first;
        while current != 0 {
            if visited[current] {
                return Err(ExtractionError::Revisit {
                    vehicle: k,
                    node: current,
                });
            }
            visited[current] = true;
            nodes.push(current);

            let next = self
                .successor(values, current, k)?
                .ok_or(ExtractionError::BrokenRoute {
                    vehicle: k,
                    node: current,
                })?;
            travel_time += distances.get(current, next);
            current = next;
        }
        nodes.push(0);

        let customers = &nodes[1..nodes.len() - 1];
        let last = customers[customers.len() - 1];
        let vars = &self.formulation.vars;
        let schedule = self.formulation.capabilities.time_windows.then(|| {
            customers
                .iter()
                .map(|&node| ScheduledStop {
                    node,
                    start: values[vars.departure_index(node, k)],
                    window: problem.time_window(node),
                })
                .collect::<Vec<_>>()
        });

        let route = Route {
            vehicle: k,
            load: customers.iter().map(|&i| problem.weight(i)).sum(),
            travel_time,
            duration: values[vars.duration_index(last, k)],
            schedule,
            nodes,
        };
        debug!(vehicle = k, nodes = ?route.nodes, load = route.load, "walked route");
        Ok(Some(route))
    }

    /// Every customer must lie on a depot route; selected arcs among the
    /// others form cycles detached from the depot
    fn check_coverage(&self, values: &[f64], visited: &[bool]) -> Result<(), ExtractionError> {
        let problem = self.formulation.instance;
        let missing = problem
            .all_customers()
            .filter(|&i| !visited[i])
            .collect::<Vec<_>>();
        if missing.is_empty() {
            return Ok(());
        }

        // find connected components with union-find data structure
        let mut uf = partitions::partition_vec![(); problem.num_nodes];
        for k in problem.all_vehicles() {
            for i in problem.all_customers() {
                for j in problem.all_customers() {
                    if i != j && self.selected(values, i, j, k) {
                        uf.union(i, j);
                    }
                }
            }
        }

        let mut cycles = Vec::new();
        for set in uf.all_sets() {
            let mut members = set.map(|(index, _)| index).collect::<Vec<_>>();
            if members.len() > 1 && members.iter().any(|&i| !visited[i]) {
                members.sort_unstable();
                cycles.push(members);
            }
        }
        cycles.sort();

        Err(ExtractionError::Uncovered { missing, cycles })
    }

    fn summarize(&self, status: Status, values: &[f64], routes: Vec<Route>) -> Solution {
        let problem = self.formulation.instance;

        let total_travel_time = routes.iter().map(|r| r.travel_time).sum::<f64>();
        let total_service_time = routes
            .iter()
            .flat_map(|r| r.customers())
            .map(|&i| problem.service_time(i))
            .sum::<f64>();
        let total_load = routes.iter().map(|r| r.load).sum::<f64>();
        let durations = routes.iter().map(|r| r.duration).collect::<Vec<_>>();
        let total_duration = durations.iter().sum::<f64>();

        let vehicles_used = routes.len();
        let (average_duration, max_duration, capacity_utilization) = if vehicles_used == 0 {
            (None, None, None)
        } else {
            let used = vehicles_used as f64;
            (
                Some(total_duration / used),
                durations.iter().copied().reduce(f64::max),
                Some(total_load / (used * problem.capacity)),
            )
        };

        let balance = self.formulation.vars.balance().map(|_| {
            let vars = &self.formulation.vars;
            let average = vars.average().map_or(0.0, |v| values[v.index()]);
            let deviations = problem
                .all_vehicles()
                .filter_map(|k| vars.deviation(k))
                .map(|v| values[v.index()])
                .collect::<Vec<_>>();
            BalanceMetrics {
                average_duration: average,
                total_deviation: deviations.iter().sum(),
                max_deviation: deviations.iter().copied().fold(0.0, f64::max),
                route_deviations: durations.iter().map(|d| (d - average).abs()).collect(),
                duration_std_dev: std_dev(&durations),
                duration_spread: spread(&durations),
            }
        });

        Solution {
            status,
            proven_optimal: status.is_optimal(),
            total_travel_time,
            total_service_time,
            total_operational_time: total_travel_time + total_service_time,
            vehicles_used,
            vehicles_available: problem.num_vehicles,
            total_duration,
            average_duration,
            max_duration,
            capacity_utilization,
            balance,
            routes,
        }
    }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn spread(values: &[f64]) -> f64 {
    let max = values.iter().copied().reduce(f64::max);
    let min = values.iter().copied().reduce(f64::min);
    match (max, min) {
        (Some(max), Some(min)) => max - min,
        _ => 0.0,
    }
}
