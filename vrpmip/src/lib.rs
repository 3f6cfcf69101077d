//! Capacitated vehicle routing with time windows, route-duration limits and
//! co-service restrictions, formulated as a mixed-integer program.
//!
//! [`solve`] runs the whole pipeline: the instance is turned into a
//! [`Formulation`], its objective tiers are optimised through a
//! [`MipSolver`] backend and the resulting arc assignment is decoded into a
//! [`Solution`].

pub mod backend;
pub mod bigm;
pub mod distance;
pub mod error;
pub mod formulation;
pub mod model;
pub mod objective;
pub mod problem;
pub mod solution;

pub use backend::{MipSolver, RawSolution, SolverParams, Status};
#[cfg(feature = "gurobi")]
pub use backend::Gurobi;
#[cfg(feature = "microlp")]
pub use backend::MicroLp;
pub use bigm::BigMPolicy;
pub use distance::DistanceMatrix;
pub use error::{Error, ExtractionError, InputError, Result, SolverError};
pub use formulation::{Capabilities, Formulation, ModelBuilder};
pub use objective::{Objective, ObjectiveKind, ObjectiveManager, ObjectiveTier};
pub use problem::{Instance, InstanceData, Position, Restriction, TimeWindow};
pub use solution::{BalanceMetrics, Route, ScheduledStop, Solution, SolutionExtractor};

use serde::{Deserialize, Serialize};
use tracing::info;

/// Everything about a run that is not part of the instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capabilities: Capabilities,
    pub objective: Objective,
    pub big_m: BigMPolicy,
    pub solver: SolverParams,
}

impl Config {
    /// Workload balancing after travel time, which may degrade by `rel_tol`
    pub fn balanced(rel_tol: f64) -> Self {
        Config {
            capabilities: Capabilities {
                workload_balance: true,
                ..Default::default()
            },
            objective: Objective::balanced(rel_tol),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Outcome {
    Solved(Solution),
    /// The solver stopped without a usable assignment
    Unsolved(Status),
}

impl Outcome {
    pub fn status(&self) -> Status {
        match self {
            Outcome::Solved(solution) => solution.status,
            Outcome::Unsolved(status) => *status,
        }
    }

    pub fn solution(&self) -> Option<&Solution> {
        match self {
            Outcome::Solved(solution) => Some(solution),
            Outcome::Unsolved(_) => None,
        }
    }
}

pub fn solve<S: MipSolver + ?Sized>(
    instance: &Instance,
    config: &Config,
    solver: &mut S,
) -> Result<Outcome> {
    let distances = DistanceMatrix::new(&instance.positions());
    let formulation = ModelBuilder::new(instance, &distances)
        .capabilities(config.capabilities)
        .big_m(config.big_m)
        .build()?;
    let objective = ObjectiveManager::new(&formulation, &config.objective)?;

    let raw = objective.optimize(&formulation.model, solver, &config.solver)?;
    if !raw.status.has_values() {
        info!(status = %raw.status, code = raw.status.code(), "no solution to extract");
        return Ok(Outcome::Unsolved(raw.status));
    }

    let solution = SolutionExtractor::new(&formulation).extract(&raw)?;
    Ok(Outcome::Solved(solution))
}

#[cfg(all(test, feature = "microlp"))]
mod tests {
    use super::*;
    use crate::problem::tests::data;
    use crate::problem::NodeId;
    use rand::Rng;
    use rand_xoshiro::rand_core::SeedableRng;

    const EPS: f64 = 1e-5;

    fn solved(instance: &Instance, config: &Config) -> Solution {
        match solve(instance, config, &mut MicroLp).unwrap() {
            Outcome::Solved(solution) => solution,
            Outcome::Unsolved(status) => panic!("expected a solution, got {status}"),
        }
    }

    fn unsolved(instance: &Instance, config: &Config) -> Status {
        match solve(instance, config, &mut MicroLp).unwrap() {
            Outcome::Solved(solution) => panic!("expected no solution, got {solution:?}"),
            Outcome::Unsolved(status) => status,
        }
    }

    /// Actual time a route takes: travel, service and waiting for windows
    fn elapsed(instance: &Instance, route: &Route) -> f64 {
        let distances = DistanceMatrix::new(&instance.positions());
        let mut time = 0.0;
        for pair in route.nodes.windows(2) {
            time += instance.service_time(pair[0]) + distances.get(pair[0], pair[1]);
            if let Some(window) = instance.time_window(pair[1]) {
                time = time.max(window.earliest);
            }
        }
        time
    }

    #[test]
    fn serves_single_customer() {
        let instance = Instance::new(data(&[(0.0, 0.0), (3.0, 4.0)], &[10.0])).unwrap();
        let solution = solved(&instance, &Config::default());

        assert_eq!(solution.status, Status::Optimal);
        assert!(solution.proven_optimal);
        assert_eq!(solution.routes.len(), 1);
        assert_eq!(solution.routes[0].nodes, vec![0, 1, 0]);
        assert!((solution.total_travel_time - 10.0).abs() < EPS);
        assert_eq!(solution.vehicles_used, 1);
        assert_eq!(solution.vehicles_available, 1);
        assert!((solution.capacity_utilization.unwrap() - 0.1).abs() < EPS);
        assert!(solution.routes[0].duration >= 10.0 - EPS);
    }

    #[test]
    fn reports_capacity_infeasibility() {
        let mut input = data(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)], &[60.0, 60.0]);
        input.capacity = 100.0;
        let instance = Instance::new(input).unwrap();
        let status = unsolved(&instance, &Config::default());
        assert_eq!(status, Status::Infeasible);
        assert_eq!(status.code(), 3);
    }

    #[test]
    fn reports_restriction_infeasibility() {
        let mut input = data(
            &[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)],
            &[1.0, 1.0, 1.0],
        );
        input.restrictions = vec![Restriction(1, 2, 3)];
        let instance = Instance::new(input).unwrap();

        // without the capability the triple is ignored
        let solution = solved(&instance, &Config::default());
        assert_eq!(solution.routes[0].customers().len(), 3);

        let config = Config {
            capabilities: Capabilities {
                restrictions: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(unsolved(&instance, &config), Status::Infeasible);
    }

    #[test]
    fn splits_restricted_triple_over_vehicles() {
        let mut input = data(
            &[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)],
            &[1.0, 1.0, 1.0],
        );
        input.num_vehicles = 2;
        input.restrictions = vec![Restriction(1, 2, 3)];
        let instance = Instance::new(input).unwrap();
        let config = Config {
            capabilities: Capabilities {
                restrictions: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let solution = solved(&instance, &config);
        assert_eq!(solution.vehicles_used, 2);
        for route in solution.routes.iter() {
            assert!(route.customers().len() < 3);
        }
    }

    #[test]
    fn respects_time_windows() {
        let mut input = data(&[(0.0, 0.0), (0.0, 5.0), (0.0, 10.0)], &[1.0, 1.0]);
        input.time_windows = Some(vec![TimeWindow::new(20.0, 30.0), TimeWindow::new(0.0, 12.0)]);
        let instance = Instance::new(input).unwrap();
        let config = Config {
            capabilities: Capabilities {
                time_windows: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let solution = solved(&instance, &config);

        assert_eq!(solution.routes[0].nodes, vec![0, 2, 1, 0]);
        assert!((solution.total_travel_time - 20.0).abs() < EPS);
        let schedule = solution.routes[0].schedule.as_ref().unwrap();
        for stop in schedule {
            assert!(stop.window.unwrap().contains(stop.start, EPS), "{stop:?}");
        }

        // without windows both visiting orders cost the same
        let plain = solved(&instance, &Config::default());
        assert!((plain.total_travel_time - 20.0).abs() < EPS);
        assert!(plain.routes[0].schedule.is_none());
    }

    #[test]
    fn rejects_time_windows_missing_from_instance() {
        let instance = Instance::new(data(&[(0.0, 0.0), (3.0, 4.0)], &[1.0])).unwrap();
        let config = Config {
            capabilities: Capabilities {
                time_windows: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            solve(&instance, &config, &mut MicroLp),
            Err(Error::Input(InputError::MissingTimeWindows))
        ));
    }

    #[test]
    fn respects_duration_cap() {
        let mut input = data(&[(0.0, 0.0), (10.0, 0.0), (-10.0, 0.0)], &[1.0, 1.0]);
        input.num_vehicles = 2;
        input.max_duration = 30.0;
        let instance = Instance::new(input).unwrap();
        let solution = solved(&instance, &Config::default());

        assert_eq!(solution.vehicles_used, 2);
        for route in solution.routes.iter() {
            assert!(route.duration <= 30.0 + EPS);
            assert!(elapsed(&instance, route) <= 30.0 + EPS);
        }
        assert!((solution.total_travel_time - 40.0).abs() < EPS);

        let mut input = data(&[(0.0, 0.0), (10.0, 0.0), (-10.0, 0.0)], &[1.0, 1.0]);
        input.max_duration = 30.0;
        let instance = Instance::new(input).unwrap();
        assert_eq!(unsolved(&instance, &Config::default()), Status::Infeasible);
    }

    #[test]
    fn uses_every_vehicle_when_asked() {
        let mut input = data(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)], &[1.0, 1.0]);
        input.num_vehicles = 2;
        let instance = Instance::new(input).unwrap();
        assert_eq!(solved(&instance, &Config::default()).vehicles_used, 1);

        let config = Config {
            capabilities: Capabilities {
                use_all_vehicles: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(solved(&instance, &config).vehicles_used, 2);
    }

    #[test]
    fn balances_within_travel_tolerance() {
        let mut input = data(
            &[(0.0, 0.0), (0.0, 2.0), (0.0, 4.0), (3.0, 0.0)],
            &[1.0, 1.0, 1.0],
        );
        input.num_vehicles = 2;
        let instance = Instance::new(input).unwrap();
        let travel_only = solved(&instance, &Config::default());

        let config = Config::balanced(0.05);
        let balanced = solved(&instance, &config);
        assert!(balanced.total_travel_time <= travel_only.total_travel_time * 1.05 + EPS);

        let balance = balanced.balance.as_ref().unwrap();
        assert!(balance.total_deviation >= -EPS);
        assert!(balance.max_deviation <= balance.total_deviation + EPS);
        assert_eq!(balance.route_deviations.len(), balanced.routes.len());
        for (route, deviation) in balanced.routes.iter().zip(&balance.route_deviations) {
            assert!((deviation - (route.duration - balance.average_duration).abs()).abs() < EPS);
        }
        assert!(travel_only.balance.is_none());
    }

    #[test]
    fn agrees_across_big_m_policies() {
        let mut input = data(
            &[(0.0, 0.0), (2.0, 1.0), (4.0, 4.0), (1.0, 3.0)],
            &[1.0, 1.0, 1.0],
        );
        input.service_times = vec![0.0, 1.0, 2.0, 1.0];
        input.time_windows = Some(vec![TimeWindow::new(0.0, 50.0); 3]);
        let instance = Instance::new(input).unwrap();
        let mut config = Config {
            capabilities: Capabilities {
                time_windows: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let tightened = solved(&instance, &config);
        config.big_m = BigMPolicy::Global;
        let global = solved(&instance, &config);
        assert!((tightened.total_travel_time - global.total_travel_time).abs() < EPS);
    }

    #[test]
    fn repeats_identical_solutions() {
        let mut input = data(
            &[(0.0, 0.0), (2.0, 1.0), (4.0, 4.0), (1.0, 3.0)],
            &[1.0, 2.0, 3.0],
        );
        input.num_vehicles = 2;
        input.capacity = 4.0;
        let instance = Instance::new(input).unwrap();
        let first = solved(&instance, &Config::default());
        let second = solved(&instance, &Config::default());
        assert!((first.total_travel_time - second.total_travel_time).abs() < EPS);
        assert_eq!(first.vehicles_used, 2);
        assert_eq!(first.routes.len(), second.routes.len());
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = Config {
            capabilities: Capabilities {
                time_windows: true,
                restrictions: true,
                ..Default::default()
            },
            big_m: BigMPolicy::Global,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);

        let parsed: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, Config::default());

        let json = serde_json::to_string(&Config::balanced(0.05)).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert!(parsed.capabilities.workload_balance);
        assert!(matches!(parsed.objective, Objective::Hierarchical(ref tiers) if tiers.len() == 2));
    }

    fn shortest_tour(distances: &DistanceMatrix, rest: &mut Vec<NodeId>, at: NodeId) -> f64 {
        if rest.is_empty() {
            return distances.get(at, 0);
        }
        let mut best = f64::INFINITY;
        for index in 0..rest.len() {
            let next = rest.remove(index);
            best = best.min(distances.get(at, next) + shortest_tour(distances, rest, next));
            rest.insert(index, next);
        }
        best
    }

    #[test]
    fn solves_random_instances() {
        let mut rng = rand_xoshiro::Xoshiro128StarStar::seed_from_u64(42);
        for round in 0..8 {
            let num_customers = rng.gen_range(1..=4usize);
            let points = (0..=num_customers)
                .map(|_| (rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0)))
                .collect::<Vec<_>>();
            let weights = (0..num_customers)
                .map(|_| f64::from(rng.gen_range(1u8..=5)))
                .collect::<Vec<_>>();
            let mut input = data(&points, &weights);
            input.num_vehicles = rng.gen_range(1..=2);
            input.capacity = 20.0;
            input.max_duration = 100.0;
            input.service_times = std::iter::once(0.0)
                .chain((0..num_customers).map(|_| rng.gen_range(0.0..2.0)))
                .collect();
            let instance = Instance::new(input).unwrap();
            let distances = DistanceMatrix::new(&instance.positions());

            let solution = solved(&instance, &Config::default());
            assert!(solution.vehicles_used >= 1, "round {round}");
            assert!(solution.vehicles_used <= instance.num_vehicles);

            let mut seen = vec![0; instance.num_nodes];
            for route in solution.routes.iter() {
                assert_eq!(route.nodes.first(), Some(&0));
                assert_eq!(route.nodes.last(), Some(&0));
                for &i in route.customers() {
                    seen[i] += 1;
                }
                assert!(route.load <= instance.capacity + EPS);
                assert!(route.duration <= instance.max_duration + EPS);
                assert!(elapsed(&instance, route) <= route.duration + EPS, "round {round}");
            }
            assert!(seen[1..].iter().all(|&count| count == 1), "round {round}");

            let utilization = solution.capacity_utilization.unwrap();
            assert!(utilization > 0.0 && utilization <= 1.0 + EPS);
            let travel = solution.routes.iter().map(|r| r.travel_time).sum::<f64>();
            assert!((solution.total_travel_time - travel).abs() < EPS);
            assert!(
                (solution.total_operational_time
                    - solution.total_travel_time
                    - solution.total_service_time)
                    .abs()
                    < EPS
            );

            // a single tour is optimal for Euclidean travel times
            let mut customers = instance.all_customers().collect::<Vec<_>>();
            let optimum = shortest_tour(&distances, &mut customers, 0);
            assert!(
                (solution.total_travel_time - optimum).abs() < 1e-4,
                "round {round}: {} vs {optimum}",
                solution.total_travel_time
            );
        }
    }

    #[test]
    fn honours_all_capabilities_on_random_instances() {
        let mut rng = rand_xoshiro::Xoshiro128StarStar::seed_from_u64(7);
        for round in 0..6 {
            let num_customers = rng.gen_range(3..=4usize);
            let points = (0..=num_customers)
                .map(|_| (rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0)))
                .collect::<Vec<_>>();
            let weights = vec![1.0; num_customers];
            let mut input = data(&points, &weights);
            input.num_vehicles = 2;
            input.capacity = 3.0;
            input.max_duration = 200.0;
            input.time_windows = Some(
                (0..num_customers)
                    .map(|_| {
                        let earliest = rng.gen_range(0.0..20.0);
                        TimeWindow::new(earliest, earliest + rng.gen_range(10.0..60.0))
                    })
                    .collect(),
            );
            input.restrictions = vec![Restriction(1, 2, 3)];
            let instance = Instance::new(input).unwrap();
            let config = Config {
                capabilities: Capabilities {
                    time_windows: true,
                    restrictions: true,
                    ..Default::default()
                },
                ..Default::default()
            };

            let solution = match solve(&instance, &config, &mut MicroLp).unwrap() {
                Outcome::Solved(solution) => solution,
                Outcome::Unsolved(status) => {
                    assert_eq!(status, Status::Infeasible, "round {round}");
                    continue;
                }
            };

            let mut seen = vec![0; instance.num_nodes];
            for route in solution.routes.iter() {
                let customers = route.customers();
                assert!(!customers.is_empty());
                for &i in customers {
                    seen[i] += 1;
                }
                assert!(route.load <= instance.capacity + EPS, "round {round}");
                assert!(elapsed(&instance, route) <= route.duration + EPS, "round {round}");
                assert!(route.duration <= instance.max_duration + EPS);
                assert!(
                    !(customers.contains(&1) && customers.contains(&2) && customers.contains(&3)),
                    "round {round}: {customers:?}"
                );
                for stop in route.schedule.as_ref().unwrap() {
                    assert!(stop.window.unwrap().contains(stop.start, EPS), "round {round}");
                }
            }
            assert!(seen[1..].iter().all(|&count| count == 1), "round {round}");
        }
    }
}
