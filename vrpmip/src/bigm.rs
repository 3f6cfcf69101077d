use crate::distance::DistanceMatrix;
use crate::problem::{Instance, NodeId};
use serde::{Deserialize, Serialize};

/// How the deactivation constants of the conditional constraints are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BigMPolicy {
    /// One constant `2 * sum(travel) + 2 * sum(service)` for every constraint
    Global,
    /// Per-constraint constants derived from the node horizons
    #[default]
    Tightened,
}

/// Big-M values as pure functions of the nodes a constraint relates.
///
/// The fleet is homogeneous, so the vehicle never changes a value.
pub struct BigM<'a> {
    instance: &'a Instance,
    distances: &'a DistanceMatrix,
    policy: BigMPolicy,
    time_windows: bool,
    global: f64,
}

impl<'a> BigM<'a> {
    pub fn new(
        instance: &'a Instance,
        distances: &'a DistanceMatrix,
        policy: BigMPolicy,
        time_windows: bool,
    ) -> Self {
        let mut big_m = BigM {
            instance,
            distances,
            policy,
            time_windows,
            global: 0.0,
        };

        let total_service: f64 = instance.all_nodes().map(|i| instance.service_time(i)).sum();
        let max_service = instance
            .all_nodes()
            .map(|i| instance.service_time(i))
            .fold(0.0, f64::max);
        let max_horizon = instance
            .all_nodes()
            .map(|i| big_m.horizon(i))
            .fold(0.0, f64::max);
        // never smaller than any tightened value
        big_m.global = f64::max(
            2.0 * distances.total() + 2.0 * total_service,
            max_horizon + max_service + distances.max(),
        );

        big_m
    }

    pub fn policy(&self) -> BigMPolicy {
        self.policy
    }

    /// Upper bound on the service start at `i` in any feasible schedule
    pub fn horizon(&self, i: NodeId) -> f64 {
        if i == 0 {
            return 0.0;
        }
        let limit = self.instance.max_duration;
        match self.instance.time_window(i) {
            Some(window) if self.time_windows => f64::min(limit, window.latest),
            _ => limit,
        }
    }

    /// Constant of `y[j] >= y[i] + t(i, j) + s(i) - M (1 - x[i, j])`
    pub fn propagation(&self, i: NodeId, j: NodeId) -> f64 {
        match self.policy {
            BigMPolicy::Global => self.global,
            BigMPolicy::Tightened => {
                self.horizon(i) + self.instance.service_time(i) + self.distances.get(i, j)
            }
        }
    }

    /// Constant of `d[j] >= y[j] + s(j) + t(j, 0) - M (1 - x[j, 0])`
    pub fn duration(&self, j: NodeId) -> f64 {
        match self.policy {
            BigMPolicy::Global => self.global,
            BigMPolicy::Tightened => {
                self.horizon(j) + self.instance.service_time(j) + self.distances.get(j, 0)
            }
        }
    }

    /// Constant of `y[i] <= latest(i) + M (1 - z[i])`
    pub fn window(&self, i: NodeId) -> f64 {
        match self.policy {
            BigMPolicy::Global => self.global,
            BigMPolicy::Tightened => {
                let latest = self
                    .instance
                    .time_window(i)
                    .map_or(self.instance.max_duration, |w| w.latest);
                (self.horizon(i) - latest).max(0.0)
            }
        }
    }

    pub fn global(&self) -> f64 {
        self.global
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::tests::data;
    use crate::problem::TimeWindow;

    fn instance() -> Instance {
        let mut input = data(&[(0.0, 0.0), (3.0, 4.0), (6.0, 8.0)], &[1.0, 1.0]);
        input.service_times = vec![0.0, 2.0, 3.0];
        input.max_duration = 100.0;
        input.time_windows = Some(vec![TimeWindow::new(0.0, 40.0), TimeWindow::new(5.0, 500.0)]);
        Instance::new(input).unwrap()
    }

    #[test]
    fn global_constant_follows_travel_and_service_sums() {
        let instance = instance();
        let distances = DistanceMatrix::new(&instance.positions());
        let big_m = BigM::new(&instance, &distances, BigMPolicy::Global, false);
        // travel: 2 * (5 + 10 + 5) = 40 over ordered pairs, service: 5
        assert_eq!(big_m.global(), f64::max(2.0 * 40.0 + 2.0 * 5.0, 100.0 + 3.0 + 10.0));
        assert_eq!(big_m.propagation(1, 2), big_m.global());
        assert_eq!(big_m.duration(2), big_m.global());
        assert_eq!(big_m.window(1), big_m.global());
    }

    #[test]
    fn global_constant_covers_long_horizons() {
        let mut input = data(&[(0.0, 0.0), (1.0, 0.0)], &[1.0]);
        input.max_duration = 10_000.0;
        let instance = Instance::new(input).unwrap();
        let distances = DistanceMatrix::new(&instance.positions());
        let big_m = BigM::new(&instance, &distances, BigMPolicy::Global, false);
        assert!(big_m.global() >= 10_000.0 + 1.0);
    }

    #[test]
    fn tightened_constants_use_horizons() {
        let instance = instance();
        let distances = DistanceMatrix::new(&instance.positions());
        let big_m = BigM::new(&instance, &distances, BigMPolicy::Tightened, true);
        assert_eq!(big_m.horizon(0), 0.0);
        assert_eq!(big_m.horizon(1), 40.0);
        assert_eq!(big_m.horizon(2), 100.0);
        assert_eq!(big_m.propagation(0, 1), 5.0);
        assert_eq!(big_m.propagation(1, 2), 40.0 + 2.0 + 5.0);
        assert_eq!(big_m.duration(2), 100.0 + 3.0 + 10.0);
        assert_eq!(big_m.window(1), 0.0);
        assert_eq!(big_m.window(2), 0.0);
    }

    #[test]
    fn tightened_constants_ignore_windows_when_disabled() {
        let instance = instance();
        let distances = DistanceMatrix::new(&instance.positions());
        let big_m = BigM::new(&instance, &distances, BigMPolicy::Tightened, false);
        assert_eq!(big_m.horizon(1), 100.0);
        assert_eq!(big_m.propagation(1, 0), 100.0 + 2.0 + 5.0);
    }

    #[test]
    fn tightened_never_exceeds_global() {
        let instance = instance();
        let distances = DistanceMatrix::new(&instance.positions());
        let tight = BigM::new(&instance, &distances, BigMPolicy::Tightened, true);
        for i in instance.all_nodes() {
            for j in instance.all_nodes_except(i) {
                assert!(tight.propagation(i, j) <= tight.global());
            }
        }
    }
}
