use crate::bigm::{BigM, BigMPolicy};
use crate::distance::DistanceMatrix;
use crate::error::InputError;
use crate::model::{LinExpr, Model, Sense, Var, VarType};
use crate::problem::{Instance, NodeId, VehicleId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Optional constraint families attached on top of the base routing model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// Service must start inside each customer's time window
    pub time_windows: bool,
    /// Honour the co-service restriction triples of the instance
    pub restrictions: bool,
    /// Add route-duration deviation variables for the balancing objective
    pub workload_balance: bool,
    /// Every vehicle leaves the depot exactly once
    pub use_all_vehicles: bool,
}

impl Capabilities {
    /// Whether the vehicle-assignment variables `z` are part of the model
    pub fn needs_assignment(&self) -> bool {
        self.time_windows || self.restrictions
    }
}

/// Workload balancing variables: longest route duration per vehicle, their
/// mean, and each vehicle's absolute deviation from the mean
#[derive(Debug, Clone)]
pub struct BalanceVars {
    longest_range: (usize, usize),
    average: Var,
    deviation_range: (usize, usize),
}

/// Decision variables, stored contiguously per family
#[derive(Debug, Clone)]
pub struct Variables {
    num_nodes: usize,
    num_vehicles: usize,
    variables: Vec<Var>,
    arc_range: (usize, usize),
    departure_range: (usize, usize),
    duration_range: (usize, usize),
    assignment_range: Option<(usize, usize)>,
    balance: Option<BalanceVars>,
}

#[allow(clippy::many_single_char_names)]
impl Variables {
    fn new(
        instance: &Instance,
        big_m: &BigM,
        capabilities: Capabilities,
        lp: &mut Model,
    ) -> Self {
        let n = instance.num_nodes;
        let num_vehicles = instance.num_vehicles;
        let num_variables_arc = num_vehicles * n * (n - 1);
        let num_variables_departure = num_vehicles * n;
        let num_variables_duration = num_vehicles * (n - 1);
        let num_variables = num_variables_arc
            + num_variables_departure
            + num_variables_duration * if capabilities.needs_assignment() { 2 } else { 1 }
            + if capabilities.workload_balance {
                2 * num_vehicles + 1
            } else {
                0
            };

        let mut vars = Variables {
            num_nodes: n,
            num_vehicles,
            variables: Vec::with_capacity(num_variables),
            arc_range: (0, num_variables),
            departure_range: (0, num_variables),
            duration_range: (0, num_variables),
            assignment_range: None,
            balance: None,
        };

        // arc variables
        for k in instance.all_vehicles() {
            for i in instance.all_nodes() {
                for j in instance.all_nodes_except(i) {
                    let var = lp.add_var(&format!("x_{i}_{j}_{k}"), VarType::Binary, 0.0, 1.0);
                    debug_assert_eq!(vars.variables.len(), vars.arc_index(i, j, k));
                    vars.variables.push(var);
                }
            }
        }
        vars.arc_range.1 = vars.variables.len();
        debug_assert_eq!(num_variables_arc, vars.arc_range.1 - vars.arc_range.0);

        // departure (service start) variables
        vars.departure_range.0 = vars.arc_range.1;
        for k in instance.all_vehicles() {
            for i in instance.all_nodes() {
                let name = format!("y_{i}_{k}");
                let var = lp.add_var(&name, VarType::Continuous, 0.0, big_m.horizon(i));
                debug_assert_eq!(vars.variables.len(), vars.departure_index(i, k));
                vars.variables.push(var);
            }
        }
        vars.departure_range.1 = vars.variables.len();
        debug_assert_eq!(
            num_variables_departure,
            vars.departure_range.1 - vars.departure_range.0
        );

        // route duration variables, one per possible last customer
        vars.duration_range.0 = vars.departure_range.1;
        for k in instance.all_vehicles() {
            for j in instance.all_customers() {
                let name = format!("d_{j}_{k}");
                let var = lp.add_var(&name, VarType::Continuous, 0.0, instance.max_duration);
                debug_assert_eq!(vars.variables.len(), vars.duration_index(j, k));
                vars.variables.push(var);
            }
        }
        vars.duration_range.1 = vars.variables.len();
        debug_assert_eq!(
            num_variables_duration,
            vars.duration_range.1 - vars.duration_range.0
        );

        // assignment variables
        if capabilities.needs_assignment() {
            let start = vars.duration_range.1;
            vars.assignment_range = Some((start, start + num_variables_duration));
            for k in instance.all_vehicles() {
                for i in instance.all_customers() {
                    let var = lp.add_var(&format!("z_{i}_{k}"), VarType::Binary, 0.0, 1.0);
                    debug_assert_eq!(vars.variables.len(), vars.assignment_index(i, k));
                    vars.variables.push(var);
                }
            }
            debug_assert_eq!(Some(vars.variables.len()), vars.assignment_range.map(|r| r.1));
        }

        // workload balancing variables
        if capabilities.workload_balance {
            let start = vars.variables.len();
            let longest_range = (start, start + num_vehicles);
            for k in instance.all_vehicles() {
                let name = format!("T_{k}");
                let var = lp.add_var(&name, VarType::Continuous, 0.0, f64::INFINITY);
                vars.variables.push(var);
            }
            let average = lp.add_var("T_avg", VarType::Continuous, 0.0, f64::INFINITY);
            vars.variables.push(average);
            let start = vars.variables.len();
            let deviation_range = (start, start + num_vehicles);
            for k in instance.all_vehicles() {
                let name = format!("dev_{k}");
                let var = lp.add_var(&name, VarType::Continuous, 0.0, f64::INFINITY);
                vars.variables.push(var);
            }
            vars.balance = Some(BalanceVars {
                longest_range,
                average,
                deviation_range,
            });
        }

        debug_assert_eq!(num_variables, vars.variables.len());
        vars
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn all(&self) -> &[Var] {
        &self.variables
    }

    pub fn arc_index(&self, i: NodeId, j: NodeId, k: VehicleId) -> usize {
        let n = self.num_nodes;
        debug_assert!(k < self.num_vehicles);
        debug_assert!(i < n);
        debug_assert!(j < n);
        debug_assert!(i != j);

        let j_block_size = n - 1;
        let i_j_block_size = n * j_block_size;
        let offset = self.arc_range.0 + k * i_j_block_size + i * j_block_size;
        let result = offset + if j > i { j - 1 } else { j };
        debug_assert!(result < self.arc_range.1);

        result
    }

    pub fn arc(&self, i: NodeId, j: NodeId, k: VehicleId) -> Var {
        self.variables[self.arc_index(i, j, k)]
    }

    pub fn departure_index(&self, i: NodeId, k: VehicleId) -> usize {
        debug_assert!(k < self.num_vehicles);
        debug_assert!(i < self.num_nodes);

        let result = self.departure_range.0 + k * self.num_nodes + i;
        debug_assert!(result < self.departure_range.1);

        result
    }

    pub fn departure(&self, i: NodeId, k: VehicleId) -> Var {
        self.variables[self.departure_index(i, k)]
    }

    pub fn duration_index(&self, j: NodeId, k: VehicleId) -> usize {
        debug_assert!(k < self.num_vehicles);
        debug_assert!(j >= 1);
        debug_assert!(j < self.num_nodes);

        let result = self.duration_range.0 + k * (self.num_nodes - 1) + j - 1;
        debug_assert!(result < self.duration_range.1);

        result
    }

    pub fn duration(&self, j: NodeId, k: VehicleId) -> Var {
        self.variables[self.duration_index(j, k)]
    }

    pub fn assignment_index(&self, i: NodeId, k: VehicleId) -> usize {
        debug_assert!(k < self.num_vehicles);
        debug_assert!(i >= 1);
        debug_assert!(i < self.num_nodes);

        let range = self
            .assignment_range
            .expect("assignment variables are only declared when a capability needs them");
        let result = range.0 + k * (self.num_nodes - 1) + i - 1;
        debug_assert!(result < range.1);

        result
    }

    pub fn assignment(&self, i: NodeId, k: VehicleId) -> Var {
        self.variables[self.assignment_index(i, k)]
    }

    pub fn has_assignment(&self) -> bool {
        self.assignment_range.is_some()
    }

    pub fn balance(&self) -> Option<&BalanceVars> {
        self.balance.as_ref()
    }

    pub fn longest(&self, k: VehicleId) -> Option<Var> {
        debug_assert!(k < self.num_vehicles);
        self.balance
            .as_ref()
            .map(|b| self.variables[b.longest_range.0 + k])
    }

    pub fn average(&self) -> Option<Var> {
        self.balance.as_ref().map(|b| b.average)
    }

    pub fn deviation(&self, k: VehicleId) -> Option<Var> {
        debug_assert!(k < self.num_vehicles);
        self.balance
            .as_ref()
            .map(|b| self.variables[b.deviation_range.0 + k])
    }
}

/// A fully built model together with everything needed to read its values
pub struct Formulation<'a> {
    pub instance: &'a Instance,
    pub distances: &'a DistanceMatrix,
    pub capabilities: Capabilities,
    pub model: Model,
    pub vars: Variables,
}

pub struct ModelBuilder<'a> {
    instance: &'a Instance,
    distances: &'a DistanceMatrix,
    capabilities: Capabilities,
    big_m: BigMPolicy,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(instance: &'a Instance, distances: &'a DistanceMatrix) -> Self {
        debug_assert_eq!(instance.num_nodes, distances.num_nodes());
        ModelBuilder {
            instance,
            distances,
            capabilities: Capabilities::default(),
            big_m: BigMPolicy::default(),
        }
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn big_m(mut self, policy: BigMPolicy) -> Self {
        self.big_m = policy;
        self
    }

    pub fn build(self) -> Result<Formulation<'a>, InputError> {
        let instance = self.instance;
        let capabilities = self.capabilities;
        if capabilities.time_windows && !instance.has_time_windows() {
            return Err(InputError::MissingTimeWindows);
        }
        if !capabilities.restrictions && !instance.restrictions.is_empty() {
            warn!(
                count = instance.restrictions.len(),
                "restrictions are disabled, ignoring the instance's restriction triples"
            );
        }

        let big_m = BigM::new(
            instance,
            self.distances,
            self.big_m,
            capabilities.time_windows,
        );
        let mut lp = Model::new("vrp");
        let vars = Variables::new(instance, &big_m, capabilities, &mut lp);

        self.add_service_constraints(&mut lp, &vars);
        self.add_flow_constraints(&mut lp, &vars);
        self.add_depot_constraints(&mut lp, &vars);
        self.add_capacity_constraints(&mut lp, &vars);
        self.add_time_constraints(&mut lp, &vars, &big_m);
        self.add_duration_constraints(&mut lp, &vars, &big_m);
        if vars.has_assignment() {
            self.add_assignment_constraints(&mut lp, &vars);
        }
        if capabilities.time_windows {
            self.add_time_window_constraints(&mut lp, &vars, &big_m);
        }
        if capabilities.restrictions {
            self.add_restriction_constraints(&mut lp, &vars);
        }
        if capabilities.workload_balance {
            self.add_balance_constraints(&mut lp, &vars);
        }

        info!(
            variables = lp.num_vars(),
            constraints = lp.num_constrs(),
            big_m = ?big_m.policy(),
            ?capabilities,
            "built routing model"
        );

        Ok(Formulation {
            instance,
            distances: self.distances,
            capabilities,
            model: lp,
            vars,
        })
    }

    fn inflow(&self, vars: &Variables, i: NodeId, k: VehicleId) -> LinExpr {
        self.instance
            .all_nodes_except(i)
            .map(|j| (1.0, vars.arc(j, i, k)))
            .collect()
    }

    /// Every customer is entered exactly once over all vehicles
    fn add_service_constraints(&self, lp: &mut Model, vars: &Variables) {
        let problem = self.instance;
        for i in problem.all_customers() {
            let mut lhs = LinExpr::new();
            for k in problem.all_vehicles() {
                for j in problem.all_nodes_except(i) {
                    lhs.add_term(1.0, vars.arc(j, i, k));
                }
            }
            lp.add_constr(&format!("serve_{i}"), lhs, Sense::Equal, 1.0);
        }
    }

    /// A vehicle entering a customer also leaves it
    fn add_flow_constraints(&self, lp: &mut Model, vars: &Variables) {
        let problem = self.instance;
        for i in problem.all_customers() {
            for k in problem.all_vehicles() {
                let mut lhs = self.inflow(vars, i, k);
                for j in problem.all_nodes_except(i) {
                    lhs.add_term(-1.0, vars.arc(i, j, k));
                }
                lp.add_constr(&format!("flow_{i}_{k}"), lhs, Sense::Equal, 0.0);
            }
        }
    }

    fn add_depot_constraints(&self, lp: &mut Model, vars: &Variables) {
        let problem = self.instance;
        for k in problem.all_vehicles() {
            let outflow: LinExpr = problem
                .all_customers()
                .map(|j| (1.0, vars.arc(0, j, k)))
                .collect();

            let mut lhs = outflow.clone();
            for j in problem.all_customers() {
                lhs.add_term(-1.0, vars.arc(j, 0, k));
            }
            lp.add_constr(&format!("depot_flow_{k}"), lhs, Sense::Equal, 0.0);

            if self.capabilities.use_all_vehicles {
                lp.add_constr(&format!("use_vehicle_{k}"), outflow, Sense::Equal, 1.0);
            } else {
                lp.add_constr(&format!("depot_out_{k}"), outflow, Sense::Less, 1.0);
            }
        }
    }

    fn add_capacity_constraints(&self, lp: &mut Model, vars: &Variables) {
        let problem = self.instance;
        for k in problem.all_vehicles() {
            let mut lhs = LinExpr::new();
            for i in problem.all_customers() {
                let weight = problem.weight(i);
                for j in problem.all_nodes_except(i) {
                    lhs.add_term(weight, vars.arc(j, i, k));
                }
            }
            lp.add_constr(
                &format!("capacity_{k}"),
                lhs,
                Sense::Less,
                problem.capacity,
            );
        }
    }

    /// Service start times propagate along used arcs; also anchors the
    /// depot departure at 0
    fn add_time_constraints(&self, lp: &mut Model, vars: &Variables, big_m: &BigM) {
        let problem = self.instance;
        for k in problem.all_vehicles() {
            for i in problem.all_nodes() {
                for j in problem.all_customers().filter(|j| *j != i) {
                    // y_j - y_i - M x_ij >= t_ij + s_i - M
                    let m = big_m.propagation(i, j);
                    let mut lhs = LinExpr::new();
                    lhs.add_term(1.0, vars.departure(j, k))
                        .add_term(-1.0, vars.departure(i, k))
                        .add_term(-m, vars.arc(i, j, k));
                    let rhs = self.distances.get(i, j) + problem.service_time(i) - m;
                    lp.add_constr(&format!("time_{i}_{j}_{k}"), lhs, Sense::Greater, rhs);
                }
            }

            let mut lhs = LinExpr::new();
            lhs.add_term(1.0, vars.departure(0, k));
            lp.add_constr(&format!("depart_{k}"), lhs, Sense::Equal, 0.0);
        }
    }

    /// Route duration is recorded on the arc closing the route and capped there
    fn add_duration_constraints(&self, lp: &mut Model, vars: &Variables, big_m: &BigM) {
        let problem = self.instance;
        for k in problem.all_vehicles() {
            for j in problem.all_customers() {
                // d_j - y_j - M x_j0 >= s_j + t_j0 - M
                let m = big_m.duration(j);
                let mut lhs = LinExpr::new();
                lhs.add_term(1.0, vars.duration(j, k))
                    .add_term(-1.0, vars.departure(j, k))
                    .add_term(-m, vars.arc(j, 0, k));
                let rhs = problem.service_time(j) + self.distances.get(j, 0) - m;
                lp.add_constr(
                    &format!("route_duration_{j}_{k}"),
                    lhs,
                    Sense::Greater,
                    rhs,
                );

                // d_j - t_max x_j0 <= 0
                let mut lhs = LinExpr::new();
                lhs.add_term(1.0, vars.duration(j, k))
                    .add_term(-problem.max_duration, vars.arc(j, 0, k));
                lp.add_constr(
                    &format!("max_route_duration_{j}_{k}"),
                    lhs,
                    Sense::Less,
                    0.0,
                );
            }
        }
    }

    /// z equals the number of arcs entering the customer with that vehicle
    fn add_assignment_constraints(&self, lp: &mut Model, vars: &Variables) {
        let problem = self.instance;
        for i in problem.all_customers() {
            for k in problem.all_vehicles() {
                let mut lhs = self.inflow(vars, i, k);
                lhs.add_term(-1.0, vars.assignment(i, k));
                lp.add_constr(&format!("assign_{i}_{k}"), lhs, Sense::Equal, 0.0);
            }
        }
    }

    fn add_time_window_constraints(&self, lp: &mut Model, vars: &Variables, big_m: &BigM) {
        let problem = self.instance;
        for i in problem.all_customers() {
            let Some(window) = problem.time_window(i) else {
                continue;
            };
            for k in problem.all_vehicles() {
                // y_i - a_i z_i >= 0
                let mut lhs = LinExpr::new();
                lhs.add_term(1.0, vars.departure(i, k))
                    .add_term(-window.earliest, vars.assignment(i, k));
                lp.add_constr(
                    &format!("time_window_min_{i}_{k}"),
                    lhs,
                    Sense::Greater,
                    0.0,
                );

                // y_i + M z_i <= b_i + M
                let m = big_m.window(i);
                let mut lhs = LinExpr::new();
                lhs.add_term(1.0, vars.departure(i, k))
                    .add_term(m, vars.assignment(i, k));
                lp.add_constr(
                    &format!("time_window_max_{i}_{k}"),
                    lhs,
                    Sense::Less,
                    window.latest + m,
                );
            }
        }
    }

    fn add_restriction_constraints(&self, lp: &mut Model, vars: &Variables) {
        let problem = self.instance;
        for restriction in problem.restrictions.iter() {
            let [i, j, l] = restriction.customers();
            for k in problem.all_vehicles() {
                let lhs: LinExpr = [i, j, l]
                    .into_iter()
                    .map(|c| (1.0, vars.assignment(c, k)))
                    .collect();
                lp.add_constr(
                    &format!("restriction_{i}_{j}_{l}_{k}"),
                    lhs,
                    Sense::Less,
                    2.0,
                );
            }
        }
    }

    fn add_balance_constraints(&self, lp: &mut Model, vars: &Variables) {
        let problem = self.instance;
        let Some(average) = vars.average() else {
            return;
        };

        for k in problem.all_vehicles() {
            let Some(longest) = vars.longest(k) else {
                continue;
            };
            for j in problem.all_customers() {
                let mut lhs = LinExpr::new();
                lhs.add_term(1.0, longest).add_term(-1.0, vars.duration(j, k));
                lp.add_constr(
                    &format!("total_duration_{j}_{k}"),
                    lhs,
                    Sense::Greater,
                    0.0,
                );
            }
        }

        // K * T_avg - sum_k T_k == 0
        let mut lhs = LinExpr::new();
        lhs.add_term(problem.num_vehicles as f64, average);
        for k in problem.all_vehicles() {
            if let Some(longest) = vars.longest(k) {
                lhs.add_term(-1.0, longest);
            }
        }
        lp.add_constr("average_duration", lhs, Sense::Equal, 0.0);

        for k in problem.all_vehicles() {
            let (Some(deviation), Some(longest)) = (vars.deviation(k), vars.longest(k)) else {
                continue;
            };

            let mut lhs = LinExpr::new();
            lhs.add_term(1.0, deviation)
                .add_term(-1.0, longest)
                .add_term(1.0, average);
            lp.add_constr(&format!("dev_pos_{k}"), lhs, Sense::Greater, 0.0);

            let mut lhs = LinExpr::new();
            lhs.add_term(1.0, deviation)
                .add_term(1.0, longest)
                .add_term(-1.0, average);
            lp.add_constr(&format!("dev_neg_{k}"), lhs, Sense::Greater, 0.0);
        }
    }
}
