use crate::error::InputError;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Position {
        Position { x, y }
    }

    pub fn distance(&self, other: &Self) -> f64 {
        let xdist = self.x - other.x;
        let ydist = self.y - other.y;
        f64::sqrt(xdist * xdist + ydist * ydist)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

pub type NodeId = usize;
pub type VehicleId = usize;

/// Allowed interval for the service start at a customer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub earliest: f64,
    pub latest: f64,
}

impl TimeWindow {
    pub fn new(earliest: f64, latest: f64) -> Self {
        TimeWindow { earliest, latest }
    }

    pub fn contains(&self, time: f64, tolerance: f64) -> bool {
        time >= self.earliest - tolerance && time <= self.latest + tolerance
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.earliest, self.latest)
    }
}

/// Customer `.2` must not be served by a vehicle that serves both `.0` and `.1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Restriction(pub NodeId, pub NodeId, pub NodeId);

impl Restriction {
    pub fn customers(&self) -> [NodeId; 3] {
        [self.0, self.1, self.2]
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone)]
pub struct Depot {
    pub position: Position,
}

impl fmt::Display for Depot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Depot at {}", self.position)
    }
}

#[derive(Debug, Clone)]
pub struct Customer {
    pub id: NodeId,
    pub position: Position,
    pub weight: f64,
    pub service_time: f64,
    pub window: Option<TimeWindow>,
}

impl fmt::Display for Customer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Customer {} at {} w/ weight {}, service time {}",
            self.id, self.position, self.weight, self.service_time
        )?;
        if let Some(window) = &self.window {
            write!(f, ", window {}", window)?;
        }
        Ok(())
    }
}

pub trait Site {
    /// Returns the numeric identifier
    fn id(&self) -> NodeId;

    /// Returns the demand weight
    fn weight(&self) -> f64;

    /// Returns the service duration
    fn service_time(&self) -> f64;

    /// Returns the position
    fn position(&self) -> &Position;
}

impl Site for Depot {
    fn id(&self) -> NodeId {
        0
    }

    fn weight(&self) -> f64 {
        0.0
    }

    fn service_time(&self) -> f64 {
        0.0
    }

    fn position(&self) -> &Position {
        &self.position
    }
}

impl Site for Customer {
    fn id(&self) -> NodeId {
        self.id
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn service_time(&self) -> f64 {
        self.service_time
    }

    fn position(&self) -> &Position {
        &self.position
    }
}

/// Raw problem input, depot first in `positions` and `service_times`.
///
/// `weights` and `time_windows` are indexed by customer, i.e. entry `i - 1`
/// belongs to node `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceData {
    pub positions: Vec<Position>,
    pub weights: Vec<f64>,
    pub service_times: Vec<f64>,
    pub num_vehicles: usize,
    pub capacity: f64,
    pub max_duration: f64,
    #[serde(default)]
    pub time_windows: Option<Vec<TimeWindow>>,
    #[serde(default)]
    pub restrictions: Vec<Restriction>,
}

/// A validated problem instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "InstanceData", into = "InstanceData")]
pub struct Instance {
    pub num_nodes: usize,
    pub num_customers: usize,
    pub num_vehicles: usize,
    pub capacity: f64,
    pub max_duration: f64,
    pub depot: Depot,
    pub customers: Vec<Customer>,
    pub restrictions: Vec<Restriction>,
    has_time_windows: bool,
}

impl Instance {
    pub fn new(data: InstanceData) -> Result<Instance, InputError> {
        let InstanceData {
            positions,
            weights,
            service_times,
            num_vehicles,
            capacity,
            max_duration,
            time_windows,
            restrictions,
        } = data;

        let num_customers = weights.len();
        if num_customers == 0 {
            return Err(InputError::NoCustomers);
        }
        let num_nodes = num_customers + 1;
        check_len("positions", num_nodes, positions.len())?;
        check_len("service times", num_nodes, service_times.len())?;
        if let Some(windows) = &time_windows {
            check_len("time windows", num_customers, windows.len())?;
        }

        if num_vehicles == 0 {
            return Err(InputError::NoVehicles);
        }
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(InputError::NonPositiveCapacity(capacity));
        }
        if !(max_duration.is_finite() && max_duration > 0.0) {
            return Err(InputError::NonPositiveDuration(max_duration));
        }

        for (node, pos) in positions.iter().enumerate() {
            if !(pos.x.is_finite() && pos.y.is_finite()) {
                return Err(InputError::NonFinitePosition { node });
            }
        }
        for (node, &value) in service_times.iter().enumerate() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(InputError::NegativeServiceTime { node, value });
            }
        }
        if service_times[0] != 0.0 {
            warn!(value = service_times[0], "ignoring service time of the depot");
        }

        let mut customers = Vec::with_capacity(num_customers);
        for index in 0..num_customers {
            let id = index + 1;
            let weight = weights[index];
            if !(weight.is_finite() && weight > 0.0) {
                return Err(InputError::NonPositiveWeight { customer: id, weight });
            }
            let window = match &time_windows {
                Some(windows) => {
                    let window = windows[index];
                    if !(window.earliest.is_finite()
                        && window.latest.is_finite()
                        && window.earliest >= 0.0
                        && window.earliest <= window.latest)
                    {
                        return Err(InputError::InvalidTimeWindow {
                            customer: id,
                            earliest: window.earliest,
                            latest: window.latest,
                        });
                    }
                    Some(window)
                }
                None => None,
            };
            customers.push(Customer {
                id,
                position: positions[id],
                weight,
                service_time: service_times[id],
                window,
            });
        }

        for restriction in restrictions.iter() {
            let nodes = restriction.customers();
            for node in nodes {
                if node == 0 || node > num_customers {
                    return Err(InputError::RestrictionOutOfRange {
                        restriction: *restriction,
                        node,
                    });
                }
            }
            if nodes[0] == nodes[1] || nodes[0] == nodes[2] || nodes[1] == nodes[2] {
                return Err(InputError::RestrictionRepeatsCustomer(*restriction));
            }
        }

        Ok(Instance {
            num_nodes,
            num_customers,
            num_vehicles,
            capacity,
            max_duration,
            depot: Depot {
                position: positions[0],
            },
            customers,
            restrictions,
            has_time_windows: time_windows.is_some(),
        })
    }

    pub fn site(&self, index: NodeId) -> &dyn Site {
        if index == 0 {
            &self.depot
        } else {
            &self.customers[index - 1]
        }
    }

    pub fn customer(&self, index: NodeId) -> &Customer {
        debug_assert!(index >= 1 && index <= self.num_customers);
        &self.customers[index - 1]
    }

    pub fn positions(&self) -> Vec<Position> {
        self.all_nodes()
            .map(|i| *self.site(i).position())
            .collect()
    }

    pub fn weight(&self, i: NodeId) -> f64 {
        self.site(i).weight()
    }

    pub fn service_time(&self, i: NodeId) -> f64 {
        self.site(i).service_time()
    }

    pub fn time_window(&self, i: NodeId) -> Option<TimeWindow> {
        if i == 0 {
            None
        } else {
            self.customer(i).window
        }
    }

    pub fn has_time_windows(&self) -> bool {
        self.has_time_windows
    }

    pub fn total_weight(&self) -> f64 {
        self.customers.iter().map(|c| c.weight).sum()
    }

    pub fn all_vehicles(&self) -> impl Iterator<Item = VehicleId> {
        0..self.num_vehicles
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = NodeId> {
        0..self.num_nodes
    }

    pub fn all_nodes_except(&self, exception: NodeId) -> impl Iterator<Item = NodeId> {
        self.all_nodes().filter(move |i| *i != exception)
    }

    pub fn all_customers(&self) -> impl Iterator<Item = NodeId> {
        1..self.num_nodes
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), InputError> {
    if expected == actual {
        Ok(())
    } else {
        Err(InputError::Length {
            what,
            expected,
            actual,
        })
    }
}

impl TryFrom<InstanceData> for Instance {
    type Error = InputError;

    fn try_from(data: InstanceData) -> Result<Self, Self::Error> {
        Instance::new(data)
    }
}

impl From<Instance> for InstanceData {
    fn from(instance: Instance) -> Self {
        let mut positions = vec![instance.depot.position];
        positions.extend(instance.customers.iter().map(|c| c.position));
        let mut service_times = vec![0.0];
        service_times.extend(instance.customers.iter().map(|c| c.service_time));
        let time_windows = if instance.has_time_windows {
            instance.customers.iter().map(|c| c.window).collect()
        } else {
            None
        };

        InstanceData {
            positions,
            weights: instance.customers.iter().map(|c| c.weight).collect(),
            service_times,
            num_vehicles: instance.num_vehicles,
            capacity: instance.capacity,
            max_duration: instance.max_duration,
            time_windows,
            restrictions: instance.restrictions,
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Problem with {} customers and {} vehicles of capacity {}, max duration {}:",
            self.num_customers, self.num_vehicles, self.capacity, self.max_duration
        )?;
        writeln!(f, "    {}", self.depot)?;
        for customer in &self.customers {
            writeln!(f, "    {}", customer)?
        }
        for restriction in &self.restrictions {
            writeln!(f, "    Restriction {}", restriction)?
        }
        Ok(())
    }
}
