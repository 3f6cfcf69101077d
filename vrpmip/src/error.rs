use crate::backend::Status;
use crate::problem::{NodeId, Restriction, VehicleId};
use thiserror::Error;

/// Contract violations detected before any model is built
#[derive(Debug, Error)]
pub enum InputError {
    #[error("instance needs at least one customer besides the depot")]
    NoCustomers,
    #[error("expected {expected} {what}, got {actual}")]
    Length {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("position of node {node} is not finite")]
    NonFinitePosition { node: NodeId },
    #[error("service time of node {node} must be non-negative, got {value}")]
    NegativeServiceTime { node: NodeId, value: f64 },
    #[error("weight of customer {customer} must be positive, got {weight}")]
    NonPositiveWeight { customer: NodeId, weight: f64 },
    #[error("fleet needs at least one vehicle")]
    NoVehicles,
    #[error("vehicle capacity must be positive, got {0}")]
    NonPositiveCapacity(f64),
    #[error("maximum route duration must be positive, got {0}")]
    NonPositiveDuration(f64),
    #[error("time window [{earliest}, {latest}] of customer {customer} is invalid")]
    InvalidTimeWindow {
        customer: NodeId,
        earliest: f64,
        latest: f64,
    },
    #[error("restriction {restriction} references node {node}, which is not a customer")]
    RestrictionOutOfRange {
        restriction: Restriction,
        node: NodeId,
    },
    #[error("restriction {0} names the same customer twice")]
    RestrictionRepeatsCustomer(Restriction),
    #[error("time windows are enabled but the instance has none")]
    MissingTimeWindows,
    #[error("workload deviation objective requires workload balancing")]
    DeviationWithoutBalancing,
    #[error("objective has no tiers")]
    EmptyObjective,
    #[error("two objective tiers share priority {0}")]
    DuplicatePriority(i32),
    #[error("objective tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver backend failed: {0}")]
    Backend(String),
    #[cfg(feature = "gurobi")]
    #[error(transparent)]
    Gurobi(#[from] grb::Error),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no variable values available for status {0}")]
    NotSolved(Status),
    #[error("expected {expected} variable values, got {actual}")]
    ValueCount { expected: usize, actual: usize },
    #[error("route of vehicle {vehicle} stops at node {node} without returning to the depot")]
    BrokenRoute { vehicle: VehicleId, node: NodeId },
    #[error("route of vehicle {vehicle} has several successors at node {node}")]
    AmbiguousSuccessor { vehicle: VehicleId, node: NodeId },
    #[error("route of vehicle {vehicle} visits node {node} twice")]
    Revisit { vehicle: VehicleId, node: NodeId },
    #[error("customers {missing:?} are not on a depot route (detached cycles: {cycles:?})")]
    Uncovered {
        missing: Vec<NodeId>,
        cycles: Vec<Vec<NodeId>>,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

pub type Result<T> = std::result::Result<T, Error>;
