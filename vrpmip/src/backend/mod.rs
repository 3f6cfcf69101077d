//! The seam to external MIP solvers.
//!
//! Status codes follow the Gurobi numbering so that every backend reports the
//! same raw code for the same outcome.

use crate::error::SolverError;
use crate::model::{LinExpr, Model};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[cfg(feature = "gurobi")]
mod gurobi;
#[cfg(feature = "microlp")]
mod microlp;

#[cfg(feature = "gurobi")]
pub use gurobi::Gurobi;
#[cfg(feature = "microlp")]
pub use microlp::MicroLp;

pub const CODE_OPTIMAL: i32 = 2;
pub const CODE_INFEASIBLE: i32 = 3;
pub const CODE_INF_OR_UNBD: i32 = 4;
pub const CODE_UNBOUNDED: i32 = 5;
pub const CODE_TIME_LIMIT: i32 = 9;

/// Terminal state of one solver run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Optimal,
    Infeasible,
    /// A resource budget ran out; `incumbent` tells whether a feasible
    /// solution is available anyway
    LimitReached { code: i32, incumbent: bool },
    Other { code: i32 },
}

impl Status {
    pub fn code(&self) -> i32 {
        match self {
            Status::Optimal => CODE_OPTIMAL,
            Status::Infeasible => CODE_INFEASIBLE,
            Status::LimitReached { code, .. } | Status::Other { code } => *code,
        }
    }

    /// Whether every variable carries a meaningful value
    pub fn has_values(&self) -> bool {
        matches!(
            self,
            Status::Optimal
                | Status::LimitReached {
                    incumbent: true,
                    ..
                }
        )
    }

    pub fn is_optimal(&self) -> bool {
        *self == Status::Optimal
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Optimal => write!(f, "Optimal"),
            Status::Infeasible => write!(f, "Infeasible"),
            Status::LimitReached {
                code,
                incumbent: true,
            } => write!(f, "Limit reached with feasible solution (status {code})"),
            Status::LimitReached {
                code,
                incumbent: false,
            } => write!(f, "Limit reached without feasible solution (status {code})"),
            Status::Other { code } => write!(f, "No optimal solution found (status {code})"),
        }
    }
}

/// What a solver hands back: a status and, if it has them, one value per
/// model variable in [`Model::vars`] order
#[derive(Debug, Clone, PartialEq)]
pub struct RawSolution {
    pub status: Status,
    pub objective: Option<f64>,
    pub values: Option<Vec<f64>>,
}

impl RawSolution {
    pub fn without_values(status: Status) -> Self {
        RawSolution {
            status,
            objective: None,
            values: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverParams {
    /// Wall-clock budget for each solver run
    pub time_limit: Option<Duration>,
    pub threads: Option<usize>,
    /// Let the solver print its own log
    pub output: bool,
}

/// A mixed-integer solver minimising `objective` over `model`
pub trait MipSolver {
    fn solve(
        &mut self,
        model: &Model,
        objective: &LinExpr,
        params: &SolverParams,
    ) -> Result<RawSolution, SolverError>;
}

impl<S: MipSolver + ?Sized> MipSolver for &mut S {
    fn solve(
        &mut self,
        model: &Model,
        objective: &LinExpr,
        params: &SolverParams,
    ) -> Result<RawSolution, SolverError> {
        (**self).solve(model, objective, params)
    }
}
