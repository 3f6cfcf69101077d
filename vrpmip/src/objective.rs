use crate::backend::{MipSolver, RawSolution, SolverParams};
use crate::error::{InputError, SolverError};
use crate::formulation::Formulation;
use crate::model::{LinExpr, Model, Sense};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::info;

/// Default absolute degradation allowed when fixing a solved tier
pub const DEFAULT_ABS_TOL: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectiveKind {
    /// Sum of travel times over used arcs
    TravelTime,
    /// Sum of the per-vehicle deviations from the mean route duration
    WorkloadDeviation,
}

impl ObjectiveKind {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectiveKind::TravelTime => "total_travel_time",
            ObjectiveKind::WorkloadDeviation => "workload_balance",
        }
    }
}

/// One level of a hierarchical objective. Higher priorities are optimised
/// first; later tiers may worsen this one by at most
/// `max(abs_tol, rel_tol * |optimum|)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveTier {
    pub kind: ObjectiveKind,
    pub priority: i32,
    pub rel_tol: f64,
    pub abs_tol: f64,
}

impl ObjectiveTier {
    pub fn new(kind: ObjectiveKind, priority: i32, rel_tol: f64) -> Self {
        ObjectiveTier {
            kind,
            priority,
            rel_tol,
            abs_tol: DEFAULT_ABS_TOL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Objective {
    #[default]
    TravelTime,
    Hierarchical(Vec<ObjectiveTier>),
}

impl Objective {
    /// Travel time first with `rel_tol` slack, then workload deviation
    pub fn balanced(rel_tol: f64) -> Self {
        Objective::Hierarchical(vec![
            ObjectiveTier::new(ObjectiveKind::TravelTime, 1, rel_tol),
            ObjectiveTier::new(ObjectiveKind::WorkloadDeviation, 0, 0.0),
        ])
    }

    pub fn tiers(&self) -> Vec<ObjectiveTier> {
        match self {
            Objective::TravelTime => vec![ObjectiveTier::new(ObjectiveKind::TravelTime, 0, 0.0)],
            Objective::Hierarchical(tiers) => tiers.clone(),
        }
    }
}

/// Objective expressions of a formulation, in solve order
#[derive(Debug)]
pub struct ObjectiveManager {
    tiers: Vec<(ObjectiveTier, LinExpr)>,
}

impl ObjectiveManager {
    pub fn new(formulation: &Formulation, objective: &Objective) -> Result<Self, InputError> {
        let mut tiers = objective.tiers();
        if tiers.is_empty() {
            return Err(InputError::EmptyObjective);
        }

        let mut priorities = HashSet::new();
        for tier in tiers.iter() {
            if !priorities.insert(tier.priority) {
                return Err(InputError::DuplicatePriority(tier.priority));
            }
            for tol in [tier.rel_tol, tier.abs_tol] {
                if !(tol.is_finite() && tol >= 0.0) {
                    return Err(InputError::InvalidTolerance(tol));
                }
            }
        }
        tiers.sort_by_key(|tier| std::cmp::Reverse(tier.priority));

        let tiers = tiers
            .into_iter()
            .map(|tier| Self::expression(formulation, tier.kind).map(|expr| (tier, expr)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ObjectiveManager { tiers })
    }

    pub fn expression(
        formulation: &Formulation,
        kind: ObjectiveKind,
    ) -> Result<LinExpr, InputError> {
        let vars = &formulation.vars;
        let instance = formulation.instance;
        match kind {
            ObjectiveKind::TravelTime => {
                let mut expr = LinExpr::new();
                for k in instance.all_vehicles() {
                    for (i, j, travel) in formulation.distances.arcs() {
                        expr.add_term(travel, vars.arc(i, j, k));
                    }
                }
                Ok(expr)
            }
            ObjectiveKind::WorkloadDeviation => instance
                .all_vehicles()
                .map(|k| vars.deviation(k).map(|dev| (1.0, dev)))
                .collect::<Option<LinExpr>>()
                .ok_or(InputError::DeviationWithoutBalancing),
        }
    }

    pub fn tiers(&self) -> impl Iterator<Item = &ObjectiveTier> {
        self.tiers.iter().map(|(tier, _)| tier)
    }

    /// Solves the tiers lexicographically. Each solved tier is turned into a
    /// constraint bounding it by its optimum plus tolerance before the next
    /// tier runs. Stops at the first tier that is not solved to optimality.
    pub fn optimize<S: MipSolver + ?Sized>(
        &self,
        model: &Model,
        solver: &mut S,
        params: &SolverParams,
    ) -> Result<RawSolution, SolverError> {
        let mut model = Cow::Borrowed(model);
        let last = self.tiers.len().saturating_sub(1);

        for (index, (tier, expr)) in self.tiers.iter().enumerate() {
            let raw = solver.solve(&model, expr, params)?;
            info!(
                objective = tier.kind.name(),
                priority = tier.priority,
                status = %raw.status,
                value = ?raw.objective,
                "solved objective tier"
            );
            if index == last || !raw.status.is_optimal() {
                return Ok(raw);
            }

            let value = match (raw.objective, &raw.values) {
                (Some(value), _) => value,
                (None, Some(values)) => expr.evaluate(values),
                (None, None) => return Ok(raw),
            };
            let bound = value + f64::max(tier.abs_tol, tier.rel_tol * value.abs());
            model.to_mut().add_constr(
                &format!("objective_{}", tier.kind.name()),
                expr.clone(),
                Sense::Less,
                bound,
            );
        }

        Err(SolverError::Backend("no objective to optimise".to_string()))
    }
}
