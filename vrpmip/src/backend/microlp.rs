use super::{MipSolver, RawSolution, SolverParams, Status, CODE_UNBOUNDED};
use crate::error::SolverError;
use crate::model::{LinExpr, Model, Sense, VarType};
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use tracing::{debug, warn};

/// Pure Rust branch-and-bound through `good_lp`'s microlp solver.
///
/// Fine for instances with a handful of customers; runs single-threaded and
/// without a time budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLp;

fn expression(expr: &LinExpr, vars: &[Variable], sign: f64) -> Expression {
    let mut result = Expression::with_capacity(expr.terms().len());
    for (var, coeff) in expr.terms() {
        result.add_mul(sign * coeff, vars[var.index()]);
    }
    result += sign * expr.constant();
    result
}

impl MipSolver for MicroLp {
    fn solve(
        &mut self,
        model: &Model,
        objective: &LinExpr,
        params: &SolverParams,
    ) -> Result<RawSolution, SolverError> {
        if params.time_limit.is_some() || params.threads.is_some() {
            warn!("microlp backend ignores time limit and thread settings");
        }

        let mut problem = ProblemVariables::new();
        let vars = model
            .vars()
            .iter()
            .map(|def| {
                let definition = match def.vtype {
                    VarType::Binary => variable().binary(),
                    VarType::Continuous => variable().min(def.lb).max(def.ub),
                };
                problem.add(definition.name(def.name.clone()))
            })
            .collect::<Vec<_>>();

        let mut lp = problem
            .minimise(expression(objective, &vars, 1.0))
            .using(good_lp::microlp);
        for constr in model.constrs() {
            let c = match constr.sense {
                Sense::Less => constraint::leq(expression(&constr.lhs, &vars, 1.0), constr.rhs),
                Sense::Greater => {
                    constraint::leq(expression(&constr.lhs, &vars, -1.0), -constr.rhs)
                }
                Sense::Equal => constraint::eq(expression(&constr.lhs, &vars, 1.0), constr.rhs),
            };
            lp.add_constraint(c);
        }

        debug!(
            model = model.name(),
            variables = model.num_vars(),
            constraints = model.num_constrs(),
            "running microlp"
        );

        match lp.solve() {
            Ok(solution) => {
                let values = vars.iter().map(|var| solution.value(*var)).collect::<Vec<_>>();
                Ok(RawSolution {
                    status: Status::Optimal,
                    objective: Some(objective.evaluate(&values)),
                    values: Some(values),
                })
            }
            Err(ResolutionError::Infeasible) => Ok(RawSolution::without_values(Status::Infeasible)),
            Err(ResolutionError::Unbounded) => Ok(RawSolution::without_values(Status::Other {
                code: CODE_UNBOUNDED,
            })),
            Err(error) => Err(SolverError::Backend(error.to_string())),
        }
    }
}
