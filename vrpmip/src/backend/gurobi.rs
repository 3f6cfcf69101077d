use super::{MipSolver, RawSolution, SolverParams, Status};
use crate::error::SolverError;
use crate::model::{LinExpr, Model, Sense, VarType};
use tracing::{debug, info};

/// Gurobi through the `grb` bindings; needs a local installation and licence
pub struct Gurobi {
    env: grb::Env,
}

impl Gurobi {
    pub fn new() -> grb::Result<Self> {
        let mut env = grb::Env::new("")?;
        env.set(grb::param::OutputFlag, 0)?;

        Ok(Gurobi { env })
    }

    fn linexpr(expr: &LinExpr, vars: &[grb::Var]) -> grb::expr::LinExpr {
        let mut result = grb::expr::LinExpr::new();
        for (var, coeff) in expr.terms() {
            result.add_term(*coeff, vars[var.index()]);
        }
        result.add_constant(expr.constant());
        result
    }

    fn status(status: grb::Status, incumbent: bool) -> Status {
        match status {
            grb::Status::Optimal => Status::Optimal,
            grb::Status::Infeasible => Status::Infeasible,
            grb::Status::TimeLimit
            | grb::Status::NodeLimit
            | grb::Status::IterationLimit
            | grb::Status::SolutionLimit
            | grb::Status::Interrupted => Status::LimitReached {
                code: status as i32,
                incumbent,
            },
            other => Status::Other { code: other as i32 },
        }
    }
}

impl MipSolver for Gurobi {
    fn solve(
        &mut self,
        model: &Model,
        objective: &LinExpr,
        params: &SolverParams,
    ) -> Result<RawSolution, SolverError> {
        let mut lp = grb::Model::with_env(model.name(), &self.env)?;

        lp.set_param(grb::param::OutputFlag, i32::from(params.output))?;
        if let Some(limit) = params.time_limit {
            lp.set_param(grb::param::TimeLimit, limit.as_secs_f64())?;
        }
        if let Some(threads) = params.threads {
            lp.set_param(grb::param::Threads, threads as i32)?;
        }

        let vars = model
            .vars()
            .iter()
            .map(|def| {
                let vtype = match def.vtype {
                    VarType::Binary => grb::VarType::Binary,
                    VarType::Continuous => grb::VarType::Continuous,
                };
                lp.add_var(&def.name, vtype, 0.0, def.lb, def.ub, std::iter::empty())
            })
            .collect::<grb::Result<Vec<_>>>()?;

        for constr in model.constrs() {
            let lhs = Self::linexpr(&constr.lhs, &vars);
            let rhs = constr.rhs;
            let c = match constr.sense {
                Sense::Less => grb::c!(lhs <= rhs),
                Sense::Greater => grb::c!(lhs >= rhs),
                Sense::Equal => grb::c!(lhs == rhs),
            };
            lp.add_constr(&constr.name, c)?;
        }

        lp.set_objective(Self::linexpr(objective, &vars), grb::ModelSense::Minimize)?;
        lp.optimize()?;

        let incumbent = lp.get_attr(grb::attr::SolCount)? > 0;
        let status = Self::status(lp.status()?, incumbent);
        info!(%status, "MIP solution status");
        if !status.has_values() {
            return Ok(RawSolution::without_values(status));
        }

        let objective = lp.get_attr(grb::attr::ObjVal)?;
        debug!(objective, "MIP solution value");
        let values = lp.get_obj_attr_batch(grb::attr::X, vars)?;

        Ok(RawSolution {
            status,
            objective: Some(objective),
            values: Some(values),
        })
    }
}
