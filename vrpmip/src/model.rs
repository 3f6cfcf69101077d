//! Backend-independent mixed-integer model.
//!
//! The formulation writes variables and linear constraints into a [`Model`];
//! a [`crate::backend::MipSolver`] translates it into whatever its solver
//! library expects.

use std::fmt;

/// Handle of a variable, i.e. its position in [`Model::vars`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(usize);

impl Var {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Binary,
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDef {
    pub name: String,
    pub vtype: VarType,
    pub lb: f64,
    pub ub: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(Var, f64)>,
    constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_term(&mut self, coeff: f64, var: Var) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn add_constant(&mut self, value: f64) -> &mut Self {
        self.constant += value;
        self
    }

    pub fn terms(&self) -> &[(Var, f64)] {
        &self.terms
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coeff)| coeff * values[var.index()])
            .sum::<f64>()
            + self.constant
    }
}

impl FromIterator<(f64, Var)> for LinExpr {
    fn from_iter<I: IntoIterator<Item = (f64, Var)>>(iter: I) -> Self {
        let mut expr = LinExpr::new();
        for (coeff, var) in iter {
            expr.add_term(coeff, var);
        }
        expr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Less,
    Greater,
    Equal,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sense::Less => "<=",
            Sense::Greater => ">=",
            Sense::Equal => "==",
        })
    }
}

/// `lhs sense rhs`; constants of the left-hand side are folded into `rhs`
#[derive(Debug, Clone, PartialEq)]
pub struct Constr {
    pub name: String,
    pub lhs: LinExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constr {
    /// Amount by which `values` violate this constraint, 0 if satisfied
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.lhs.evaluate(values);
        match self.sense {
            Sense::Less => (lhs - self.rhs).max(0.0),
            Sense::Greater => (self.rhs - lhs).max(0.0),
            Sense::Equal => (lhs - self.rhs).abs(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    name: String,
    vars: Vec<VarDef>,
    constrs: Vec<Constr>,
}

impl Model {
    pub fn new(name: &str) -> Self {
        Model {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_var(&mut self, name: &str, vtype: VarType, lb: f64, ub: f64) -> Var {
        debug_assert!(lb <= ub, "empty domain for {name}");
        let var = Var(self.vars.len());
        self.vars.push(VarDef {
            name: name.to_string(),
            vtype,
            lb,
            ub,
        });
        var
    }

    pub fn add_constr(&mut self, name: &str, mut lhs: LinExpr, sense: Sense, rhs: f64) {
        debug_assert!(lhs.terms.iter().all(|(var, _)| var.index() < self.vars.len()));
        let rhs = rhs - lhs.constant;
        lhs.constant = 0.0;
        self.constrs.push(Constr {
            name: name.to_string(),
            lhs,
            sense,
            rhs,
        });
    }

    pub fn vars(&self) -> &[VarDef] {
        &self.vars
    }

    pub fn var(&self, var: Var) -> &VarDef {
        &self.vars[var.index()]
    }

    pub fn constrs(&self) -> &[Constr] {
        &self.constrs
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_constrs(&self) -> usize {
        self.constrs.len()
    }

    pub fn constr(&self, name: &str) -> Option<&Constr> {
        self.constrs.iter().find(|c| c.name == name)
    }

    /// Names of bounds, integrality requirements and constraints that
    /// `values` violate by more than `tolerance`
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<String> {
        assert_eq!(values.len(), self.vars.len(), "one value per variable");

        let mut violated = Vec::new();
        for (def, &value) in self.vars.iter().zip(values) {
            if value < def.lb - tolerance || value > def.ub + tolerance {
                violated.push(format!("bounds of {}", def.name));
            }
            if def.vtype == VarType::Binary && (value - value.round()).abs() > tolerance {
                violated.push(format!("integrality of {}", def.name));
            }
        }
        for constr in self.constrs.iter() {
            if constr.violation(values) > tolerance {
                violated.push(constr.name.clone());
            }
        }
        violated
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Model {} with {} variables and {} constraints",
            self.name,
            self.vars.len(),
            self.constrs.len()
        )?;
        for constr in self.constrs.iter() {
            write!(f, "    {}:", constr.name)?;
            for (var, coeff) in constr.lhs.terms() {
                write!(f, " {:+} {}", coeff, self.vars[var.index()].name)?;
            }
            writeln!(f, " {} {}", constr.sense, constr.rhs)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_model() -> (Model, Var, Var) {
        let mut model = Model::new("test");
        let x = model.add_var("x", VarType::Binary, 0.0, 1.0);
        let y = model.add_var("y", VarType::Continuous, 0.0, 10.0);
        let mut lhs = LinExpr::new();
        lhs.add_term(1.0, y).add_term(-5.0, x).add_constant(1.0);
        model.add_constr("link", lhs, Sense::Less, 1.0);
        (model, x, y)
    }

    #[test]
    fn folds_constant_into_right_hand_side() {
        let (model, _, _) = small_model();
        let constr = model.constr("link").unwrap();
        assert_eq!(constr.rhs, 0.0);
        assert_eq!(constr.lhs.constant(), 0.0);
        assert_eq!(constr.lhs.terms().len(), 2);
    }

    #[test]
    fn evaluates_expressions() {
        let (_, x, y) = small_model();
        let expr: LinExpr = vec![(2.0, x), (3.0, y)].into_iter().collect();
        assert_eq!(expr.evaluate(&[1.0, 4.0]), 14.0);
    }

    #[test]
    fn reports_violations() {
        let (model, _, _) = small_model();
        assert!(model.violations(&[1.0, 5.0], 1e-9).is_empty());
        assert_eq!(model.violations(&[0.0, 5.0], 1e-9), vec!["link".to_string()]);
        assert_eq!(
            model.violations(&[0.5, 0.0], 1e-9),
            vec!["integrality of x".to_string()]
        );
        assert_eq!(
            model.violations(&[1.0, 11.0], 1e-9),
            vec!["bounds of y".to_string(), "link".to_string()]
        );
    }
}
