//! Solver-neutral linear model.
//!
//! Variables live in an arena and are addressed by dense [`VarId`] handles.
//! Constraints and the objective are sparse linear expressions over those
//! handles. Any LP/MILP backend that honours [`VarKind`] bounds can solve it.

use serde::Serialize;
use std::fmt;

/// Dense handle into a [`LinearModel`]'s variable arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Variable domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VarKind {
    /// Continuous in [0, 1].
    UnitInterval,
    /// Integer in {0, 1}.
    Binary,
    /// Continuous in [0, ∞).
    NonNegative,
}

impl VarKind {
    pub fn lower_bound(self) -> f64 {
        0.0
    }

    pub fn upper_bound(self) -> Option<f64> {
        match self {
            VarKind::UnitInterval | VarKind::Binary => Some(1.0),
            VarKind::NonNegative => None,
        }
    }

    pub fn is_integer(self) -> bool {
        self == VarKind::Binary
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDef {
    pub kind: VarKind,
    pub name: String,
}

/// Sparse affine expression `Σ coef * var + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    /// Builder-style single term.
    pub fn term(mut self, var: VarId, coef: f64) -> Self {
        self.add_term(var, coef);
        self
    }

    /// Adds `coef * var`; zero coefficients are dropped.
    pub fn add_term(&mut self, var: VarId, coef: f64) {
        if coef != 0.0 {
            self.terms.push((var, coef));
        }
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    /// Adds `factor * other`.
    pub fn add_scaled(&mut self, other: &LinearExpr, factor: f64) {
        for (var, coef) in &other.terms {
            self.add_term(*var, coef * factor);
        }
        self.constant += other.constant * factor;
    }

    pub fn scaled(&self, factor: f64) -> LinearExpr {
        let mut out = LinearExpr::new();
        out.add_scaled(self, factor);
        out
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn constant_part(&self) -> f64 {
        self.constant
    }

    /// True when no variable carries a coefficient.
    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coef)| coef * values[var.index()])
            .sum::<f64>()
            + self.constant
    }
}

impl FromIterator<(VarId, f64)> for LinearExpr {
    fn from_iter<I: IntoIterator<Item = (VarId, f64)>>(iter: I) -> Self {
        let mut expr = LinearExpr::new();
        for (var, coef) in iter {
            expr.add_term(var, coef);
        }
        expr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Sense::Le => "<=",
            Sense::Ge => ">=",
            Sense::Eq => "==",
        };
        f.write_str(symbol)
    }
}

/// `expr (sense) rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub label: String,
    pub expr: LinearExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    /// Amount by which `values` violate this constraint (0 when satisfied).
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.expr.evaluate(values);
        match self.sense {
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
            Sense::Eq => (lhs - self.rhs).abs(),
        }
    }

    /// For a constraint without variables, whether its constant part holds.
    pub fn holds_trivially(&self, tolerance: f64) -> bool {
        self.violation(&[]) <= tolerance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Maximize,
    Minimize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub direction: Direction,
    pub expr: LinearExpr,
}

impl Default for Objective {
    fn default() -> Self {
        Self {
            direction: Direction::Maximize,
            expr: LinearExpr::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinearModel {
    name: String,
    variables: Vec<VariableDef>,
    constraints: Vec<LinearConstraint>,
    objective: Objective,
}

impl LinearModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_variable(&mut self, kind: VarKind, name: impl Into<String>) -> VarId {
        self.variables.push(VariableDef {
            kind,
            name: name.into(),
        });
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        label: impl Into<String>,
        expr: LinearExpr,
        sense: Sense,
        rhs: f64,
    ) {
        self.constraints.push(LinearConstraint {
            label: label.into(),
            expr,
            sense,
            rhs,
        });
    }

    pub fn set_objective(&mut self, direction: Direction, expr: LinearExpr) {
        self.objective = Objective { direction, expr };
    }

    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> &VariableDef {
        &self.variables[id.index()]
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Marks every variable that appears with a non-zero coefficient in some constraint.
    pub fn constrained_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.variables.len()];
        for constraint in &self.constraints {
            for (var, _) in constraint.expr.terms() {
                mask[var.index()] = true;
            }
        }
        mask
    }

    /// Largest constraint or bound violation of a full assignment.
    pub fn max_violation(&self, values: &[f64]) -> f64 {
        let rows = self
            .constraints
            .iter()
            .map(|c| c.violation(values))
            .fold(0.0_f64, f64::max);
        let bounds = self
            .variables
            .iter()
            .zip(values)
            .map(|(def, value)| {
                let below = (def.kind.lower_bound() - value).max(0.0);
                let above = def.kind.upper_bound().map_or(0.0, |ub| (value - ub).max(0.0));
                below.max(above)
            })
            .fold(0.0_f64, f64::max);
        rows.max(bounds)
    }
}
