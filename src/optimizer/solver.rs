//! Solver adapter: hands a [`LinearModel`] to an LP/MILP backend under a
//! wall-clock budget and reports one of four statuses.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use super::model::LinearModel;
use crate::error::{AllocationError, Result};

/// Rows without variables are checked here instead of being passed to the backend.
const TRIVIAL_ROW_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// One entry per model variable; only present when `Optimal`.
    pub values: Option<Vec<Option<f64>>>,
    pub objective: Option<f64>,
}

impl SolveOutcome {
    pub fn optimal(values: Vec<Option<f64>>, objective: f64) -> Self {
        Self {
            status: SolveStatus::Optimal,
            values: Some(values),
            objective: Some(objective),
        }
    }

    pub fn without_solution(status: SolveStatus) -> Self {
        Self {
            status,
            values: None,
            objective: None,
        }
    }

    /// Turns every non-optimal status into its scenario-level error.
    pub fn into_solution(self, model: &str, budget: Duration) -> Result<(Vec<Option<f64>>, f64)> {
        match self.status {
            SolveStatus::Optimal => {
                let values = self.values.ok_or_else(|| {
                    AllocationError::Solver(format!(
                        "optimal result for `{}` carries no values",
                        model
                    ))
                })?;
                Ok((values, self.objective.unwrap_or_default()))
            }
            SolveStatus::Infeasible => Err(AllocationError::InfeasibleModel(model.to_string())),
            SolveStatus::Unbounded => Err(AllocationError::UnboundedModel(model.to_string())),
            SolveStatus::TimedOut => Err(AllocationError::SolverTimeout {
                budget_secs: budget.as_secs_f64(),
            }),
        }
    }
}

/// Anything able to solve a [`LinearModel`] exactly.
#[cfg_attr(test, mockall::automock)]
pub trait SolverAdapter {
    /// Blocks for at most `budget` and never hangs past it.
    fn solve(&self, model: &LinearModel, budget: Duration) -> Result<SolveOutcome>;
}

/// `good_lp` backed solver (pure-Rust `microlp` backend).
///
/// The backend cannot be interrupted, so each solve runs on its own worker
/// thread. On timeout the worker is detached and its result discarded, but
/// the thread keeps solving until the backend returns. Every timed-out sweep
/// point therefore leaves one CPU-bound thread behind that competes with the
/// points after it; keep budgets generous relative to model size when
/// sweeping.
#[derive(Debug, Clone, Default)]
pub struct GoodLpSolver;

impl GoodLpSolver {
    pub fn new() -> Self {
        Self
    }
}

impl SolverAdapter for GoodLpSolver {
    fn solve(&self, model: &LinearModel, budget: Duration) -> Result<SolveOutcome> {
        if let Some(row) = model
            .constraints()
            .iter()
            .find(|c| c.expr.is_constant() && !c.holds_trivially(TRIVIAL_ROW_TOLERANCE))
        {
            debug!(model = model.name(), row = %row.label, "constant row cannot hold");
            return Ok(SolveOutcome::without_solution(SolveStatus::Infeasible));
        }

        let (tx, rx) = mpsc::channel();
        let owned = model.clone();
        let started = Instant::now();
        thread::Builder::new()
            .name(format!("solver-{}", model.name()))
            .spawn(move || {
                // the receiver is gone once the caller timed out
                let _ = tx.send(solve_blocking(&owned));
            })
            .map_err(|e| AllocationError::Solver(format!("failed to spawn solver thread: {}", e)))?;

        match rx.recv_timeout(budget) {
            Ok(outcome) => {
                debug!(
                    model = model.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "solver finished"
                );
                outcome
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    model = model.name(),
                    budget_secs = budget.as_secs_f64(),
                    "solver exceeded its time budget, worker left running"
                );
                Ok(SolveOutcome::without_solution(SolveStatus::TimedOut))
            }
            Err(RecvTimeoutError::Disconnected) => Err(AllocationError::Solver(
                "solver thread exited without a result".to_string(),
            )),
        }
    }
}

#[cfg(feature = "optimization")]
fn solve_blocking(model: &LinearModel) -> Result<SolveOutcome> {
    use good_lp::{
        constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError,
        Solution, SolverModel, Variable,
    };

    use super::model::{Direction, LinearExpr, Sense, VarKind};

    let mut problem = ProblemVariables::new();
    let handles: Vec<Variable> = model
        .variables()
        .iter()
        .map(|def| {
            let definition = match def.kind {
                VarKind::UnitInterval => variable().min(0.0).max(1.0),
                VarKind::Binary => variable().binary(),
                VarKind::NonNegative => variable().min(0.0),
            };
            problem.add(definition.name(def.name.clone()))
        })
        .collect();

    let to_expression = |expr: &LinearExpr| {
        let mut out = Expression::from(expr.constant_part());
        for (var, coef) in expr.terms() {
            out += *coef * handles[var.index()];
        }
        out
    };

    let objective = to_expression(&model.objective().expr);
    let unsolved = match model.objective().direction {
        Direction::Maximize => problem.maximise(objective),
        Direction::Minimize => problem.minimise(objective),
    };
    let mut backend = unsolved.using(default_solver);
    for row in model.constraints().iter().filter(|c| !c.expr.is_constant()) {
        let lhs = to_expression(&row.expr);
        let rhs = row.rhs;
        backend = backend.with(match row.sense {
            Sense::Le => constraint!(lhs <= rhs),
            Sense::Ge => constraint!(lhs >= rhs),
            Sense::Eq => constraint!(lhs == rhs),
        });
    }

    match backend.solve() {
        Ok(solution) => {
            let values: Vec<f64> = handles.iter().map(|h| solution.value(*h)).collect();
            let objective = model.objective().expr.evaluate(&values);
            Ok(SolveOutcome::optimal(values.into_iter().map(Some).collect(), objective))
        }
        Err(ResolutionError::Infeasible) => {
            Ok(SolveOutcome::without_solution(SolveStatus::Infeasible))
        }
        Err(ResolutionError::Unbounded) => {
            Ok(SolveOutcome::without_solution(SolveStatus::Unbounded))
        }
        Err(other) => Err(AllocationError::Solver(other.to_string())),
    }
}

#[cfg(not(feature = "optimization"))]
fn solve_blocking(_model: &LinearModel) -> Result<SolveOutcome> {
    Err(AllocationError::Solver(
        "LP solving requires the 'optimization' feature to be enabled".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::model::{Direction, LinearExpr, Sense, VarKind};

    #[test]
    fn test_non_optimal_statuses_map_to_errors() {
        let budget = Duration::from_secs(3);
        let err = SolveOutcome::without_solution(SolveStatus::Infeasible)
            .into_solution("m", budget)
            .unwrap_err();
        assert_eq!(err.kind(), "InfeasibleModelError");

        let err = SolveOutcome::without_solution(SolveStatus::Unbounded)
            .into_solution("m", budget)
            .unwrap_err();
        assert_eq!(err.kind(), "UnboundedModelError");

        match SolveOutcome::without_solution(SolveStatus::TimedOut).into_solution("m", budget) {
            Err(AllocationError::SolverTimeout { budget_secs }) => assert_eq!(budget_secs, 3.0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_violated_constant_row_is_infeasible_without_backend() {
        let mut model = LinearModel::new("trivial");
        model.add_variable(VarKind::NonNegative, "x");
        model.add_constraint("impossible", LinearExpr::constant(0.0), Sense::Ge, 1.0);

        let outcome = GoodLpSolver::new().solve(&model, Duration::from_secs(5)).unwrap();
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.values.is_none());
    }

    #[cfg(feature = "optimization")]
    #[test]
    fn test_small_lp_solves_to_optimum() {
        let mut model = LinearModel::new("small");
        let x = model.add_variable(VarKind::UnitInterval, "x");
        let y = model.add_variable(VarKind::NonNegative, "y");
        model.add_constraint("sum", LinearExpr::new().term(x, 1.0).term(y, 1.0), Sense::Le, 3.0);
        model.set_objective(Direction::Maximize, LinearExpr::new().term(x, 2.0).term(y, 1.0));

        let outcome = GoodLpSolver::new().solve(&model, Duration::from_secs(30)).unwrap();
        assert_eq!(outcome.status, SolveStatus::Optimal);
        let (values, objective) = outcome.into_solution("small", Duration::from_secs(30)).unwrap();
        assert!((values[0].unwrap() - 1.0).abs() < 1e-6);
        assert!((values[1].unwrap() - 2.0).abs() < 1e-6);
        assert!((objective - 4.0).abs() < 1e-6);
    }

    #[cfg(feature = "optimization")]
    #[test]
    fn test_backend_reports_infeasible_and_unbounded() {
        let mut model = LinearModel::new("infeasible");
        let x = model.add_variable(VarKind::UnitInterval, "x");
        model.add_constraint("too_high", LinearExpr::new().term(x, 1.0), Sense::Ge, 2.0);
        let outcome = GoodLpSolver::new().solve(&model, Duration::from_secs(30)).unwrap();
        assert_eq!(outcome.status, SolveStatus::Infeasible);

        let mut model = LinearModel::new("unbounded");
        let y = model.add_variable(VarKind::NonNegative, "y");
        model.add_constraint("floor", LinearExpr::new().term(y, 1.0), Sense::Ge, 1.0);
        model.set_objective(Direction::Maximize, LinearExpr::new().term(y, 1.0));
        let outcome = GoodLpSolver::new().solve(&model, Duration::from_secs(30)).unwrap();
        assert_eq!(outcome.status, SolveStatus::Unbounded);
    }
}
