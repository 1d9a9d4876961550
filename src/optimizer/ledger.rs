//! Credit ledger: per-unit banked credit across periods.
//!
//! The stock recurrence is
//!
//! ```text
//! stock[i,0]   = 0
//! stock[i,t+1] = stock[i,t] + generated[i,t] - used[i,t]
//! stock[i,t]  >= 0
//! used[i,t]   <= stock[i,t]
//! ```
//!
//! It exists in three forms here: as model constraints ([`CreditLedger::encode`])
//! so the solver respects banking while allocating, as a runtime state machine
//! for heuristic allocators, and as a replay check over extracted matrices
//! ([`CreditLedger::verify`]). Stock left at the horizon end is reported, never
//! rolled over.

use ndarray::{Array1, Array2, ArrayView1};

use super::model::{LinearExpr, LinearModel, Sense};
use super::variables::DecisionVariables;
use crate::error::{LedgerRule, LedgerViolation};

#[derive(Debug, Clone)]
pub struct CreditLedger {
    stock: Array2<f64>,
    cursor: usize,
}

impl CreditLedger {
    /// Empty ledger in its initial (all-zero) state.
    pub fn new(num_units: usize, num_periods: usize) -> Self {
        Self {
            stock: Array2::zeros((num_units, num_periods + 1)),
            cursor: 0,
        }
    }

    /// Credit available to `unit` at the start of the current period.
    pub fn available(&self, unit: usize) -> f64 {
        self.stock[[unit, self.cursor]]
    }

    /// Settles the current period and moves to the next one.
    ///
    /// Callers must not draw more than [`available`](Self::available).
    pub fn advance(&mut self, generated: ArrayView1<'_, f64>, used: ArrayView1<'_, f64>) {
        let t = self.cursor;
        let next: Array1<f64> = &self.stock.column(t) + &generated - &used;
        self.stock.column_mut(t + 1).assign(&next);
        self.cursor += 1;
    }

    pub fn into_stock(self) -> Array2<f64> {
        self.stock
    }

    /// Emits the recurrence, the initial state and the overdraw bound.
    /// Non-negativity of stock comes from the variables' own domain.
    pub fn encode(model: &mut LinearModel, vars: &DecisionVariables) -> usize {
        let before = model.num_constraints();
        for i in 0..vars.num_units() {
            model.add_constraint(
                format!("ledger_initial[{}]", i),
                LinearExpr::new().term(vars.stock[[i, 0]], 1.0),
                Sense::Eq,
                0.0,
            );
            for t in 0..vars.num_periods() {
                let recurrence = LinearExpr::new()
                    .term(vars.stock[[i, t + 1]], 1.0)
                    .term(vars.stock[[i, t]], -1.0)
                    .term(vars.generated[[i, t]], -1.0)
                    .term(vars.used[[i, t]], 1.0);
                model.add_constraint(
                    format!("ledger_recurrence[{},{}]", i, t),
                    recurrence,
                    Sense::Eq,
                    0.0,
                );

                let overdraw = LinearExpr::new()
                    .term(vars.used[[i, t]], 1.0)
                    .term(vars.stock[[i, t]], -1.0);
                model.add_constraint(
                    format!("ledger_overdraw[{},{}]", i, t),
                    overdraw,
                    Sense::Le,
                    0.0,
                );
            }
        }
        model.num_constraints() - before
    }

    /// Replays the recurrence over extracted matrices and reports every breach
    /// larger than `tolerance`.
    pub fn verify(
        stock: &Array2<f64>,
        generated: &Array2<f64>,
        used: &Array2<f64>,
        tolerance: f64,
    ) -> Vec<LedgerViolation> {
        let mut violations = Vec::new();
        let (units, periods) = generated.dim();

        for i in 0..units {
            let initial = stock[[i, 0]].abs();
            if initial > tolerance {
                violations.push(LedgerViolation {
                    unit: i,
                    index: 0,
                    rule: LedgerRule::InitialStock,
                    magnitude: initial,
                });
            }
            for k in 0..=periods {
                if stock[[i, k]] < -tolerance {
                    violations.push(LedgerViolation {
                        unit: i,
                        index: k,
                        rule: LedgerRule::NegativeStock,
                        magnitude: -stock[[i, k]],
                    });
                }
            }
            for t in 0..periods {
                let expected = stock[[i, t]] + generated[[i, t]] - used[[i, t]];
                let drift = (stock[[i, t + 1]] - expected).abs();
                if drift > tolerance * expected.abs().max(1.0) {
                    violations.push(LedgerViolation {
                        unit: i,
                        index: t + 1,
                        rule: LedgerRule::Recurrence,
                        magnitude: drift,
                    });
                }
                let overdraw = used[[i, t]] - stock[[i, t]];
                if overdraw > tolerance {
                    violations.push(LedgerViolation {
                        unit: i,
                        index: t,
                        rule: LedgerRule::OverdrawnCredit,
                        magnitude: overdraw,
                    });
                }
            }
        }
        violations
    }
}
