//! Solution extraction and post-solve reconciliation.

use ndarray::{Array1, Array2, Axis};
use serde::{Serialize, Serializer};
use tracing::error;

use super::allocation::AllocationModel;
use super::ledger::CreditLedger;
use super::model::VarId;
use crate::domain::Community;
use crate::error::{AllocationError, BalanceViolation, Result};

/// Relative tolerance of the recomputed energy balance.
pub const BALANCE_TOLERANCE: f64 = 1e-6;
/// Absolute tolerance of the credit ledger replay.
pub const LEDGER_TOLERANCE: f64 = 1e-6;

/// Engineering matrices of one run, all unit × period except `credit_stock`
/// (unit × (period + 1)). Serialised as nested row arrays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationMatrices {
    #[serde(serialize_with = "rows")]
    pub allocation: Array2<f64>,
    #[serde(serialize_with = "rows")]
    pub grid_draw: Array2<f64>,
    #[serde(serialize_with = "rows")]
    pub credit_generated: Array2<f64>,
    #[serde(serialize_with = "rows")]
    pub credit_used: Array2<f64>,
    #[serde(serialize_with = "rows")]
    pub credit_stock: Array2<f64>,
}

fn rows<S: Serializer>(matrix: &Array2<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(matrix.outer_iter().map(|row| row.to_vec()))
}

impl AllocationMatrices {
    pub fn num_units(&self) -> usize {
        self.allocation.nrows()
    }

    pub fn num_periods(&self) -> usize {
        self.allocation.ncols()
    }

    /// Σ_t direct allocation per unit.
    pub fn unit_allocation_totals(&self) -> Array1<f64> {
        self.allocation.sum_axis(Axis(1))
    }

    /// Stock left in each unit's ledger after the last period.
    pub fn leftover_stock(&self) -> Array1<f64> {
        self.credit_stock.column(self.num_periods()).to_owned()
    }
}

pub struct ResultExtractor;

impl ResultExtractor {
    /// Reads the raw variable values of `built` into matrices.
    ///
    /// A missing value is read as 0 only when no constraint mentions the
    /// variable; otherwise it is a [`AllocationError::MissingValue`].
    pub fn extract(
        community: &Community,
        built: &AllocationModel,
        values: &[Option<f64>],
    ) -> Result<AllocationMatrices> {
        let model = &built.model;
        if values.len() != model.num_variables() {
            return Err(AllocationError::Solver(format!(
                "solver returned {} values for {} variables",
                values.len(),
                model.num_variables()
            )));
        }

        let mask = model.constrained_mask();
        let resolved = values
            .iter()
            .enumerate()
            .map(|(index, value)| match value {
                Some(v) => Ok(*v),
                None if !mask[index] => Ok(0.0),
                None => Err(AllocationError::MissingValue(model.variables()[index].name.clone())),
            })
            .collect::<Result<Vec<f64>>>()?;

        let vars = &built.vars;
        let read = |grid: &Array2<VarId>| grid.mapv(|id| resolved[id.index()]);

        let allocation = &read(&vars.cover) * community.demand();
        Ok(AllocationMatrices {
            allocation,
            grid_draw: read(&vars.grid),
            credit_generated: read(&vars.generated),
            credit_used: read(&vars.used),
            credit_stock: read(&vars.stock),
        })
    }

    /// Recomputes the energy balance and replays the credit ledger.
    ///
    /// Offending cells are reported with their indices; values are never
    /// clamped or rounded.
    pub fn reconcile(community: &Community, matrices: &AllocationMatrices) -> Result<()> {
        let mut violations = Vec::new();
        for ((i, t), demand) in community.demand().indexed_iter() {
            let recomputed = matrices.allocation[[i, t]]
                + matrices.credit_used[[i, t]]
                + matrices.grid_draw[[i, t]];
            let magnitude = (recomputed - demand).abs();
            if magnitude > BALANCE_TOLERANCE * demand.abs().max(1.0) {
                violations.push(BalanceViolation {
                    unit: i,
                    period: t,
                    demand: *demand,
                    recomputed,
                    magnitude,
                });
            }
        }
        if !violations.is_empty() {
            error!(
                count = violations.len(),
                first = %violations[0],
                "energy balance reconciliation failed"
            );
            return Err(AllocationError::BalanceViolation(violations));
        }

        let ledger = CreditLedger::verify(
            &matrices.credit_stock,
            &matrices.credit_generated,
            &matrices.credit_used,
            LEDGER_TOLERANCE,
        );
        if !ledger.is_empty() {
            error!(count = ledger.len(), first = %ledger[0], "credit ledger replay failed");
            return Err(AllocationError::LedgerViolation(ledger));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PolicyVariant;
    use crate::optimizer::model::VarKind;
    use ndarray::array;

    fn community() -> Community {
        Community::builder()
            .demand(vec![vec![4.0, 4.0], vec![2.0, 0.0]])
            .generation(vec![10.0, 0.0])
            .build()
            .unwrap()
    }

    fn balanced() -> AllocationMatrices {
        AllocationMatrices {
            allocation: array![[4.0, 0.0], [2.0, 0.0]],
            grid_draw: array![[0.0, 2.0], [0.0, 0.0]],
            credit_generated: array![[2.0, 0.0], [2.0, 0.0]],
            credit_used: array![[0.0, 2.0], [0.0, 0.0]],
            credit_stock: array![[0.0, 2.0, 0.0], [0.0, 2.0, 2.0]],
        }
    }

    #[test]
    fn test_reconcile_accepts_consistent_matrices() {
        ResultExtractor::reconcile(&community(), &balanced()).unwrap();
        assert_eq!(balanced().leftover_stock().to_vec(), vec![0.0, 2.0]);
    }

    #[test]
    fn test_reconcile_reports_indices_without_clamping() {
        let mut matrices = balanced();
        matrices.grid_draw[[0, 1]] = 2.5;
        match ResultExtractor::reconcile(&community(), &matrices) {
            Err(AllocationError::BalanceViolation(violations)) => {
                assert_eq!(violations.len(), 1);
                assert_eq!((violations[0].unit, violations[0].period), (0, 1));
                assert!((violations[0].magnitude - 0.5).abs() < 1e-12);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(matrices.grid_draw[[0, 1]], 2.5);
    }

    #[test]
    fn test_reconcile_reports_ledger_breaks() {
        let mut matrices = balanced();
        matrices.credit_stock[[1, 2]] = 5.0;
        let err = ResultExtractor::reconcile(&community(), &matrices).unwrap_err();
        assert_eq!(err.kind(), "LedgerViolationError");
    }

    #[test]
    fn test_missing_value_on_constrained_variable_is_fault() {
        let community = community();
        let built = AllocationModel::build(&community, PolicyVariant::CreditBanked);
        let mut values = vec![Some(0.0); built.model.num_variables()];
        values[built.vars.grid[[0, 0]].index()] = None;

        let err = ResultExtractor::extract(&community, &built, &values).unwrap_err();
        assert!(matches!(err, AllocationError::MissingValue(ref name) if name == "grid[0,0]"));
    }

    #[test]
    fn test_missing_value_on_free_variable_reads_zero() {
        let community = community();
        let mut built = AllocationModel::build(&community, PolicyVariant::CreditBanked);
        let free = built.model.add_variable(VarKind::NonNegative, "unused");
        let mut values = vec![Some(1.0); built.model.num_variables()];
        values[free.index()] = None;

        let matrices = ResultExtractor::extract(&community, &built, &values).unwrap();
        assert_eq!(matrices.allocation, array![[4.0, 4.0], [2.0, 0.0]]);
        assert_eq!(matrices.credit_stock.dim(), (2, 3));
    }
}
