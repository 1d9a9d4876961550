use ndarray::{Array1, Array2};

use super::model::{LinearExpr, LinearModel, VarId, VarKind};
use crate::domain::{AllocationDomain, Community, PolicyVariant};

/// Every decision variable of an allocation model, allocated up front as
/// dense grids indexed by `(unit, period)`.
#[derive(Debug, Clone)]
pub struct DecisionVariables {
    /// Covered fraction of demand (or all-or-nothing flag); `direct = cover * demand`.
    pub cover: Array2<VarId>,
    pub generated: Array2<VarId>,
    pub used: Array2<VarId>,
    pub grid: Array2<VarId>,
    /// Credit stock, units × (periods + 1).
    pub stock: Array2<VarId>,
    /// Equity deviation per unit; only present for equity-constrained models.
    pub deviation: Option<Array1<VarId>>,
}

impl DecisionVariables {
    pub fn allocate(
        model: &mut LinearModel,
        community: &Community,
        variant: PolicyVariant,
    ) -> Self {
        let shape = (community.num_units(), community.num_periods());
        let cover_kind = match community.allocation_domain() {
            AllocationDomain::Fractional => VarKind::UnitInterval,
            AllocationDomain::Binary => VarKind::Binary,
        };

        let cover = Array2::from_shape_fn(shape, |(i, t)| {
            model.add_variable(cover_kind, format!("cover[{},{}]", i, t))
        });
        let generated = Array2::from_shape_fn(shape, |(i, t)| {
            model.add_variable(VarKind::NonNegative, format!("generated[{},{}]", i, t))
        });
        let used = Array2::from_shape_fn(shape, |(i, t)| {
            model.add_variable(VarKind::NonNegative, format!("used[{},{}]", i, t))
        });
        let grid = Array2::from_shape_fn(shape, |(i, t)| {
            model.add_variable(VarKind::NonNegative, format!("grid[{},{}]", i, t))
        });
        let stock = Array2::from_shape_fn((shape.0, shape.1 + 1), |(i, k)| {
            model.add_variable(VarKind::NonNegative, format!("stock[{},{}]", i, k))
        });
        let deviation = variant.uses_equity().then(|| {
            Array1::from_shape_fn(shape.0, |i| {
                model.add_variable(VarKind::NonNegative, format!("deviation[{}]", i))
            })
        });

        Self {
            cover,
            generated,
            used,
            grid,
            stock,
            deviation,
        }
    }

    pub fn num_units(&self) -> usize {
        self.cover.nrows()
    }

    pub fn num_periods(&self) -> usize {
        self.cover.ncols()
    }

    /// `direct[i,t] = demand[i,t] * cover[i,t]`.
    pub fn direct(&self, community: &Community, unit: usize, period: usize) -> LinearExpr {
        LinearExpr::new().term(self.cover[[unit, period]], community.demand_at(unit, period))
    }

    /// Σ_t direct[i,t].
    pub fn total_allocation(&self, community: &Community, unit: usize) -> LinearExpr {
        (0..self.num_periods())
            .map(|t| (self.cover[[unit, t]], community.demand_at(unit, t)))
            .collect()
    }
}
