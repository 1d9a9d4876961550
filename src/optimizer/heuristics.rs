//! Solver-free allocators for the heuristic policy variants.
//!
//! Each period the available energy (generation after losses, capped by the
//! flow limit when one is set) is shared out as direct allocation. Surplus up
//! to the injection limit is banked per the credit split, and residual demand
//! draws banked credit before falling back to the grid. Minimum service and
//! the peak grid cap are not enforced here.

use ndarray::{Array1, Array2};
use tracing::debug;

use super::extract::AllocationMatrices;
use super::ledger::CreditLedger;
use crate::domain::{Community, PolicyVariant};
use crate::error::{AllocationError, Result};

/// Below this a quantity of energy counts as zero.
const ENERGY_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicAllocator {
    variant: PolicyVariant,
}

impl HeuristicAllocator {
    pub fn new(variant: PolicyVariant) -> Result<Self> {
        if !variant.is_heuristic() {
            return Err(AllocationError::Solver(format!(
                "{} is not a heuristic variant",
                variant
            )));
        }
        Ok(Self { variant })
    }

    pub fn variant(&self) -> PolicyVariant {
        self.variant
    }

    pub fn allocate(&self, community: &Community) -> AllocationMatrices {
        let (units, periods) = (community.num_units(), community.num_periods());
        let shares = community.credit_shares();
        let mut allocation = Array2::zeros((units, periods));
        let mut grid_draw = Array2::zeros((units, periods));
        let mut credit_generated = Array2::zeros((units, periods));
        let mut credit_used = Array2::zeros((units, periods));
        let mut ledger = CreditLedger::new(units, periods);

        for (t, period) in community.periods().iter().enumerate() {
            let demand: Vec<f64> = (0..units).map(|i| community.demand_at(i, t)).collect();
            let period_demand: f64 = demand.iter().sum();
            let available = period.effective_generation.max(0.0);
            let servable = period.flow_limit.map_or(available, |cap| available.min(cap));

            let direct = if period_demand <= ENERGY_EPS {
                debug!(period = t, "no demand in period, nothing allocated");
                vec![0.0; units]
            } else {
                match self.variant {
                    PolicyVariant::PriorityWeighted => {
                        priority_weighted(community, &demand, servable.min(period_demand))
                    }
                    PolicyVariant::Sequential => sequential(&demand, servable),
                    _ => proportional(&demand, servable.min(period_demand)),
                }
            };

            let surplus = (available - direct.iter().sum::<f64>()).max(0.0);
            let banked = surplus.min(period.injection_limit);
            let generated = Array1::from_iter(shares.iter().map(|share| banked * share));

            let mut used = Array1::zeros(units);
            for i in 0..units {
                let residual = (demand[i] - direct[i]).max(0.0);
                used[i] = residual.min(ledger.available(i));
                allocation[[i, t]] = direct[i];
                grid_draw[[i, t]] = residual - used[i];
                credit_generated[[i, t]] = generated[i];
                credit_used[[i, t]] = used[i];
            }
            ledger.advance(generated.view(), used.view());
        }

        AllocationMatrices {
            allocation,
            grid_draw,
            credit_generated,
            credit_used,
            credit_stock: ledger.into_stock(),
        }
    }
}

/// `served` split in proportion to demand.
fn proportional(demand: &[f64], served: f64) -> Vec<f64> {
    let total: f64 = demand.iter().sum();
    demand.iter().map(|d| d * served / total).collect()
}

/// `served` split in proportion to priority-weighted demand, with any unit
/// whose share exceeds its demand capped and the excess redistributed.
fn priority_weighted(community: &Community, demand: &[f64], served: f64) -> Vec<f64> {
    let mut direct = vec![0.0; demand.len()];
    let mut active: Vec<usize> = (0..demand.len()).filter(|&i| demand[i] > ENERGY_EPS).collect();
    let mut remaining = served;

    while remaining > ENERGY_EPS && !active.is_empty() {
        // only zero-priority units left: fall back to plain demand
        let unweighted = active
            .iter()
            .all(|&i| community.unit(i).priority_weight <= ENERGY_EPS);
        let weight = |i: usize| {
            if unweighted {
                demand[i]
            } else {
                community.unit(i).priority_weight * demand[i]
            }
        };
        let total: f64 = active.iter().map(|&i| weight(i)).sum();

        let (saturated, open): (Vec<usize>, Vec<usize>) = active
            .iter()
            .partition(|&&i| direct[i] + remaining * weight(i) / total >= demand[i]);
        if saturated.is_empty() {
            for &i in &open {
                direct[i] += remaining * weight(i) / total;
            }
            break;
        }
        for &i in &saturated {
            remaining -= demand[i] - direct[i];
            direct[i] = demand[i];
        }
        active = open;
    }
    direct
}

/// Whole demands served first come, first served in unit order; a unit that
/// no longer fits is skipped and smaller units behind it may still be served.
fn sequential(demand: &[f64], servable: f64) -> Vec<f64> {
    let mut direct = vec![0.0; demand.len()];
    let mut remaining = servable;
    for (i, &d) in demand.iter().enumerate() {
        if d <= remaining + ENERGY_EPS {
            direct[i] = d;
            remaining -= d;
        }
    }
    direct
}
