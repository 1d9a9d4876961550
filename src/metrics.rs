//! Scalar summary of one allocation run.

use serde::Serialize;
use statrs::statistics::Statistics;

use crate::domain::Community;
use crate::optimizer::AllocationMatrices;

/// Days the monthly availability charge is prorated over.
const DAYS_PER_MONTH: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Σ direct allocation.
    pub allocated_energy: f64,
    /// Allocated energy over nominal generation, in percent.
    pub efficiency_pct: f64,
    /// Allocated energy over total demand, in percent.
    pub self_sufficiency_pct: f64,
    /// Population standard deviation of per-unit total allocation.
    pub equity_std_dev: f64,
    pub grid_energy: f64,
    /// Σ tariff × grid draw.
    pub total_grid_cost: f64,
    /// Grid cost plus one day of availability charges and the operating cost
    /// of the allocated energy.
    pub total_cost: f64,
    /// Σ tariff × (direct + credit used): what the community did not buy.
    pub economic_saving: f64,
    /// Σ credit generated.
    pub total_credits: f64,
    /// Stock left in all ledgers after the last period.
    pub leftover_credits: f64,
    pub avoided_emissions_kg: f64,
    /// Solver objective; `None` for heuristic runs.
    pub objective_value: Option<f64>,
}

impl RunSummary {
    pub fn calculate(
        community: &Community,
        matrices: &AllocationMatrices,
        objective_value: Option<f64>,
    ) -> Self {
        let allocated_energy = matrices.allocation.sum();
        let generation = community.total_generation();
        let demand = community.total_demand();
        let tariff = community.tariff();

        let costs = community.operating_costs();
        let total_grid_cost = (tariff * &matrices.grid_draw).sum();
        let total_cost = total_grid_cost
            + costs.availability_monthly * community.num_units() as f64 / DAYS_PER_MONTH
            + allocated_energy * costs.operational_per_kwh;

        let unit_totals = matrices.unit_allocation_totals();
        let equity_std_dev = if unit_totals.len() < 2 {
            0.0
        } else {
            unit_totals.iter().population_std_dev()
        };

        Self {
            allocated_energy,
            efficiency_pct: percent(allocated_energy, generation),
            self_sufficiency_pct: percent(allocated_energy, demand),
            equity_std_dev,
            grid_energy: matrices.grid_draw.sum(),
            total_grid_cost,
            total_cost,
            economic_saving: (tariff * &(&matrices.allocation + &matrices.credit_used)).sum(),
            total_credits: matrices.credit_generated.sum(),
            leftover_credits: matrices.leftover_stock().sum(),
            avoided_emissions_kg: allocated_energy * community.emission_factor(),
            objective_value,
        }
    }
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}
