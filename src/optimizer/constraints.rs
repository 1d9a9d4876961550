//! Translates a [`Community`] and a policy variant into model constraints.
//!
//! Every `build_*` method appends rows to the borrowed [`LinearModel`] and
//! returns how many it emitted, so callers and tests can account for the
//! model size per family.

use tracing::debug;

use super::ledger::CreditLedger;
use super::model::{LinearExpr, LinearModel, Sense};
use super::variables::DecisionVariables;
use crate::domain::{Community, CreditSplit, PolicyVariant, UnitId};

pub struct ConstraintBuilder<'a> {
    community: &'a Community,
    vars: &'a DecisionVariables,
    variant: PolicyVariant,
}

impl<'a> ConstraintBuilder<'a> {
    pub fn new(
        community: &'a Community,
        vars: &'a DecisionVariables,
        variant: PolicyVariant,
    ) -> Self {
        Self {
            community,
            vars,
            variant,
        }
    }

    /// Emits the full constraint set for the variant.
    pub fn build_all(&self, model: &mut LinearModel) -> usize {
        let minimum_service = self.community.minimum_service_units();
        let counts = [
            ("energy_balance", self.build_energy_balance(model)),
            ("capacity", self.build_capacity(model)),
            ("injection", self.build_injection(model)),
            ("credit_ledger", self.build_credit_ledger(model)),
            ("credit_split", self.build_credit_split(model)),
            ("minimum_service", self.build_minimum_service(model, &minimum_service)),
            ("equity", self.build_equity(model, self.community.epsilon())),
            ("flow_limit", self.build_flow_limit(model)),
            ("peak_grid_limit", self.build_peak_grid_limit(model)),
        ];
        for (family, rows) in counts {
            debug!(variant = %self.variant, family, rows, "constraints emitted");
        }
        counts.iter().map(|(_, rows)| rows).sum()
    }

    /// `direct + used + grid == demand` for every unit and period.
    pub fn build_energy_balance(&self, model: &mut LinearModel) -> usize {
        let mut rows = 0;
        for i in 0..self.vars.num_units() {
            for t in 0..self.vars.num_periods() {
                let expr = self
                    .vars
                    .direct(self.community, i, t)
                    .term(self.vars.used[[i, t]], 1.0)
                    .term(self.vars.grid[[i, t]], 1.0);
                model.add_constraint(
                    format!("balance[{},{}]", i, t),
                    expr,
                    Sense::Eq,
                    self.community.demand_at(i, t),
                );
                rows += 1;
            }
        }
        rows
    }

    /// `Σ_i (direct + generated) <= effective generation` per period.
    ///
    /// A period without generation forces every term to zero through this
    /// bound alone.
    pub fn build_capacity(&self, model: &mut LinearModel) -> usize {
        for (t, period) in self.community.periods().iter().enumerate() {
            let mut expr = LinearExpr::new();
            for i in 0..self.vars.num_units() {
                expr.add_scaled(&self.vars.direct(self.community, i, t), 1.0);
                expr.add_term(self.vars.generated[[i, t]], 1.0);
            }
            model.add_constraint(
                format!("capacity[{}]", t),
                expr,
                Sense::Le,
                period.effective_generation,
            );
        }
        self.community.num_periods()
    }

    /// `Σ_i generated <= injection_limit` per period.
    pub fn build_injection(&self, model: &mut LinearModel) -> usize {
        for (t, period) in self.community.periods().iter().enumerate() {
            let expr = (0..self.vars.num_units())
                .map(|i| (self.vars.generated[[i, t]], 1.0))
                .collect();
            model.add_constraint(
                format!("injection[{}]", t),
                expr,
                Sense::Le,
                period.injection_limit,
            );
        }
        self.community.num_periods()
    }

    pub fn build_credit_ledger(&self, model: &mut LinearModel) -> usize {
        CreditLedger::encode(model, self.vars)
    }

    /// Ties each unit's banked credit to the community's split policy.
    ///
    /// Equal split pins every unit to unit 0; proportional split pins each
    /// unit to its demand share of the period total.
    pub fn build_credit_split(&self, model: &mut LinearModel) -> usize {
        let units = self.vars.num_units();
        if units < 2 {
            return 0;
        }
        let mut rows = 0;
        match self.community.credit_split() {
            CreditSplit::Equal => {
                for t in 0..self.vars.num_periods() {
                    for i in 1..units {
                        let expr = LinearExpr::new()
                            .term(self.vars.generated[[i, t]], 1.0)
                            .term(self.vars.generated[[0, t]], -1.0);
                        let label = format!("credit_split[{},{}]", i, t);
                        model.add_constraint(label, expr, Sense::Eq, 0.0);
                        rows += 1;
                    }
                }
            }
            CreditSplit::Proportional => {
                let shares = self.community.credit_shares();
                for t in 0..self.vars.num_periods() {
                    for (i, share) in shares.iter().enumerate() {
                        let mut expr = LinearExpr::new().term(self.vars.generated[[i, t]], 1.0);
                        for j in 0..units {
                            expr.add_term(self.vars.generated[[j, t]], -share);
                        }
                        let label = format!("credit_split[{},{}]", i, t);
                        model.add_constraint(label, expr, Sense::Eq, 0.0);
                        rows += 1;
                    }
                }
            }
        }
        rows
    }

    /// `Σ_t direct[i,t] >= minimum_service[i]` for each listed unit.
    pub fn build_minimum_service(&self, model: &mut LinearModel, units: &[UnitId]) -> usize {
        for unit in units {
            let i = unit.index();
            model.add_constraint(
                format!("minimum_service[{}]", i),
                self.vars.total_allocation(self.community, i),
                Sense::Ge,
                self.community.unit(i).minimum_service,
            );
        }
        units.len()
    }

    /// Deviation rows around the community mean allocation:
    ///
    /// ```text
    /// total[i] - mean - v[i] <= 0
    /// mean - total[i] - v[i] <= 0
    /// v[i] - epsilon * mean  >= 0
    /// ```
    ///
    /// Emits nothing unless the variant is equity-constrained.
    pub fn build_equity(&self, model: &mut LinearModel, epsilon: f64) -> usize {
        let deviation = match (&self.vars.deviation, self.variant.uses_equity()) {
            (Some(deviation), true) => deviation,
            _ => return 0,
        };
        let units = self.vars.num_units();
        let totals: Vec<LinearExpr> = (0..units)
            .map(|i| self.vars.total_allocation(self.community, i))
            .collect();
        let mut mean = LinearExpr::new();
        for total in &totals {
            mean.add_scaled(total, 1.0 / units as f64);
        }

        for (i, total) in totals.iter().enumerate() {
            let mut above = total.clone();
            above.add_scaled(&mean, -1.0);
            above.add_term(deviation[i], -1.0);
            model.add_constraint(format!("equity_above[{}]", i), above, Sense::Le, 0.0);

            let mut below = mean.clone();
            below.add_scaled(total, -1.0);
            below.add_term(deviation[i], -1.0);
            model.add_constraint(format!("equity_below[{}]", i), below, Sense::Le, 0.0);

            let mut floor = LinearExpr::new().term(deviation[i], 1.0);
            floor.add_scaled(&mean, -epsilon);
            model.add_constraint(format!("equity_floor[{}]", i), floor, Sense::Ge, 0.0);
        }
        3 * units
    }

    /// `Σ_i direct <= flow_limit` for periods that carry a flow cap.
    pub fn build_flow_limit(&self, model: &mut LinearModel) -> usize {
        let mut rows = 0;
        for (t, period) in self.community.periods().iter().enumerate() {
            if let Some(limit) = period.flow_limit {
                let mut expr = LinearExpr::new();
                for i in 0..self.vars.num_units() {
                    expr.add_scaled(&self.vars.direct(self.community, i, t), 1.0);
                }
                model.add_constraint(format!("flow_limit[{}]", t), expr, Sense::Le, limit);
                rows += 1;
            }
        }
        rows
    }

    /// Community grid draw in each peak period stays under a fraction of that
    /// period's demand.
    pub fn build_peak_grid_limit(&self, model: &mut LinearModel) -> usize {
        let Some(fraction) = self.community.peak_grid_fraction() else {
            return 0;
        };
        let mut rows = 0;
        for (t, period) in self.community.periods().iter().enumerate() {
            if !period.peak {
                continue;
            }
            let expr = (0..self.vars.num_units())
                .map(|i| (self.vars.grid[[i, t]], 1.0))
                .collect();
            model.add_constraint(
                format!("peak_grid[{}]", t),
                expr,
                Sense::Le,
                fraction * self.community.period_total_demand(t),
            );
            rows += 1;
        }
        rows
    }
}
