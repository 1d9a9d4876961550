//! Weighted scalar objective over normalised terms.

use serde::Serialize;
use strum::{Display, EnumIter, IntoEnumIterator};

use super::model::{Direction, LinearExpr, LinearModel};
use super::variables::DecisionVariables;
use crate::domain::Community;

/// Normalisers at or below this are replaced with 1.0.
const NORMALISER_FLOOR: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObjectiveTerm {
    PriorityAllocation,
    EquityPenalty,
    GridPenalty,
    TariffCost,
    NetCredits,
}

impl ObjectiveTerm {
    /// +1 for maximised terms, -1 for penalties.
    pub fn sign(self) -> f64 {
        match self {
            ObjectiveTerm::PriorityAllocation | ObjectiveTerm::NetCredits => 1.0,
            _ => -1.0,
        }
    }
}

/// One term of the objective before weighting.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalisedTerm {
    pub term: ObjectiveTerm,
    pub weight: f64,
    pub normaliser: f64,
    pub raw: LinearExpr,
}

impl NormalisedTerm {
    /// `weight * sign * raw / normaliser`.
    pub fn contribution(&self) -> LinearExpr {
        self.raw.scaled(self.weight * self.term.sign() / self.normaliser)
    }
}

pub struct ObjectiveComposer<'a> {
    community: &'a Community,
    vars: &'a DecisionVariables,
}

impl<'a> ObjectiveComposer<'a> {
    pub fn new(community: &'a Community, vars: &'a DecisionVariables) -> Self {
        Self { community, vars }
    }

    /// Terms that apply to this model. The equity penalty is only present
    /// when deviation variables were allocated.
    pub fn terms(&self) -> Vec<NormalisedTerm> {
        ObjectiveTerm::iter()
            .filter_map(|term| self.term(term))
            .collect()
    }

    fn term(&self, term: ObjectiveTerm) -> Option<NormalisedTerm> {
        let community = self.community;
        let weights = community.weights();
        let units = self.vars.num_units();
        let periods = self.vars.num_periods();
        let cells = || (0..units).flat_map(move |i| (0..periods).map(move |t| (i, t)));
        let total_demand = community.total_demand();

        let (weight, normaliser, raw) = match term {
            ObjectiveTerm::PriorityAllocation => {
                let raw: LinearExpr = cells()
                    .map(|(i, t)| {
                        let coef = community.unit(i).priority_weight * community.demand_at(i, t);
                        (self.vars.cover[[i, t]], coef)
                    })
                    .collect();
                (weights.allocation, total_demand, raw)
            }
            ObjectiveTerm::EquityPenalty => {
                let deviation = self.vars.deviation.as_ref()?;
                let raw: LinearExpr = deviation.iter().map(|v| (*v, 1.0)).collect();
                (weights.equity, total_demand / units as f64, raw)
            }
            ObjectiveTerm::GridPenalty => {
                let raw: LinearExpr = cells().map(|(i, t)| (self.vars.grid[[i, t]], 1.0)).collect();
                (weights.grid, total_demand, raw)
            }
            ObjectiveTerm::TariffCost => {
                let raw: LinearExpr = cells()
                    .map(|(i, t)| (self.vars.grid[[i, t]], community.tariff_at(i, t)))
                    .collect();
                (weights.tariff, community.tariff_weighted_demand(), raw)
            }
            ObjectiveTerm::NetCredits => {
                let mut raw = LinearExpr::new();
                for (i, t) in cells() {
                    raw.add_term(self.vars.generated[[i, t]], 1.0);
                    raw.add_term(self.vars.used[[i, t]], -1.0);
                }
                (weights.credits, total_demand, raw)
            }
        };

        Some(NormalisedTerm {
            term,
            weight,
            normaliser: if normaliser > NORMALISER_FLOOR { normaliser } else { 1.0 },
            raw,
        })
    }

    /// Sum of every term's contribution.
    pub fn expression(&self) -> LinearExpr {
        let mut expr = LinearExpr::new();
        for term in self.terms() {
            expr.add_scaled(&term.contribution(), 1.0);
        }
        expr
    }

    /// Installs the maximised objective on `model`.
    pub fn compose(&self, model: &mut LinearModel) {
        model.set_objective(Direction::Maximize, self.expression());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ObjectiveWeights, PolicyVariant};
    use crate::optimizer::model::VarId;

    fn community() -> Community {
        Community::builder()
            .demand(vec![vec![2.0, 2.0], vec![4.0, 0.0]])
            .generation(vec![5.0, 5.0])
            .tariff(vec![vec![1.0, 1.0], vec![0.5, 0.5]])
            .priority_weight(vec![5.0, 1.0])
            .build()
            .unwrap()
    }

    #[test]
    fn test_equity_term_requires_deviation_variables() {
        let community = community();
        let mut model = LinearModel::new("objective");
        let vars = DecisionVariables::allocate(&mut model, &community, PolicyVariant::CreditBanked);
        let terms: Vec<_> = ObjectiveComposer::new(&community, &vars)
            .terms()
            .into_iter()
            .map(|t| t.term)
            .collect();
        assert!(!terms.contains(&ObjectiveTerm::EquityPenalty));
        assert_eq!(terms.len(), 4);

        let vars =
            DecisionVariables::allocate(&mut model, &community, PolicyVariant::EquityConstrained);
        assert_eq!(ObjectiveComposer::new(&community, &vars).terms().len(), 5);
    }

    #[test]
    fn test_normalisers() {
        let community = community();
        let mut model = LinearModel::new("objective");
        let vars =
            DecisionVariables::allocate(&mut model, &community, PolicyVariant::EquityConstrained);
        for term in ObjectiveComposer::new(&community, &vars).terms() {
            let expected = match term.term {
                ObjectiveTerm::EquityPenalty => 4.0,
                ObjectiveTerm::TariffCost => 6.0,
                _ => 8.0,
            };
            assert_eq!(term.normaliser, expected, "{}", term.term);
        }
    }

    #[test]
    fn test_signs_follow_direction_of_each_term() {
        let community = community();
        let mut model = LinearModel::new("objective");
        let vars = DecisionVariables::allocate(&mut model, &community, PolicyVariant::CreditBanked);
        ObjectiveComposer::new(&community, &vars).compose(&mut model);

        let objective = model.objective();
        assert_eq!(objective.direction, Direction::Maximize);
        let coef_of = |var: VarId| {
            objective
                .expr
                .terms()
                .iter()
                .filter(|(v, _)| *v == var)
                .map(|(_, c)| c)
                .sum::<f64>()
        };
        let weights = ObjectiveWeights::default();
        let expected_cover = weights.allocation * 5.0 * 2.0 / 8.0;
        assert!((coef_of(vars.cover[[0, 0]]) - expected_cover).abs() < 1e-12);
        assert!(coef_of(vars.grid[[0, 0]]) < 0.0);
        assert!(coef_of(vars.generated[[0, 0]]) > 0.0);
        assert!(coef_of(vars.used[[0, 0]]) < 0.0);
    }

    #[test]
    fn test_zero_demand_normaliser_falls_back_to_one() {
        let community = Community::builder()
            .demand(vec![vec![0.0, 0.0]])
            .generation(vec![1.0, 1.0])
            .build()
            .unwrap();
        let mut model = LinearModel::new("objective");
        let vars = DecisionVariables::allocate(&mut model, &community, PolicyVariant::CreditBanked);
        assert!(ObjectiveComposer::new(&community, &vars)
            .terms()
            .iter()
            .all(|t| t.normaliser == 1.0));
    }
}
