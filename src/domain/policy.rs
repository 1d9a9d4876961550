use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use validator::Validate;

/// Allocation policy a scenario runs under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PolicyVariant {
    /// Generation shared in proportion to demand each period.
    Proportional,
    /// Generation shared in proportion to priority-weighted demand.
    PriorityWeighted,
    /// Units served whole in unit order; a unit that does not fit is skipped.
    Sequential,
    /// Optimisation with bounded deviation from the mean allocation.
    EquityConstrained,
    /// Optimisation with the cross-period credit bank and no equity bound.
    CreditBanked,
}

impl PolicyVariant {
    /// Heuristic variants are computed directly without a solver.
    pub fn is_heuristic(self) -> bool {
        matches!(
            self,
            PolicyVariant::Proportional
                | PolicyVariant::PriorityWeighted
                | PolicyVariant::Sequential
        )
    }

    pub fn uses_solver(self) -> bool {
        !self.is_heuristic()
    }

    pub fn uses_equity(self) -> bool {
        self == PolicyVariant::EquityConstrained
    }
}

/// Domain of the per-(unit, period) coverage decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AllocationDomain {
    /// Any fraction of demand in [0, 1] may be covered.
    #[default]
    Fractional,
    /// Demand is covered entirely or not at all.
    Binary,
}

/// How a period's injected surplus is credited to units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CreditSplit {
    /// Every unit receives the same credit.
    #[default]
    Equal,
    /// Credit follows each unit's share of total horizon demand.
    Proportional,
}

/// Weights of the normalised objective terms. They need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct ObjectiveWeights {
    /// Priority-weighted allocated energy (maximised).
    #[validate(range(min = 0.0))]
    pub allocation: f64,
    /// Deviation from the mean allocation (minimised).
    #[validate(range(min = 0.0))]
    pub equity: f64,
    /// Grid draw (minimised).
    #[validate(range(min = 0.0))]
    pub grid: f64,
    /// Tariff-weighted grid cost (minimised).
    #[validate(range(min = 0.0))]
    pub tariff: f64,
    /// Net banked credits (maximised).
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub credits: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            allocation: 0.7,
            equity: 0.05,
            grid: 0.1,
            tariff: 0.15,
            credits: 0.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_variant_round_trips_through_names() {
        for variant in PolicyVariant::iter() {
            let name = variant.to_string();
            assert_eq!(PolicyVariant::from_str(&name).unwrap(), variant);
        }
        assert_eq!(
            PolicyVariant::from_str("credit_banked").unwrap(),
            PolicyVariant::CreditBanked
        );
    }

    #[test]
    fn test_only_optimisation_variants_use_solver() {
        let solved: Vec<_> = PolicyVariant::iter().filter(|v| v.uses_solver()).collect();
        assert_eq!(
            solved,
            vec![PolicyVariant::EquityConstrained, PolicyVariant::CreditBanked]
        );
        assert!(PolicyVariant::EquityConstrained.uses_equity());
        assert!(!PolicyVariant::CreditBanked.uses_equity());
    }

    #[test]
    fn test_negative_weight_fails_validation() {
        let weights = ObjectiveWeights {
            grid: -0.1,
            ..ObjectiveWeights::default()
        };
        assert!(weights.validate().is_err());
        assert!(ObjectiveWeights::default().validate().is_ok());
    }
}
