use serde::{Deserialize, Serialize};

/// One installed generation unit, used when losses are modelled per
/// installation rather than per period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorUnit {
    /// Number of installed modules.
    pub installed: f64,
    /// Technical loss fraction in [0, 1).
    pub loss: f64,
    /// Rated energy per module per unit of irradiance.
    pub power: f64,
    /// Irradiance factor per period.
    pub irradiance: Vec<f64>,
}

impl GeneratorUnit {
    pub fn nominal_output(&self, period: usize) -> f64 {
        self.installed * self.irradiance.get(period).copied().unwrap_or(0.0) * self.power
    }

    pub fn effective_output(&self, period: usize) -> f64 {
        self.nominal_output(period) * (1.0 - self.loss)
    }
}

/// How nominal generation is reduced to effective generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LossModel {
    /// Efficiency factor per period, applied to `generation[t]`.
    PerPeriod(Vec<f64>),
    /// A single network loss fraction applied to every period.
    Uniform { uniform_loss: f64 },
    /// Effective generation is `Σ_j installed[j]*(1-loss[j])*irradiance[j][t]*power[j]`.
    PerGenerator { generators: Vec<GeneratorUnit> },
}

impl Default for LossModel {
    fn default() -> Self {
        LossModel::Uniform { uniform_loss: 0.0 }
    }
}

impl LossModel {
    /// Effective generation for period `t` given its nominal generation.
    pub fn effective_generation(&self, period: usize, nominal: f64) -> f64 {
        match self {
            LossModel::PerPeriod(efficiency) => {
                nominal * efficiency.get(period).copied().unwrap_or(1.0)
            }
            LossModel::Uniform { uniform_loss } => nominal * (1.0 - uniform_loss),
            LossModel::PerGenerator { generators } => generators
                .iter()
                .map(|generator| generator.effective_output(period))
                .sum(),
        }
    }
}

/// A discrete time slot of the planning horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub index: usize,
    /// Nominal generation before losses.
    pub generation: f64,
    /// Generation available to the community after losses.
    pub effective_generation: f64,
    /// Maximum surplus that may be injected (and banked) in this period.
    pub injection_limit: f64,
    /// Optional cap on total direct allocation in this period.
    pub flow_limit: Option<f64>,
    /// Whether the community grid-draw cap applies in this period.
    pub peak: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_generator_effective_generation() {
        let model = LossModel::PerGenerator {
            generators: vec![
                GeneratorUnit {
                    installed: 10.0,
                    loss: 0.1,
                    power: 0.5,
                    irradiance: vec![0.0, 1.0],
                },
                GeneratorUnit {
                    installed: 4.0,
                    loss: 0.0,
                    power: 1.0,
                    irradiance: vec![0.5, 0.5],
                },
            ],
        };

        assert!((model.effective_generation(0, 99.0) - 2.0).abs() < 1e-12);
        assert!((model.effective_generation(1, 99.0) - (4.5 + 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_loss() {
        let model = LossModel::Uniform { uniform_loss: 0.074 };
        assert!((model.effective_generation(3, 100.0) - 92.6).abs() < 1e-9);
    }
}
