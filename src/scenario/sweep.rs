//! One-parameter sensitivity sweeps.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, warn};

use super::runner::{FailedRun, ScenarioRunner};
use crate::domain::{Community, PolicyVariant};
use crate::error::Result;
use crate::metrics::RunSummary;
use crate::optimizer::SolverAdapter;

/// Scalar configuration value a sweep re-parameterises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SweepParameter {
    /// Uniform tariff applied to every unit and period.
    TariffRate,
    /// Equity lower-bound fraction.
    Epsilon,
    /// Uniform per-period injection limit.
    InjectionLimit,
    /// Multiplier on nominal generation.
    GenerationScale,
}

impl SweepParameter {
    /// Derives a fresh community with this parameter set to `value`.
    pub fn apply(self, base: &Community, value: f64) -> Result<Community> {
        let derived = match self {
            SweepParameter::TariffRate => base.with_uniform_tariff(value),
            SweepParameter::Epsilon => base.with_epsilon(value),
            SweepParameter::InjectionLimit => base.with_uniform_injection_limit(value),
            SweepParameter::GenerationScale => base.with_generation_scale(value),
        };
        Ok(derived?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivitySweep {
    pub variant: PolicyVariant,
    pub parameter: SweepParameter,
    pub candidates: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepPoint {
    pub value: f64,
    #[serde(flatten)]
    pub result: SweepResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepResult {
    Summary(RunSummary),
    Error(FailedRun),
}

impl SweepPoint {
    pub fn summary(&self) -> Option<&RunSummary> {
        match &self.result {
            SweepResult::Summary(summary) => Some(summary),
            SweepResult::Error(_) => None,
        }
    }
}

impl SensitivitySweep {
    /// Runs the full cycle once per candidate against the runner's community.
    /// A candidate the solver cannot solve is recorded and the sweep moves on;
    /// an invalid candidate or an inconsistent solution stops the sweep.
    pub fn run<S: SolverAdapter>(&self, runner: &ScenarioRunner<S>) -> Result<Vec<SweepPoint>> {
        info!(
            variant = %self.variant,
            parameter = %self.parameter,
            candidates = self.candidates.len(),
            "sensitivity sweep started"
        );
        self.candidates
            .iter()
            .map(|&value| {
                let community = self.parameter.apply(runner.community(), value)?;
                let result = match runner.run_on(&community, self.variant) {
                    Ok(outcome) => SweepResult::Summary(outcome.summary),
                    Err(error) if error.is_solver_status() => {
                        warn!(parameter = %self.parameter, value, %error, "sweep point failed");
                        SweepResult::Error(FailedRun::from(&error))
                    }
                    Err(error) => return Err(error),
                };
                Ok(SweepPoint { value, result })
            })
            .collect()
    }

    /// Projects one summary field across successful points.
    pub fn series(points: &[SweepPoint], field: impl Fn(&RunSummary) -> f64) -> Vec<(f64, f64)> {
        points
            .iter()
            .filter_map(|point| point.summary().map(|s| (point.value, field(s))))
            .collect()
    }
}
