//! Configuration loading.
//!
//! Values come from a TOML file merged with `SOLAR__`-prefixed environment
//! variables (`SOLAR__EPSILON=0.2`, `SOLAR__OBJECTIVE_WEIGHTS__GRID=0.3`).
//! Every missing or invalid key is collected and reported in one
//! [`ConfigError`] before any model is built.

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::Deserialize;
use strum::IntoEnumIterator;
use tracing::{info, warn};

use crate::domain::{
    AllocationDomain, Community, CreditSplit, DataProvider, LossModel, ObjectiveWeights,
    OperatingCosts, PeakGridLimit, PolicyVariant,
};
use crate::error::{ConfigError, ConfigIssue};
use crate::scenario::SensitivitySweep;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "SOLAR__";

/// Required keys, in the order they are reported when missing.
const REQUIRED_KEYS: [&str; 11] = [
    "num_units",
    "num_periods",
    "demand",
    "generation",
    "efficiency_or_loss",
    "tariff",
    "priority_weight",
    "injection_limit",
    "minimum_service",
    "objective_weights",
    "epsilon",
];

/// Validated configuration of one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub community: Community,
    /// Variants to run, in order.
    pub scenarios: Vec<PolicyVariant>,
    pub sweep: Option<SensitivitySweep>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    num_units: Option<usize>,
    num_periods: Option<usize>,
    demand: Option<Vec<Vec<f64>>>,
    generation: Option<Vec<f64>>,
    efficiency_or_loss: Option<LossModel>,
    tariff: Option<Vec<Vec<f64>>>,
    priority_weight: Option<Vec<f64>>,
    injection_limit: Option<Vec<f64>>,
    minimum_service: Option<Vec<f64>>,
    objective_weights: Option<ObjectiveWeights>,
    epsilon: Option<f64>,

    solver_time_limit_secs: Option<u64>,
    allocation_domain: Option<AllocationDomain>,
    credit_split: Option<CreditSplit>,
    flow_limit: Option<Vec<f64>>,
    peak_grid_limit: Option<PeakGridLimit>,
    emission_factor_kg_per_kwh: Option<f64>,
    operating_costs: Option<OperatingCosts>,
    scenarios: Option<Vec<PolicyVariant>>,
    sweep: Option<SensitivitySweep>,
}

impl RawConfig {
    fn missing_keys(&self) -> Vec<ConfigIssue> {
        let present = [
            self.num_units.is_some(),
            self.num_periods.is_some(),
            self.demand.is_some(),
            self.generation.is_some(),
            self.efficiency_or_loss.is_some(),
            self.tariff.is_some(),
            self.priority_weight.is_some(),
            self.injection_limit.is_some(),
            self.minimum_service.is_some(),
            self.objective_weights.is_some(),
            self.epsilon.is_some(),
        ];
        REQUIRED_KEYS
            .iter()
            .zip(present)
            .filter(|(_, present)| !present)
            .map(|(key, _)| ConfigIssue::missing(*key))
            .collect()
    }

    fn into_config(self) -> Result<Config, ConfigError> {
        let mut issues = self.missing_keys();

        let (
            Some(num_units),
            Some(num_periods),
            Some(demand),
            Some(generation),
            Some(loss_model),
            Some(tariff),
            Some(priority_weight),
            Some(injection_limit),
            Some(minimum_service),
            Some(weights),
            Some(epsilon),
        ) = (
            self.num_units,
            self.num_periods,
            self.demand,
            self.generation,
            self.efficiency_or_loss,
            self.tariff,
            self.priority_weight,
            self.injection_limit,
            self.minimum_service,
            self.objective_weights,
            self.epsilon,
        )
        else {
            return Err(ConfigError::Invalid(issues));
        };

        let mut builder = Community::builder()
            .dimensions(num_units, num_periods)
            .demand(demand)
            .generation(generation)
            .loss_model(loss_model)
            .tariff(tariff)
            .priority_weight(priority_weight)
            .injection_limit(injection_limit)
            .minimum_service(minimum_service)
            .objective_weights(weights)
            .epsilon(epsilon)
            .allocation_domain(self.allocation_domain.unwrap_or_default())
            .credit_split(self.credit_split.unwrap_or_default())
            .emission_factor(self.emission_factor_kg_per_kwh.unwrap_or(0.0))
            .operating_costs(self.operating_costs.unwrap_or_default());
        if let Some(secs) = self.solver_time_limit_secs {
            builder = builder.solver_time_limit(Duration::from_secs(secs));
        }
        if let Some(limits) = self.flow_limit {
            builder = builder.flow_limit(limits);
        }
        if let Some(peak) = self.peak_grid_limit {
            builder = builder.peak_grid_limit(peak);
        }

        let sweep_issues = self.sweep.as_ref().map(check_sweep).unwrap_or_default();
        issues.extend(sweep_issues);

        match builder.build() {
            Ok(community) if issues.is_empty() => Ok(Config {
                community,
                scenarios: self
                    .scenarios
                    .unwrap_or_else(|| PolicyVariant::iter().collect()),
                sweep: self.sweep,
            }),
            Ok(_) => Err(ConfigError::Invalid(issues)),
            Err(built) => {
                issues.extend(built.issues().iter().cloned());
                Err(ConfigError::Invalid(issues))
            }
        }
    }
}

fn check_sweep(sweep: &SensitivitySweep) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    if sweep.candidates.is_empty() {
        issues.push(ConfigIssue::invalid("sweep.candidates", "must not be empty"));
    }
    for (index, value) in sweep.candidates.iter().enumerate() {
        if !value.is_finite() {
            issues.push(ConfigIssue::invalid(
                format!("sweep.candidates[{}]", index),
                "must be finite",
            ));
        }
    }
    for value in sweep.candidates.iter().copied().map(OrderedFloat).duplicates() {
        issues.push(ConfigIssue::invalid(
            "sweep.candidates",
            format!("{} is listed more than once", value),
        ));
    }
    issues
}

impl Config {
    /// Loads `path` merged with the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using environment only");
        }
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config = Self::from_figment(figment)?;
        info!(
            path = %path.display(),
            units = config.community.num_units(),
            periods = config.community.num_periods(),
            scenarios = config.scenarios.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parses a TOML document without consulting the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::from_figment(Figment::from(Toml::string(toml)))
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let raw: RawConfig = figment.extract()?;
        raw.into_config()
    }
}

impl DataProvider for Config {
    fn community(&self) -> Result<Community, ConfigError> {
        Ok(self.community.clone())
    }
}
