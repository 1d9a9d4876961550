//! Immutable community snapshot shared by every scenario run.
//!
//! A [`Community`] is built once (from configuration or a
//! [`CommunityBuilder`]) and never mutated afterwards. Sensitivity sweeps derive
//! new snapshots through the `with_*` methods instead of editing one in place.

use std::time::Duration;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{AllocationDomain, CreditSplit, LossModel, ObjectiveWeights, Period, Unit, UnitId};
use crate::error::{ConfigError, ConfigIssue};

/// Default wall-clock budget handed to the solver.
pub const DEFAULT_SOLVER_TIME_LIMIT: Duration = Duration::from_secs(600);

/// Default lower bound on the permitted equity deviation, as a fraction of the mean.
pub const DEFAULT_EPSILON: f64 = 0.1;

/// Caps community grid draw in designated peak periods to a fraction of their demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakGridLimit {
    pub periods: Vec<usize>,
    pub max_fraction: f64,
}

/// Fixed and per-kWh charges added to the grid bill in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatingCosts {
    /// Monthly availability charge per unit, prorated per day.
    pub availability_monthly: f64,
    /// Operating cost per allocated kWh.
    pub operational_per_kwh: f64,
}

/// Supplies the immutable input snapshot for a run.
pub trait DataProvider {
    fn community(&self) -> Result<Community, ConfigError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Community {
    units: Vec<Unit>,
    periods: Vec<Period>,
    demand: Array2<f64>,
    tariff: Array2<f64>,
    weights: ObjectiveWeights,
    epsilon: f64,
    allocation_domain: AllocationDomain,
    credit_split: CreditSplit,
    peak_grid_fraction: Option<f64>,
    emission_factor: f64,
    operating_costs: OperatingCosts,
    solver_time_limit: Duration,
}

impl DataProvider for Community {
    fn community(&self) -> Result<Community, ConfigError> {
        Ok(self.clone())
    }
}

impl Community {
    pub fn builder() -> CommunityBuilder {
        CommunityBuilder::default()
    }

    pub fn num_units(&self) -> usize {
        self.units.len()
    }

    pub fn num_periods(&self) -> usize {
        self.periods.len()
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn unit(&self, index: usize) -> &Unit {
        &self.units[index]
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn period(&self, index: usize) -> &Period {
        &self.periods[index]
    }

    /// Demand matrix, units × periods.
    pub fn demand(&self) -> &Array2<f64> {
        &self.demand
    }

    /// Tariff matrix, units × periods.
    pub fn tariff(&self) -> &Array2<f64> {
        &self.tariff
    }

    pub fn demand_at(&self, unit: usize, period: usize) -> f64 {
        self.demand[[unit, period]]
    }

    pub fn tariff_at(&self, unit: usize, period: usize) -> f64 {
        self.tariff[[unit, period]]
    }

    pub fn total_demand(&self) -> f64 {
        self.demand.sum()
    }

    pub fn unit_total_demand(&self, unit: usize) -> f64 {
        self.demand.row(unit).sum()
    }

    pub fn period_total_demand(&self, period: usize) -> f64 {
        self.demand.column(period).sum()
    }

    /// Σ tariff[i,t] * demand[i,t], the cost of buying every demand from the grid.
    pub fn tariff_weighted_demand(&self) -> f64 {
        (&self.tariff * &self.demand).sum()
    }

    pub fn total_generation(&self) -> f64 {
        self.periods.iter().map(|p| p.generation).sum()
    }

    pub fn weights(&self) -> &ObjectiveWeights {
        &self.weights
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn allocation_domain(&self) -> AllocationDomain {
        self.allocation_domain
    }

    pub fn credit_split(&self) -> CreditSplit {
        self.credit_split
    }

    pub fn peak_grid_fraction(&self) -> Option<f64> {
        self.peak_grid_fraction
    }

    pub fn emission_factor(&self) -> f64 {
        self.emission_factor
    }

    pub fn operating_costs(&self) -> OperatingCosts {
        self.operating_costs
    }

    pub fn solver_time_limit(&self) -> Duration {
        self.solver_time_limit
    }

    /// Units that carry a minimum cumulative service requirement.
    pub fn minimum_service_units(&self) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|unit| unit.has_minimum_service())
            .map(|unit| unit.id)
            .collect()
    }

    /// Fraction of each period's banked credit assigned to each unit.
    ///
    /// Proportional shares follow total horizon demand and fall back to equal
    /// shares when the community has no demand at all.
    pub fn credit_shares(&self) -> Vec<f64> {
        let n = self.num_units() as f64;
        let total = self.total_demand();
        match self.credit_split {
            CreditSplit::Proportional if total > 0.0 => self
                .demand
                .sum_axis(Axis(1))
                .iter()
                .map(|unit_total| unit_total / total)
                .collect(),
            _ => vec![1.0 / n; self.num_units()],
        }
    }

    /// Same community with every tariff entry set to `rate`.
    pub fn with_uniform_tariff(&self, rate: f64) -> Result<Self, ConfigError> {
        require_non_negative("tariff", rate)?;
        let mut derived = self.clone();
        derived.tariff.fill(rate);
        Ok(derived)
    }

    pub fn with_epsilon(&self, epsilon: f64) -> Result<Self, ConfigError> {
        require_non_negative("epsilon", epsilon)?;
        let mut derived = self.clone();
        derived.epsilon = epsilon;
        Ok(derived)
    }

    /// Same community with every period's injection limit set to `limit`.
    pub fn with_uniform_injection_limit(&self, limit: f64) -> Result<Self, ConfigError> {
        require_non_negative("injection_limit", limit)?;
        let mut derived = self.clone();
        for period in &mut derived.periods {
            period.injection_limit = limit;
        }
        Ok(derived)
    }

    /// Same community with nominal and effective generation scaled by `factor`.
    pub fn with_generation_scale(&self, factor: f64) -> Result<Self, ConfigError> {
        require_non_negative("generation_scale", factor)?;
        let mut derived = self.clone();
        for period in &mut derived.periods {
            period.generation *= factor;
            period.effective_generation *= factor;
        }
        Ok(derived)
    }

    pub fn with_allocation_domain(&self, domain: AllocationDomain) -> Self {
        let mut derived = self.clone();
        derived.allocation_domain = domain;
        derived
    }
}

fn require_non_negative(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(vec![ConfigIssue::invalid(
            key,
            format!("must be a finite non-negative number, got {}", value),
        )]))
    }
}

/// Flattens `validator` output into config issues prefixed with `prefix`.
pub(crate) fn push_validation_issues(
    issues: &mut Vec<ConfigIssue>,
    prefix: &str,
    result: Result<(), validator::ValidationErrors>,
) {
    use validator::ValidationErrorsKind;

    let Err(errors) = result else {
        return;
    };
    for (field, kind) in errors.errors() {
        let key = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let reason = match error.params.get("value") {
                        Some(value) => format!("failed `{}` check (got {})", error.code, value),
                        None => format!("failed `{}` check", error.code),
                    };
                    issues.push(ConfigIssue::invalid(key.clone(), reason));
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                push_validation_issues(issues, &key, Err(*nested.clone()));
            }
            ValidationErrorsKind::List(entries) => {
                for (index, nested) in entries {
                    let indexed = format!("{}[{}]", key, index);
                    push_validation_issues(issues, &indexed, Err(*nested.clone()));
                }
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Bound {
    NonNegative,
    Positive,
    Fraction,
    LossFraction,
}

impl Bound {
    fn check(self, value: f64) -> Option<&'static str> {
        if !value.is_finite() {
            return Some("must be finite");
        }
        match self {
            Bound::NonNegative if value < 0.0 => Some("must be non-negative"),
            Bound::Positive if value <= 0.0 => Some("must be positive"),
            Bound::Fraction if !(0.0..=1.0).contains(&value) => Some("must lie in [0, 1]"),
            Bound::LossFraction if !(0.0..1.0).contains(&value) => Some("must lie in [0, 1)"),
            _ => None,
        }
    }
}

fn check_vector(
    issues: &mut Vec<ConfigIssue>,
    key: &str,
    values: &[f64],
    len: usize,
    bound: Bound,
) {
    if values.len() != len {
        issues.push(ConfigIssue::invalid(
            key,
            format!("expected {} entries, found {}", len, values.len()),
        ));
        return;
    }
    for (index, value) in values.iter().enumerate() {
        if let Some(reason) = bound.check(*value) {
            issues.push(ConfigIssue::invalid(
                format!("{}[{}]", key, index),
                format!("{} (got {})", reason, value),
            ));
        }
    }
}

fn check_matrix(
    issues: &mut Vec<ConfigIssue>,
    key: &str,
    rows: &[Vec<f64>],
    shape: (usize, usize),
    bound: Bound,
) {
    if rows.len() != shape.0 {
        issues.push(ConfigIssue::invalid(
            key,
            format!("expected {} unit rows, found {}", shape.0, rows.len()),
        ));
        return;
    }
    for (unit, row) in rows.iter().enumerate() {
        check_vector(issues, &format!("{}[{}]", key, unit), row, shape.1, bound);
    }
}

fn to_array(rows: &[Vec<f64>], shape: (usize, usize)) -> Array2<f64> {
    Array2::from_shape_fn(shape, |(i, t)| rows[i][t])
}

/// Assembles and validates a [`Community`].
///
/// `demand` and `generation` are required; everything else has a default
/// (unit tariffs and priorities, no losses, non-binding injection limits, no
/// minimum service).
#[derive(Debug, Clone)]
pub struct CommunityBuilder {
    dimensions: Option<(usize, usize)>,
    demand: Option<Vec<Vec<f64>>>,
    generation: Option<Vec<f64>>,
    loss_model: LossModel,
    tariff: Option<Vec<Vec<f64>>>,
    priority_weight: Option<Vec<f64>>,
    injection_limit: Option<Vec<f64>>,
    minimum_service: Option<Vec<f64>>,
    flow_limit: Option<Vec<f64>>,
    peak_grid_limit: Option<PeakGridLimit>,
    weights: ObjectiveWeights,
    epsilon: f64,
    allocation_domain: AllocationDomain,
    credit_split: CreditSplit,
    emission_factor: f64,
    operating_costs: OperatingCosts,
    solver_time_limit: Duration,
}

impl Default for CommunityBuilder {
    fn default() -> Self {
        Self {
            dimensions: None,
            demand: None,
            generation: None,
            loss_model: LossModel::default(),
            tariff: None,
            priority_weight: None,
            injection_limit: None,
            minimum_service: None,
            flow_limit: None,
            peak_grid_limit: None,
            weights: ObjectiveWeights::default(),
            epsilon: DEFAULT_EPSILON,
            allocation_domain: AllocationDomain::default(),
            credit_split: CreditSplit::default(),
            emission_factor: 0.0,
            operating_costs: OperatingCosts::default(),
            solver_time_limit: DEFAULT_SOLVER_TIME_LIMIT,
        }
    }
}

impl CommunityBuilder {
    /// Declared `(num_units, num_periods)`; every array is checked against it.
    pub fn dimensions(mut self, num_units: usize, num_periods: usize) -> Self {
        self.dimensions = Some((num_units, num_periods));
        self
    }

    pub fn demand(mut self, demand: Vec<Vec<f64>>) -> Self {
        self.demand = Some(demand);
        self
    }

    pub fn generation(mut self, generation: Vec<f64>) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn loss_model(mut self, loss_model: LossModel) -> Self {
        self.loss_model = loss_model;
        self
    }

    pub fn efficiency(self, efficiency: Vec<f64>) -> Self {
        self.loss_model(LossModel::PerPeriod(efficiency))
    }

    pub fn tariff(mut self, tariff: Vec<Vec<f64>>) -> Self {
        self.tariff = Some(tariff);
        self
    }

    pub fn priority_weight(mut self, weights: Vec<f64>) -> Self {
        self.priority_weight = Some(weights);
        self
    }

    pub fn injection_limit(mut self, limits: Vec<f64>) -> Self {
        self.injection_limit = Some(limits);
        self
    }

    pub fn minimum_service(mut self, minimum: Vec<f64>) -> Self {
        self.minimum_service = Some(minimum);
        self
    }

    pub fn flow_limit(mut self, limits: Vec<f64>) -> Self {
        self.flow_limit = Some(limits);
        self
    }

    pub fn peak_grid_limit(mut self, limit: PeakGridLimit) -> Self {
        self.peak_grid_limit = Some(limit);
        self
    }

    pub fn objective_weights(mut self, weights: ObjectiveWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn allocation_domain(mut self, domain: AllocationDomain) -> Self {
        self.allocation_domain = domain;
        self
    }

    pub fn credit_split(mut self, split: CreditSplit) -> Self {
        self.credit_split = split;
        self
    }

    pub fn emission_factor(mut self, kg_per_kwh: f64) -> Self {
        self.emission_factor = kg_per_kwh;
        self
    }

    pub fn operating_costs(mut self, costs: OperatingCosts) -> Self {
        self.operating_costs = costs;
        self
    }

    pub fn solver_time_limit(mut self, limit: Duration) -> Self {
        self.solver_time_limit = limit;
        self
    }

    /// Validates every input and reports all problems at once.
    pub fn build(self) -> Result<Community, ConfigError> {
        let mut issues = Vec::new();

        let (Some(demand), Some(generation)) = (self.demand.as_ref(), self.generation.as_ref())
        else {
            if self.demand.is_none() {
                issues.push(ConfigIssue::missing("demand"));
            }
            if self.generation.is_none() {
                issues.push(ConfigIssue::missing("generation"));
            }
            return Err(ConfigError::Invalid(issues));
        };

        let shape = self
            .dimensions
            .unwrap_or((demand.len(), generation.len()));
        let (n, t) = shape;
        if n == 0 {
            issues.push(ConfigIssue::invalid("num_units", "must be at least 1"));
        }
        if t == 0 {
            issues.push(ConfigIssue::invalid("num_periods", "must be at least 1"));
        }
        if !issues.is_empty() {
            return Err(ConfigError::Invalid(issues));
        }

        check_matrix(&mut issues, "demand", demand, shape, Bound::NonNegative);
        check_vector(&mut issues, "generation", generation, t, Bound::NonNegative);
        self.check_loss_model(&mut issues, t);
        if let Some(tariff) = &self.tariff {
            check_matrix(&mut issues, "tariff", tariff, shape, Bound::NonNegative);
        }
        if let Some(weights) = &self.priority_weight {
            check_vector(&mut issues, "priority_weight", weights, n, Bound::Positive);
        }
        if let Some(limits) = &self.injection_limit {
            check_vector(&mut issues, "injection_limit", limits, t, Bound::NonNegative);
        }
        if let Some(minimum) = &self.minimum_service {
            check_vector(&mut issues, "minimum_service", minimum, n, Bound::NonNegative);
        }
        if let Some(limits) = &self.flow_limit {
            check_vector(&mut issues, "flow_limit", limits, t, Bound::NonNegative);
        }
        if let Some(peak) = &self.peak_grid_limit {
            if let Some(reason) = Bound::Fraction.check(peak.max_fraction) {
                issues.push(ConfigIssue::invalid("peak_grid_limit.max_fraction", reason));
            }
            for period in peak.periods.iter().filter(|p| **p >= t) {
                issues.push(ConfigIssue::invalid(
                    "peak_grid_limit.periods",
                    format!("period {} is outside 0..{}", period, t),
                ));
            }
        }
        push_validation_issues(&mut issues, "objective_weights", self.weights.validate());
        if let Some(reason) = Bound::NonNegative.check(self.epsilon) {
            issues.push(ConfigIssue::invalid("epsilon", reason));
        }
        if let Some(reason) = Bound::NonNegative.check(self.emission_factor) {
            issues.push(ConfigIssue::invalid("emission_factor_kg_per_kwh", reason));
        }
        let costs = &self.operating_costs;
        for (key, value) in [
            ("operating_costs.availability_monthly", costs.availability_monthly),
            ("operating_costs.operational_per_kwh", costs.operational_per_kwh),
        ] {
            if let Some(reason) = Bound::NonNegative.check(value) {
                issues.push(ConfigIssue::invalid(key, reason));
            }
        }
        if self.solver_time_limit.is_zero() {
            issues.push(ConfigIssue::invalid("solver_time_limit_secs", "must be positive"));
        }

        if !issues.is_empty() {
            return Err(ConfigError::Invalid(issues));
        }

        let peak_periods = self
            .peak_grid_limit
            .as_ref()
            .map(|peak| peak.periods.clone())
            .unwrap_or_default();
        let periods = (0..t)
            .map(|index| {
                let effective = self.loss_model.effective_generation(index, generation[index]);
                Period {
                    index,
                    generation: generation[index],
                    effective_generation: effective,
                    injection_limit: self
                        .injection_limit
                        .as_ref()
                        .map_or(effective, |limits| limits[index]),
                    flow_limit: self.flow_limit.as_ref().map(|limits| limits[index]),
                    peak: peak_periods.contains(&index),
                }
            })
            .collect();

        let units = (0..n)
            .map(|index| {
                Unit::new(
                    index,
                    self.priority_weight.as_ref().map_or(1.0, |w| w[index]),
                    self.minimum_service.as_ref().map_or(0.0, |m| m[index]),
                )
            })
            .collect();

        Ok(Community {
            units,
            periods,
            demand: to_array(demand, shape),
            tariff: self
                .tariff
                .as_ref()
                .map_or_else(|| Array2::ones(shape), |rows| to_array(rows, shape)),
            weights: self.weights,
            epsilon: self.epsilon,
            allocation_domain: self.allocation_domain,
            credit_split: self.credit_split,
            peak_grid_fraction: self.peak_grid_limit.map(|peak| peak.max_fraction),
            emission_factor: self.emission_factor,
            operating_costs: self.operating_costs,
            solver_time_limit: self.solver_time_limit,
        })
    }

    fn check_loss_model(&self, issues: &mut Vec<ConfigIssue>, t: usize) {
        const KEY: &str = "efficiency_or_loss";
        match &self.loss_model {
            LossModel::PerPeriod(efficiency) => {
                check_vector(issues, KEY, efficiency, t, Bound::Fraction);
            }
            LossModel::Uniform { uniform_loss } => {
                if let Some(reason) = Bound::LossFraction.check(*uniform_loss) {
                    issues.push(ConfigIssue::invalid(format!("{}.uniform_loss", KEY), reason));
                }
            }
            LossModel::PerGenerator { generators } => {
                if generators.is_empty() {
                    issues.push(ConfigIssue::invalid(
                        format!("{}.generators", KEY),
                        "at least one generator is required",
                    ));
                }
                for (j, generator) in generators.iter().enumerate() {
                    let prefix = format!("{}.generators[{}]", KEY, j);
                    for (field, value, bound) in [
                        ("installed", generator.installed, Bound::NonNegative),
                        ("loss", generator.loss, Bound::LossFraction),
                        ("power", generator.power, Bound::NonNegative),
                    ] {
                        if let Some(reason) = bound.check(value) {
                            let key = format!("{}.{}", prefix, field);
                            issues.push(ConfigIssue::invalid(key, reason));
                        }
                    }
                    check_vector(
                        issues,
                        &format!("{}.irradiance", prefix),
                        &generator.irradiance,
                        t,
                        Bound::NonNegative,
                    );
                }
            }
        }
    }
}
