use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A single problem found while validating configuration input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConfigIssue {
    /// A required key was absent.
    Missing(String),
    /// A key was present but its value is unusable.
    Invalid { key: String, reason: String },
}

impl ConfigIssue {
    pub fn missing(key: impl Into<String>) -> Self {
        ConfigIssue::Missing(key.into())
    }

    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigIssue::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            ConfigIssue::Missing(key) => key,
            ConfigIssue::Invalid { key, .. } => key,
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::Missing(key) => write!(f, "missing required key `{}`", key),
            ConfigIssue::Invalid { key, reason } => write!(f, "`{}`: {}", key, reason),
        }
    }
}

/// Configuration errors are raised before any model is built.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("invalid configuration ({} issue(s)): {}", .0.len(), join_issues(.0))]
    Invalid(Vec<ConfigIssue>),
}

impl ConfigError {
    /// All issues carried by this error (empty for load failures).
    pub fn issues(&self) -> &[ConfigIssue] {
        match self {
            ConfigError::Load(_) => &[],
            ConfigError::Invalid(issues) => issues,
        }
    }

    /// Keys reported as missing, in the order they were checked.
    pub fn missing_keys(&self) -> Vec<&str> {
        self.issues()
            .iter()
            .filter_map(|issue| match issue {
                ConfigIssue::Missing(key) => Some(key.as_str()),
                ConfigIssue::Invalid { .. } => None,
            })
            .collect()
    }
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Load(error.to_string())
    }
}

/// Energy balance mismatch found during post-solve reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceViolation {
    pub unit: usize,
    pub period: usize,
    pub demand: f64,
    pub recomputed: f64,
    pub magnitude: f64,
}

impl fmt::Display for BalanceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unit {} period {}: demand {:.6} != supplied {:.6} (off by {:.3e})",
            self.unit, self.period, self.demand, self.recomputed, self.magnitude
        )
    }
}

/// Which credit ledger rule a violation broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LedgerRule {
    InitialStock,
    Recurrence,
    NegativeStock,
    OverdrawnCredit,
}

/// Credit ledger inconsistency found when replaying extracted matrices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerViolation {
    pub unit: usize,
    /// Stock index (0..=T) for stock rules, period index for `OverdrawnCredit`.
    pub index: usize,
    pub rule: LedgerRule,
    pub magnitude: f64,
}

impl fmt::Display for LedgerViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unit {} index {}: {:?} violated by {:.3e}",
            self.unit, self.index, self.rule, self.magnitude
        )
    }
}

/// Errors produced by the allocation engine.
#[derive(Debug, Clone, Error)]
pub enum AllocationError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("model is infeasible: {0}")]
    InfeasibleModel(String),

    #[error("model is unbounded: {0}")]
    UnboundedModel(String),

    #[error("solver exceeded its time budget of {budget_secs:.1}s")]
    SolverTimeout { budget_secs: f64 },

    #[error("solver failure: {0}")]
    Solver(String),

    #[error("optimal solution has no value for constrained variable `{0}`")]
    MissingValue(String),

    #[error("energy balance violated in {} cell(s): {}", .0.len(), first_of(.0))]
    BalanceViolation(Vec<BalanceViolation>),

    #[error("credit ledger violated in {} place(s): {}", .0.len(), first_of(.0))]
    LedgerViolation(Vec<LedgerViolation>),
}

impl AllocationError {
    /// Short machine-readable category name.
    pub fn kind(&self) -> &'static str {
        match self {
            AllocationError::Configuration(_) => "ConfigurationError",
            AllocationError::InfeasibleModel(_) => "InfeasibleModelError",
            AllocationError::UnboundedModel(_) => "UnboundedModelError",
            AllocationError::SolverTimeout { .. } => "SolverTimeoutError",
            AllocationError::Solver(_) => "SolverError",
            AllocationError::MissingValue(_) => "MissingValueError",
            AllocationError::BalanceViolation(_) => "BalanceViolationError",
            AllocationError::LedgerViolation(_) => "LedgerViolationError",
        }
    }

    /// Solver-status failures are scoped to one scenario or sweep point.
    pub fn is_solver_status(&self) -> bool {
        matches!(
            self,
            AllocationError::InfeasibleModel(_)
                | AllocationError::UnboundedModel(_)
                | AllocationError::SolverTimeout { .. }
        )
    }
}

fn first_of<T: fmt::Display>(items: &[T]) -> String {
    match items.first() {
        Some(first) if items.len() > 1 => format!("{} (and {} more)", first, items.len() - 1),
        Some(first) => first.to_string(),
        None => String::from("none"),
    }
}

pub type Result<T, E = AllocationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_lists_every_issue() {
        let error = ConfigError::Invalid(vec![
            ConfigIssue::missing("demand"),
            ConfigIssue::missing("epsilon"),
            ConfigIssue::invalid("generation[2]", "must be finite"),
        ]);

        let message = error.to_string();
        assert!(message.contains("3 issue(s)"));
        assert!(message.contains("`demand`"));
        assert!(message.contains("`epsilon`"));
        assert!(message.contains("generation[2]"));
        assert_eq!(error.missing_keys(), vec!["demand", "epsilon"]);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            AllocationError::InfeasibleModel("x".into()).kind(),
            "InfeasibleModelError"
        );
        assert!(AllocationError::SolverTimeout { budget_secs: 1.0 }.is_solver_status());
        assert!(!AllocationError::BalanceViolation(vec![]).is_solver_status());
    }

    #[test]
    fn test_balance_violation_display_names_indices() {
        let error = AllocationError::BalanceViolation(vec![BalanceViolation {
            unit: 3,
            period: 7,
            demand: 1.0,
            recomputed: 1.5,
            magnitude: 0.5,
        }]);
        let message = error.to_string();
        assert!(message.contains("unit 3 period 7"));
    }
}
