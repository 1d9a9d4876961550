use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::domain::{Community, PolicyVariant};
use crate::error::{AllocationError, Result};
use crate::metrics::RunSummary;
use crate::optimizer::{
    AllocationMatrices, AllocationModel, HeuristicAllocator, ResultExtractor, SolverAdapter,
};

/// A successful build → solve → extract cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub run_id: Uuid,
    pub variant: PolicyVariant,
    pub solved_at: DateTime<Utc>,
    pub matrices: AllocationMatrices,
    pub summary: RunSummary,
}

/// Error recorded in place of an outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRun {
    pub kind: &'static str,
    pub message: String,
}

impl From<&AllocationError> for FailedRun {
    fn from(error: &AllocationError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub variant: PolicyVariant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ScenarioOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailedRun>,
}

impl ScenarioReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Runs policy variants against one community snapshot. Every run builds and
/// solves its own model; nothing is shared between runs except the solver
/// adapter, which holds no per-run state.
pub struct ScenarioRunner<S> {
    community: Community,
    solver: S,
}

impl<S: SolverAdapter> ScenarioRunner<S> {
    pub fn new(community: Community, solver: S) -> Self {
        Self { community, solver }
    }

    pub fn community(&self) -> &Community {
        &self.community
    }

    pub fn run(&self, variant: PolicyVariant) -> Result<ScenarioOutcome> {
        self.run_on(&self.community, variant)
    }

    /// Runs `variant` on a community derived from the runner's own snapshot.
    pub fn run_on(
        &self,
        community: &Community,
        variant: PolicyVariant,
    ) -> Result<ScenarioOutcome> {
        let span = info_span!("scenario", %variant);
        let _guard = span.enter();
        info!(
            units = community.num_units(),
            periods = community.num_periods(),
            "scenario started"
        );

        let (matrices, objective) = if variant.is_heuristic() {
            (HeuristicAllocator::new(variant)?.allocate(community), None)
        } else {
            let built = AllocationModel::build(community, variant);
            let budget = community.solver_time_limit();
            let (values, objective) = self
                .solver
                .solve(&built.model, budget)?
                .into_solution(built.model.name(), budget)?;
            (ResultExtractor::extract(community, &built, &values)?, Some(objective))
        };
        ResultExtractor::reconcile(community, &matrices)?;

        let summary = RunSummary::calculate(community, &matrices, objective);
        info!(
            allocated = summary.allocated_energy,
            self_sufficiency_pct = summary.self_sufficiency_pct,
            grid_cost = summary.total_grid_cost,
            "scenario finished"
        );
        Ok(ScenarioOutcome {
            run_id: Uuid::new_v4(),
            variant,
            solved_at: Utc::now(),
            matrices,
            summary,
        })
    }

    /// Runs each variant in order. A solver-status failure is recorded and the
    /// rest still run; any other error aborts the batch.
    pub fn run_all(&self, variants: &[PolicyVariant]) -> Result<Vec<ScenarioReport>> {
        variants
            .iter()
            .map(|&variant| match self.run(variant) {
                Ok(outcome) => Ok(ScenarioReport {
                    variant,
                    outcome: Some(outcome),
                    error: None,
                }),
                Err(error) if error.is_solver_status() => {
                    warn!(%variant, kind = error.kind(), %error, "scenario failed");
                    Ok(ScenarioReport {
                        variant,
                        outcome: None,
                        error: Some(FailedRun::from(&error)),
                    })
                }
                Err(error) => Err(error),
            })
            .collect()
    }
}
