use tracing::debug;

use super::constraints::ConstraintBuilder;
use super::model::LinearModel;
use super::objective::ObjectiveComposer;
use super::variables::DecisionVariables;
use crate::domain::{Community, PolicyVariant};

/// A freshly built model together with the handles needed to read its solution.
#[derive(Debug, Clone)]
pub struct AllocationModel {
    pub variant: PolicyVariant,
    pub model: LinearModel,
    pub vars: DecisionVariables,
}

impl AllocationModel {
    /// Allocates variables, emits every constraint family and composes the
    /// objective for `variant`.
    pub fn build(community: &Community, variant: PolicyVariant) -> Self {
        let mut model = LinearModel::new(format!("community_{}", variant));
        let vars = DecisionVariables::allocate(&mut model, community, variant);
        ConstraintBuilder::new(community, &vars, variant).build_all(&mut model);
        ObjectiveComposer::new(community, &vars).compose(&mut model);

        debug!(
            model = model.name(),
            variables = model.num_variables(),
            constraints = model.num_constraints(),
            "allocation model built"
        );

        Self {
            variant,
            model,
            vars,
        }
    }
}
