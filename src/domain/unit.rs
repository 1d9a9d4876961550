use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable index of a consumer unit within a community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub usize);

impl UnitId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// A consumer participating in shared generation.
///
/// Demand and tariff profiles live in the community's dense matrices and are
/// read through [`Community::demand_at`](super::Community::demand_at) and
/// [`Community::tariff_at`](super::Community::tariff_at).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    /// Relative weight in priority-driven policies (> 0).
    pub priority_weight: f64,
    /// Minimum cumulative direct allocation over the horizon (0 = none).
    pub minimum_service: f64,
}

impl Unit {
    pub fn new(index: usize, priority_weight: f64, minimum_service: f64) -> Self {
        Self {
            id: UnitId(index),
            priority_weight,
            minimum_service,
        }
    }

    /// Units with a positive minimum-service requirement are designated units.
    pub fn has_minimum_service(&self) -> bool {
        self.minimum_service > 0.0
    }
}
